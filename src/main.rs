//! Credence CLI entry point.

use anyhow::Result;
use clap::Parser;

use credence::cli::{self, Cli, Commands};
use credence::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        cli::handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // a broken config is reported by the command itself
    let log_config = cli::service::load_config(cli.config.as_deref())
        .ok()
        .and_then(|config| LogConfig::try_from(&config.logging).ok())
        .unwrap_or_default();
    let _logger = LoggerImpl::init(&log_config)?;

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => cli::commands::run::execute(args, config, cli.json).await,
        Commands::Inspect(args) => cli::commands::inspect::execute(args, config, cli.json).await,
        Commands::Config(args) => cli::commands::config::execute(args, config, cli.json).await,
    }
}
