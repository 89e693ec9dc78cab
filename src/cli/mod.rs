//! Command-line interface.

pub mod commands;
pub mod output;
pub mod service;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::config::ConfigArgs;
use commands::inspect::InspectArgs;
use commands::run::RunArgs;

/// Command line entry point.
#[derive(Parser, Debug)]
#[command(name = "credence", version, about = "Iterative evidence gathering for news article trustworthiness")]
pub struct Cli {
    /// Emit machine-readable JSON instead of human output
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file; defaults to the .credence/ hierarchy
    #[arg(long, short, global = true, env = "CREDENCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the evidence loop over a file of articles and record traces
    Run(RunArgs),
    /// Show recorded traces
    Inspect(InspectArgs),
    /// Show, validate or initialise configuration
    Config(ConfigArgs),
}

/// Print an error in the requested mode and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({ "success": false, "error": format!("{err:#}") });
        eprintln!("{body}");
    } else {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
    }
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "credence",
            "run",
            "articles.jsonl",
            "--max-iterations",
            "3",
            "--skip-outputs",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.articles, PathBuf::from("articles.jsonl"));
                assert_eq!(args.max_iterations, Some(3));
                assert!(args.skip_outputs);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_inspect_without_id() {
        let cli = Cli::try_parse_from(["credence", "inspect"]).unwrap();
        assert!(matches!(cli.command, Commands::Inspect(InspectArgs { article_id: None })));
    }
}
