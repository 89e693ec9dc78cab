//! Implementation of the `credence config` command.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::output::{output, CommandOutput};
use crate::cli::service;
use crate::domain::models::Config;

/// Arguments of `config`.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Action to take.
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// `config` actions.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Load and validate the configuration
    Validate,
    /// Write a default configuration file
    Init {
        /// Destination file
        #[arg(long, default_value = ".credence/config.yaml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

/// Effective configuration.
#[derive(Debug, Serialize)]
pub struct ConfigShowOutput {
    /// Merged and validated settings.
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config).unwrap_or_else(|e| format!("failed to render config: {e}"))
    }
}

/// Outcome of `validate` or `init`.
#[derive(Debug, Serialize)]
pub struct ConfigMessageOutput {
    /// Whether the action succeeded.
    pub success: bool,
    /// Human-readable detail.
    pub message: String,
}

impl CommandOutput for ConfigMessageOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

/// Run a `config` action.
pub async fn execute(args: ConfigArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = service::load_config(config_path)?;
            output(&ConfigShowOutput { config }, json_mode);
        }
        ConfigCommand::Validate => {
            service::load_config(config_path)?;
            output(
                &ConfigMessageOutput {
                    success: true,
                    message: "Configuration is valid.".to_string(),
                },
                json_mode,
            );
        }
        ConfigCommand::Init { path, force } => {
            if path.exists() && !force {
                bail!("{} already exists. Use --force to overwrite.", path.display());
            }
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
            }
            let yaml = serde_yaml::to_string(&Config::default()).context("Failed to render default config")?;
            tokio::fs::write(&path, yaml)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            output(
                &ConfigMessageOutput {
                    success: true,
                    message: format!("Wrote default configuration to {}", path.display()),
                },
                json_mode,
            );
        }
    }
    Ok(())
}
