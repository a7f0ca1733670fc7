//! CLI argument definitions for consortium-runner.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use consortium_core::config::ConsortiumConfig;

use crate::error::RunnerError;

/// Multi-organization ledger workflow runner.
///
/// Creates a shared channel, deploys and upgrades chaincode under a
/// multi-party endorsement policy, and verifies that state converges
/// across both organizations.
#[derive(Parser, Debug)]
#[command(name = "consortium-runner")]
#[command(version, about, long_about = None)]
pub struct RunnerCli {
    /// Path to consortium.toml configuration file.
    #[arg(short, long, default_value = "consortium.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without running the workflow.
    #[arg(long)]
    pub validate: bool,

    /// Report format.
    #[arg(long, default_value = "text")]
    pub output: OutputFormat,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl RunnerCli {
    /// Load the effective configuration.
    ///
    /// File, then `CONSORTIUM_*` environment variables, then command-line
    /// overrides. The result is validated.
    pub async fn load_config(&self) -> Result<ConsortiumConfig, RunnerError> {
        let mut config = ConsortiumConfig::from_file(&self.config).await?;
        config.apply_env_overrides();

        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }

        config.validate()?;
        Ok(config)
    }
}
