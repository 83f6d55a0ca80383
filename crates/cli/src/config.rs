//! Command-line configuration.

use crate::commands::Command;
use anyhow::Context;
use clap::Parser;
use distribution::{DistributionEngine, EngineConfig};
use std::io;
use std::path::PathBuf;

/// Drive a consistent-hash client distributor from the command line.
#[derive(Debug, Parser)]
#[command(name = "hashring", version, about)]
pub struct CliConfig {
    /// JSON engine config (`virtual_nodes`, `failure_threshold`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Virtual nodes per server; overrides the config file.
    #[arg(long, global = true)]
    pub vnodes: Option<usize>,

    /// Failed assignments before a server is marked down; overrides the config file.
    #[arg(long, global = true)]
    pub failure_threshold: Option<u32>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// File config (or defaults) with flag overrides applied.
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(vnodes) = self.vnodes {
            config = config.with_virtual_nodes(vnodes);
        }
        if let Some(threshold) = self.failure_threshold {
            config = config.with_failure_threshold(threshold);
        }
        config.validate()?;
        Ok(config)
    }

    /// Initialise logging, build the engine and run the subcommand.
    pub fn run(self) -> anyhow::Result<()> {
        crate::logging::init(&self.log_level);
        let config = self.engine_config()?;
        tracing::debug!(?config, "engine configuration");
        let mut engine = DistributionEngine::new(config)?;

        let stdout = io::stdout();
        let result = self.command.execute(&mut engine, &mut stdout.lock())?;
        tracing::info!(
            operations = result.operations,
            dropped = result.dropped,
            "done"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = CliConfig::parse_from([
            "hashring",
            "--vnodes",
            "16",
            "simulate",
            "--servers",
            "a,b",
        ]);
        let config = cli.engine_config().unwrap();
        assert_eq!(config.virtual_nodes, 16);
        assert_eq!(config.failure_threshold, 3);
    }

    #[test]
    fn test_zero_vnodes_rejected() {
        let cli = CliConfig::parse_from(["hashring", "replay", "--vnodes", "0"]);
        assert!(cli.engine_config().is_err());
    }
}
