//! Engine configuration.

use corelib::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default virtual nodes per server (visualisation scale).
pub const DEFAULT_VIRTUAL_NODES: usize = 2;

/// Default consecutive failures before a server is marked `Down`.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Tunables for a [`DistributionEngine`](crate::DistributionEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Virtual nodes placed for each server unless overridden per server.
    pub virtual_nodes: usize,
    /// Failed assignment attempts against a server before it goes `Down`.
    pub failure_threshold: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

impl EngineConfig {
    pub fn with_virtual_nodes(mut self, virtual_nodes: usize) -> Self {
        self.virtual_nodes = virtual_nodes;
        self
    }

    pub fn with_failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.failure_threshold = failure_threshold;
        self
    }

    /// Both values must be positive.
    pub fn validate(&self) -> Result<()> {
        if self.virtual_nodes == 0 {
            return Err(Error::InvalidConfig(
                "virtual_nodes must be positive".to_string(),
            ));
        }
        if self.failure_threshold == 0 {
            return Err(Error::InvalidConfig(
                "failure_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }
}
