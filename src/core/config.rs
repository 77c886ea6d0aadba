//! Matcher configuration
//!
//! Loaded from `matcher.yaml` in the data directory when present.
//! Command-line flags override individual fields afterwards.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Number of catalog items handed to the embedder per call
    pub batch_size: usize,
    pub top_k: usize,
    pub min_score: f32,
    /// Timeout for fetching a remote product image
    pub fetch_timeout_secs: u64,
    pub log_level: String,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            top_k: 12,
            min_score: 0.0,
            fetch_timeout_secs: 30,
            log_level: "warn".to_string(),
        }
    }
}

impl MatcherConfig {
    /// Load config from path, falling back to defaults if the file is missing
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".into()));
        }
        if !(-1.0..=1.0).contains(&self.min_score) {
            return Err(ConfigError::Invalid(format!(
                "min_score must be within [-1, 1], got {}",
                self.min_score
            )));
        }
        Ok(())
    }
}
