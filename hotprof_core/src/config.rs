//! Profile saver configuration

use crate::error::{ProfileError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for tracking and saving
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaverConfig {
    /// Period of the background save cycle
    pub save_period_ms: u64,
    /// Background cycles skip writing when fewer methods than this are new
    pub min_new_methods: usize,
    /// Executions after which a method counts as hot
    pub hot_threshold: u32,
    /// Upper bound for a single background save cycle
    pub save_timeout_ms: u64,
}

impl SaverConfig {
    pub fn save_period(&self) -> Duration {
        Duration::from_millis(self.save_period_ms)
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_millis(self.save_timeout_ms)
    }
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            save_period_ms: 20_000,
            min_new_methods: 1,
            hot_threshold: 10_000,
            save_timeout_ms: 5_000,
        }
    }
}

/// Loads saver configuration from YAML
pub struct ConfigLoader;

impl ConfigLoader {
    /// Create a new loader
    pub fn new() -> Self {
        Self
    }

    /// Load configuration from a file
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<SaverConfig> {
        let content = std::fs::read_to_string(path)?;
        self.load_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_string(&self, content: &str) -> Result<SaverConfig> {
        let config: SaverConfig = serde_yaml::from_str(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Validate a loaded configuration
    fn validate(&self, config: &SaverConfig) -> Result<()> {
        let positive = [
            ("save_period_ms", config.save_period_ms),
            ("hot_threshold", u64::from(config.hot_threshold)),
            ("save_timeout_ms", config.save_timeout_ms),
        ];
        for (path, value) in positive {
            if value == 0 {
                return Err(ProfileError::InvalidConfig {
                    path: path.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }

        if config.save_timeout_ms > config.save_period_ms {
            tracing::warn!(
                "save_timeout_ms ({}) exceeds save_period_ms ({}); cycles may back up",
                config.save_timeout_ms,
                config.save_period_ms
            );
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
