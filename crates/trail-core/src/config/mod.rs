//! Configuration types for the trail audit pipeline.
//!
//! Configuration is loaded from a single YAML file (conventionally
//! `trail.yaml`). Every field has a default, so an empty document yields a
//! working in-memory setup.
//!
//! ```yaml
//! enabled: true
//! activity_window_days: 31
//! dispatch:
//!   workers: 4
//!   queue_capacity: 100
//! retry:
//!   max_attempts: 3
//!   base_delay_ms: 500
//! store:
//!   backend: file
//!   file_path: /var/lib/trail/audit.jsonl
//! emergency:
//!   backend: file
//!   file_path: /var/log/trail/emergency-audit.log
//! ```

pub mod dispatch;
pub mod store;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use dispatch::{DispatchConfig, RetryConfig};
pub use store::{EmergencyBackend, EmergencyConfig, StoreBackend, StoreConfig};

/// Complete trail configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailConfig {
    /// Whether audit writes are recorded at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum span, in days, of a single user activity query.
    #[serde(default = "default_activity_window_days")]
    pub activity_window_days: u32,

    /// Asynchronous dispatch pool.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// User-action retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Primary store.
    #[serde(default)]
    pub store: StoreConfig,

    /// Emergency fallback channel.
    #[serde(default)]
    pub emergency: EmergencyConfig,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activity_window_days: default_activity_window_days(),
            dispatch: DispatchConfig::default(),
            retry: RetryConfig::default(),
            store: StoreConfig::default(),
            emergency: EmergencyConfig::default(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_activity_window_days() -> u32 {
    31
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TrailConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content and validate it.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.workers == 0 {
            return Err(ConfigError::Config(
                "dispatch.workers must be at least 1".to_string(),
            ));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::Config(
                "dispatch.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.activity_window_days == 0 {
            return Err(ConfigError::Config(
                "activity_window_days must be at least 1".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::File
            && self.emergency.backend == EmergencyBackend::File
            && self.store.file_path == self.emergency.file_path
        {
            return Err(ConfigError::Config(
                "emergency.file_path must differ from store.file_path".to_string(),
            ));
        }
        Ok(())
    }
}
