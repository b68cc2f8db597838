//! Storage and emergency fallback configuration.

use serde::{Deserialize, Serialize};

/// Primary audit store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage backend type.
    #[serde(default)]
    pub backend: StoreBackend,

    /// File path (for the file backend).
    #[serde(default = "default_store_path")]
    pub file_path: String,
}

/// Primary store backend type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Keep records in process memory.
    #[default]
    Memory,
    /// Append records to a JSON Lines file.
    File,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            file_path: default_store_path(),
        }
    }
}

/// Emergency fallback channel configuration.
///
/// The fallback channel must be distinct from the primary store, so a file
/// backend here should never point at `StoreConfig::file_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyConfig {
    /// Fallback sink type.
    #[serde(default)]
    pub backend: EmergencyBackend,

    /// File path (for the file backend).
    #[serde(default = "default_emergency_path")]
    pub file_path: String,
}

/// Emergency sink type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmergencyBackend {
    /// Emit on the dedicated `emergency_audit` tracing target.
    #[default]
    Tracing,
    /// Append lines to a dedicated file.
    File,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            backend: EmergencyBackend::default(),
            file_path: default_emergency_path(),
        }
    }
}

fn default_store_path() -> String {
    "audit.jsonl".to_string()
}

fn default_emergency_path() -> String {
    "emergency-audit.log".to_string()
}
