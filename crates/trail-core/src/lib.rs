// Configuration types shared across all trail crates
pub mod config;

// Capability implemented by audited domain entities
pub mod auditable;

pub use auditable::Auditable;
pub use config::{
    ConfigError,
    DispatchConfig,
    EmergencyBackend,
    EmergencyConfig,
    RetryConfig,
    StoreBackend,
    StoreConfig,
    TrailConfig,
};
