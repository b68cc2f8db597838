//! # trail-audit
//!
//! Audit trail pipeline for CRUD services.
//!
//! This crate provides functionality for:
//! - Recording entity changes, user actions and system events
//! - Repairing records that violate field constraints
//! - Masking passwords, secrets, tokens and keys in detail payloads
//! - Persisting synchronously or on a bounded background worker pool
//! - Falling back to an emergency channel when the store rejects a critical record
//! - Querying entity history and user activity
//!
//! ## Pipeline
//!
//! ```text
//! caller -> build -> validate -> mask -> dispatch -> AuditStore::save
//!                                                    |
//!                                                    +-- on failure: emergency fallback (critical)
//!                                                                    or log and drop
//! ```
//!
//! ## Dispatch
//!
//! | Write | Mode |
//! |-------|------|
//! | Entity change | Asynchronous |
//! | User action | Synchronous, retried with backoff on failure |
//! | System event (`ERROR`, `SECURITY`, `AUTH`, `CRITICAL`) | Synchronous |
//! | Other system events | Asynchronous |
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use trail_audit::{AuditTrail, DetailMap};
//! use trail_core::TrailConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let trail = AuditTrail::new(TrailConfig::default())?;
//!
//! trail
//!     .audit_user_action("alice", "LOGIN", DetailMap::new().with("ip", "10.0.0.7"))
//!     .await;
//!
//! trail
//!     .audit_system_event("AUTH_FAILURE", "bad credentials", DetailMap::new())
//!     .await;
//!
//! // Flush queued writes before exit.
//! trail.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod dispatch;
pub mod emergency;
pub mod error;
pub mod mask;
pub mod persist;
pub mod record;
pub mod retry;
pub mod service;
pub mod store;
pub mod validate;

pub use codec::{DecodeError, DetailMap, DetailValue, EncodeError};
pub use dispatch::{Dispatcher, Priority};
pub use emergency::{
    EmergencyFallback, EmergencySink, FileEmergencySink, TracingEmergencySink, EMERGENCY_MARKER,
};
pub use error::AuditError;
pub use persist::Persister;
pub use record::{AuditRecord, RecordBuilder, SYSTEM_USER};
pub use retry::{RetryPolicy, RetryScheduler, TokioScheduler};
pub use service::{AuditTrail, AuditTrailBuilder};
pub use store::{AuditStore, FileAuditStore, InMemoryAuditStore};
