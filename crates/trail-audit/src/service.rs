//! Audit trail service.
//!
//! Provides the main [`AuditTrail`] type with the three write operations
//! (entity change, user action, system event) and the read operations used by
//! calling services.
//!
//! Write operations never fail: auditing must not abort the business
//! operation it accompanies. Problems surface through logs, the `has_errors`
//! flag and [`AuditTrail::records_with_errors`].

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use trail_core::{Auditable, TrailConfig};

use crate::codec::{self, DetailMap, DetailValue};
use crate::dispatch::{Dispatcher, Priority};
use crate::emergency::{EmergencyFallback, EmergencySink, create_emergency_sink};
use crate::error::AuditError;
use crate::persist::Persister;
use crate::record::{AuditRecord, SYSTEM_USER};
use crate::retry::{RetryPolicy, RetryScheduler, TokioScheduler, retry_with_backoff};
use crate::store::{AuditStore, create_store};

/// Entity type of user-action records.
pub const USER_ACTION_TYPE: &str = "UserAction";

/// Entity type of system-event records.
pub const SYSTEM_EVENT_TYPE: &str = "SystemEvent";

/// Action of records written by the user-action retry path.
pub const USER_ACTION_RETRY: &str = "USER_ACTION_RETRY";

/// Value recorded as `changedFields` for updates. Field-level change
/// tracking is not available, so every update reports all fields.
pub const ALL_FIELDS_CHANGED: &str = "ALL";

/// The audit trail.
pub struct AuditTrail {
    config: TrailConfig,
    store: Arc<dyn AuditStore>,
    persister: Arc<Persister>,
    dispatcher: Dispatcher,
    scheduler: Arc<dyn RetryScheduler>,
    retry: RetryPolicy,
}

impl AuditTrail {
    /// Create an audit trail with the store and fallback sink named in the
    /// configuration. Must be called inside a tokio runtime.
    pub fn new(config: TrailConfig) -> Result<Self, AuditError> {
        config.validate()?;
        let store = create_store(&config.store)?;
        let sink = create_emergency_sink(&config.emergency)?;
        Self::builder(config).store(store).emergency_sink(sink).build()
    }

    /// Start a builder for custom components.
    pub fn builder(config: TrailConfig) -> AuditTrailBuilder {
        AuditTrailBuilder::new(config)
    }

    /// Check if auditing is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Audit a change to a domain entity. Always asynchronous.
    ///
    /// `UPDATE` actions record `"changedFields": "ALL"`.
    pub async fn audit_entity_change(&self, entity: &impl Auditable, action: &str, user_id: &str) {
        if !self.config.enabled {
            return;
        }

        let entity_type = entity.audit_type();
        let entity_id = entity.audit_id();

        let mut details = DetailMap::new()
            .with("entityType", entity_type)
            .with("entityId", entity_id)
            .with("operation", action);
        if action.eq_ignore_ascii_case("UPDATE") {
            details.insert("changedFields", ALL_FIELDS_CHANGED);
        }

        let Some(record) = Self::build_record(action, Some(entity_type), entity_id, user_id, details)
        else {
            return;
        };
        self.dispatch(record, Priority::Normal).await;
    }

    /// Audit a user action. Always synchronous.
    ///
    /// If the write fails, up to `retry.max_attempts` simplified
    /// `USER_ACTION_RETRY` records are tried with linear backoff.
    pub async fn audit_user_action(
        &self,
        user_id: &str,
        action: &str,
        details: impl Into<DetailValue>,
    ) {
        if !self.config.enabled {
            return;
        }

        let Some(record) = Self::build_record(action, Some(USER_ACTION_TYPE), None, user_id, details)
        else {
            return;
        };
        let original_details = record.details().to_string();

        if self.dispatch(record, Priority::High).await {
            return;
        }
        self.retry_user_action(user_id, action, &original_details).await;
    }

    /// Audit a system event.
    ///
    /// Events whose type mentions errors, security, auth or critical
    /// conditions are persisted before returning; all others are queued.
    pub async fn audit_system_event(
        &self,
        event_type: &str,
        description: &str,
        details: impl Into<DetailValue>,
    ) {
        if !self.config.enabled {
            return;
        }

        let payload = DetailMap::new()
            .with("description", description)
            .with("details", details);
        let Some(record) =
            Self::build_record(event_type, Some(SYSTEM_EVENT_TYPE), None, SYSTEM_USER, payload)
        else {
            return;
        };

        self.dispatch(record, Priority::for_system_event(event_type))
            .await;
    }

    /// History of one entity, newest first.
    ///
    /// Empty when either argument is missing or the store fails.
    pub async fn audit_history(
        &self,
        entity_id: Option<i64>,
        entity_type: Option<&str>,
    ) -> Vec<AuditRecord> {
        let (Some(entity_id), Some(entity_type)) = (entity_id, entity_type) else {
            return Vec::new();
        };

        self.store
            .find_by_entity(entity_id, entity_type)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(entity_id, entity_type, error = %e, "Failed to load audit history");
                Vec::new()
            })
    }

    /// Activity of one user within `[from, to]`, newest first.
    ///
    /// Empty when an argument is missing or `to < from`. Ranges longer than
    /// `activity_window_days` are cut to that window from `from`.
    pub async fn user_activity_log(
        &self,
        user_id: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Vec<AuditRecord> {
        let (Some(user_id), Some(from), Some(to)) = (user_id, from, to) else {
            return Vec::new();
        };
        if to < from {
            return Vec::new();
        }

        let window = Duration::days(i64::from(self.config.activity_window_days));
        let to = if to - from > window {
            tracing::debug!(user_id, %from, %to, "User activity range clamped");
            from + window
        } else {
            to
        };

        self.store
            .find_by_user_and_time_range(user_id, from, to)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(user_id, error = %e, "Failed to load user activity");
                Vec::new()
            })
    }

    /// The `limit` most recent records.
    pub async fn recent_activity(&self, limit: usize) -> Vec<AuditRecord> {
        self.store.find_most_recent(limit).await.unwrap_or_else(|e| {
            tracing::error!(limit, error = %e, "Failed to load recent audit records");
            Vec::new()
        })
    }

    /// Records that were stored with substituted details.
    pub async fn records_with_errors(&self) -> Vec<AuditRecord> {
        self.store.find_with_errors().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to load flagged audit records");
            Vec::new()
        })
    }

    /// Records with the given action.
    pub async fn records_by_action(&self, action: &str) -> Vec<AuditRecord> {
        self.store.find_by_action(action).await.unwrap_or_else(|e| {
            tracing::error!(action, error = %e, "Failed to load audit records by action");
            Vec::new()
        })
    }

    /// Number of queued asynchronous records not yet handled.
    pub fn pending(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Wait for all queued asynchronous records to be handled.
    pub async fn drain(&self) {
        self.dispatcher.drain().await;
    }

    /// Drain and stop the asynchronous worker pool.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }

    /// Persist inline (`High`) or queue for the worker pool (`Normal`).
    ///
    /// Returns whether the record was saved, or for `Normal` whether it was
    /// accepted onto the queue.
    async fn dispatch(&self, record: AuditRecord, priority: Priority) -> bool {
        tracing::debug!(action = %record.action(), ?priority, "Dispatching audit record");
        match priority {
            Priority::High => self.persister.persist(record).await,
            Priority::Normal => self.dispatcher.submit(record),
        }
    }

    fn build_record(
        action: &str,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
        user_id: &str,
        details: impl Into<DetailValue>,
    ) -> Option<AuditRecord> {
        let builder = match AuditRecord::builder(action) {
            Ok(builder) => builder,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Audit write skipped");
                return None;
            }
        };
        let builder = match entity_type {
            Some(entity_type) => builder.entity_type(entity_type),
            None => builder,
        };
        Some(
            builder
                .entity_id(entity_id)
                .user_id(user_id)
                .details(details)
                .build(),
        )
    }

    async fn retry_user_action(&self, user_id: &str, action: &str, original_details: &str) {
        // Keep the original payload structured so masking still reaches it.
        let original: DetailValue = codec::decode(original_details)
            .unwrap_or_else(|_| DetailValue::from(original_details));

        let succeeded = retry_with_backoff(&self.retry, self.scheduler.as_ref(), |attempt| {
            let details = DetailMap::new()
                .with("originalAction", action)
                .with("originalDetails", original.clone())
                .with("retryAttempt", attempt);
            let record = Self::build_record(
                USER_ACTION_RETRY,
                Some(USER_ACTION_TYPE),
                None,
                user_id,
                details,
            );
            let persister = Arc::clone(&self.persister);
            async move {
                match record {
                    Some(record) => persister.persist(record).await,
                    None => false,
                }
            }
        })
        .await;

        match succeeded {
            Some(attempt) => {
                tracing::info!(user_id, action, attempt, "User action audited on retry");
            }
            None => {
                tracing::error!(
                    user_id,
                    action,
                    attempts = self.retry.max_attempts,
                    "User action audit failed after all retries"
                );
            }
        }
    }
}

/// Builder for [`AuditTrail`].
pub struct AuditTrailBuilder {
    config: TrailConfig,
    store: Option<Arc<dyn AuditStore>>,
    sink: Option<Arc<dyn EmergencySink>>,
    scheduler: Option<Arc<dyn RetryScheduler>>,
}

impl AuditTrailBuilder {
    pub fn new(config: TrailConfig) -> Self {
        Self {
            config,
            store: None,
            sink: None,
            scheduler: None,
        }
    }

    /// Set the primary store. Defaults to an in-memory store.
    pub fn store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the emergency sink. Defaults to the tracing sink.
    pub fn emergency_sink(mut self, sink: Arc<dyn EmergencySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the retry scheduler. Defaults to the tokio timer.
    pub fn scheduler(mut self, scheduler: Arc<dyn RetryScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Build the audit trail and spawn its worker pool.
    ///
    /// Fails when the configuration does not pass [`TrailConfig::validate`].
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<AuditTrail, AuditError> {
        self.config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(crate::store::InMemoryAuditStore::new()));
        let fallback = match self.sink {
            Some(sink) => EmergencyFallback::new(sink),
            None => EmergencyFallback::default(),
        };
        let persister = Arc::new(Persister::new(Arc::clone(&store), fallback));
        let dispatcher = Dispatcher::spawn(Arc::clone(&persister), &self.config.dispatch);
        let retry = RetryPolicy::from(&self.config.retry);

        Ok(AuditTrail {
            config: self.config,
            store,
            persister,
            dispatcher,
            scheduler: self.scheduler.unwrap_or_else(|| Arc::new(TokioScheduler)),
            retry,
        })
    }
}
