//! Record persistence with emergency fallback.

use std::sync::Arc;

use crate::emergency::EmergencyFallback;
use crate::mask::mask;
use crate::record::AuditRecord;
use crate::store::AuditStore;
use crate::validate::validate;

const CRITICAL_ACTIONS: [&str; 3] = ["DELETE", "SECURITY", "AUTH"];
const CRITICAL_ENTITY_TYPES: [&str; 3] = ["USER", "PERMISSION", "ROLE"];

/// Whether a record warrants emergency backup when the store rejects it.
pub fn is_critical(record: &AuditRecord) -> bool {
    let action = record.action().to_uppercase();
    if CRITICAL_ACTIONS.iter().any(|k| action.contains(k)) {
        return true;
    }
    record.entity_type().is_some_and(|t| {
        let t = t.to_uppercase();
        CRITICAL_ENTITY_TYPES.iter().any(|k| t.contains(k))
    })
}

/// Runs validation, masking and the store write for a single record.
pub struct Persister {
    store: Arc<dyn AuditStore>,
    fallback: EmergencyFallback,
}

impl Persister {
    pub fn new(store: Arc<dyn AuditStore>, fallback: EmergencyFallback) -> Self {
        Self { store, fallback }
    }

    /// Persist a record. Never fails; returns whether the store accepted it.
    ///
    /// A rejected critical record goes to the emergency fallback; any other
    /// rejected record is logged and dropped.
    pub async fn persist(&self, record: AuditRecord) -> bool {
        let record = mask(validate(record));

        match self.store.save(record.clone()).await {
            Ok(id) => {
                tracing::debug!(
                    id,
                    action = %record.action(),
                    user_id = %record.user_id(),
                    "Audit record saved"
                );
                true
            }
            Err(e) if is_critical(&record) => {
                tracing::error!(
                    action = %record.action(),
                    user_id = %record.user_id(),
                    error = %e,
                    "Failed to save critical audit record, using emergency fallback"
                );
                self.fallback.record(&record).await;
                false
            }
            Err(e) => {
                tracing::error!(
                    action = %record.action(),
                    user_id = %record.user_id(),
                    error = %e,
                    "Failed to save audit record, record dropped"
                );
                false
            }
        }
    }
}
