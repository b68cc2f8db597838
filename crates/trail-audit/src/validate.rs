//! Record validation.
//!
//! Validation never rejects a record. Constraint violations are repaired in
//! place and, where data had to be replaced, flagged through `has_errors`.

use crate::codec;
use crate::record::{AuditRecord, SYSTEM_USER};

/// Maximum action length, in characters.
pub const MAX_ACTION_LEN: usize = 50;

/// Maximum entity type length, in characters.
pub const MAX_ENTITY_TYPE_LEN: usize = 100;

/// Details stored when the original details were not valid JSON.
pub const INVALID_JSON_DETAILS: &str = r#"{"error":"Invalid JSON in original details"}"#;

/// Repair a record so it satisfies the persistence constraints.
pub fn validate(mut record: AuditRecord) -> AuditRecord {
    if record.user_id.trim().is_empty() {
        tracing::debug!(action = %record.action, "Blank audit user replaced with SYSTEM");
        record.user_id = SYSTEM_USER.to_string();
    }

    if truncate_chars(&mut record.action, MAX_ACTION_LEN) {
        tracing::debug!(action = %record.action, "Audit action truncated");
    }

    if let Some(entity_type) = record.entity_type.as_mut() {
        if truncate_chars(entity_type, MAX_ENTITY_TYPE_LEN) {
            tracing::debug!(action = %record.action, "Audit entity type truncated");
        }
    }

    if let Err(e) = codec::decode(&record.details) {
        tracing::warn!(action = %record.action, error = %e, "Audit details replaced");
        record.details = INVALID_JSON_DETAILS.to_string();
        record.has_errors = true;
    }

    record
}

/// Truncate to at most `max` characters. Returns whether anything was cut.
fn truncate_chars(s: &mut String, max: usize) -> bool {
    match s.char_indices().nth(max) {
        Some((idx, _)) => {
            s.truncate(idx);
            true
        }
        None => false,
    }
}
