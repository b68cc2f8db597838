//! Audit record type.
//!
//! An [`AuditRecord`] is the unit of persistence: one append-only entry
//! describing an entity change, user action or system event. Records are
//! created through [`RecordBuilder`], which stamps the creation time and
//! encodes the detail payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{self, DetailValue};
use crate::error::AuditError;

/// Actor recorded when no user is known.
pub const SYSTEM_USER: &str = "SYSTEM";

/// Details stored when the payload could not be encoded.
pub const SERIALIZE_ERROR_DETAILS: &str = r#"{"error":"Failed to serialize details"}"#;

/// An audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Store-assigned identifier, absent until persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<u64>,

    /// Short action code (e.g. "CREATE", "LOGIN").
    pub(crate) action: String,

    /// Classification of the subject ("Order", "UserAction", "SystemEvent").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) entity_type: Option<String>,

    /// Identifier of the subject entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) entity_id: Option<i64>,

    /// Acting user, `SYSTEM` when unknown.
    pub(crate) user_id: String,

    /// Creation instant. Never changes after build.
    timestamp: DateTime<Utc>,

    /// Canonical JSON detail payload.
    pub(crate) details: String,

    /// Set when a fallback value had to be substituted.
    #[serde(default)]
    pub(crate) has_errors: bool,
}

impl AuditRecord {
    /// Start building a record.
    ///
    /// Fails only when `action` is empty or blank.
    pub fn builder(action: impl Into<String>) -> Result<RecordBuilder, AuditError> {
        RecordBuilder::new(action)
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    pub fn entity_id(&self) -> Option<i64> {
        self.entity_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    /// Attach the identifier assigned by a store.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

/// Builder for audit records.
#[derive(Debug)]
pub struct RecordBuilder {
    action: String,
    entity_type: Option<String>,
    entity_id: Option<i64>,
    user_id: Option<String>,
    details: Option<DetailValue>,
}

impl RecordBuilder {
    /// Create a new builder with the required action.
    pub fn new(action: impl Into<String>) -> Result<Self, AuditError> {
        let action = action.into();
        if action.trim().is_empty() {
            return Err(AuditError::EmptyAction);
        }
        Ok(Self {
            action,
            entity_type: None,
            entity_id: None,
            user_id: None,
            details: None,
        })
    }

    /// Set the entity type.
    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Set the entity identifier.
    pub fn entity_id(mut self, id: Option<i64>) -> Self {
        self.entity_id = id;
        self
    }

    /// Set the acting user.
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the detail payload.
    pub fn details(mut self, details: impl Into<DetailValue>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Build the record, stamping the current time.
    ///
    /// A payload that cannot be encoded is replaced by
    /// [`SERIALIZE_ERROR_DETAILS`] and flagged through `has_errors`.
    pub fn build(self) -> AuditRecord {
        let (details, has_errors) = match codec::encode(self.details.as_ref()) {
            Ok(text) => (text, false),
            Err(e) => {
                tracing::warn!(action = %self.action, error = %e, "Failed to encode audit details");
                (SERIALIZE_ERROR_DETAILS.to_string(), true)
            }
        };

        AuditRecord {
            id: None,
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            user_id: self.user_id.unwrap_or_else(|| SYSTEM_USER.to_string()),
            timestamp: Utc::now(),
            details,
            has_errors,
        }
    }
}
