//! Subject capability for entity-change audits.

/// An entity whose mutations can be audited.
///
/// The audit pipeline only needs an identifier and a classification string,
/// so domain models implement this instead of the pipeline depending on them.
pub trait Auditable {
    /// Store identifier of the entity, if it has been assigned one.
    fn audit_id(&self) -> Option<i64>;

    /// Classification recorded as the audit record's entity type
    /// (typically the domain type name, e.g. `"Order"`).
    fn audit_type(&self) -> &str;
}
