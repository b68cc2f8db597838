//! Emergency fallback for critical records.
//!
//! When the primary store rejects a critical record, the record is flattened
//! into a single pipe-delimited line and written to a channel that does not
//! depend on the store:
//!
//! ```text
//! EMERGENCY_AUDIT_BACKUP: timestamp|action|entityType|entityId|userId|details
//! ```
//!
//! A failing fallback is terminal for that record. It is logged and never
//! retried.

use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use trail_core::config::{EmergencyBackend, EmergencyConfig};

use crate::error::AuditError;
use crate::record::AuditRecord;

/// Literal marker prefixed to every fallback line.
pub const EMERGENCY_MARKER: &str = "EMERGENCY_AUDIT_BACKUP";

/// Tracing target used by [`TracingEmergencySink`].
pub const EMERGENCY_TARGET: &str = "emergency_audit";

/// A durable channel for fallback lines.
#[async_trait]
pub trait EmergencySink: Send + Sync {
    async fn write_line(&self, line: &str) -> Result<(), AuditError>;
}

/// Create a fallback sink based on configuration.
pub fn create_emergency_sink(
    config: &EmergencyConfig,
) -> Result<Arc<dyn EmergencySink>, AuditError> {
    match config.backend {
        EmergencyBackend::Tracing => Ok(Arc::new(TracingEmergencySink)),
        EmergencyBackend::File => Ok(Arc::new(FileEmergencySink::new(&config.file_path)?)),
    }
}

/// Writes fallback lines as `error` events on the `emergency_audit` target,
/// so a subscriber can route them to their own appender.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEmergencySink;

#[async_trait]
impl EmergencySink for TracingEmergencySink {
    async fn write_line(&self, line: &str) -> Result<(), AuditError> {
        tracing::error!(target: EMERGENCY_TARGET, "{}", line);
        Ok(())
    }
}

/// Appends fallback lines to a dedicated file.
#[derive(Debug)]
pub struct FileEmergencySink {
    path: PathBuf,
    // Serializes appends so concurrent lines never interleave.
    write_lock: Mutex<()>,
}

impl FileEmergencySink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(AuditError::InitializationFailed(
                "emergency file path is empty".to_string(),
            ));
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EmergencySink for FileEmergencySink {
    async fn write_line(&self, line: &str) -> Result<(), AuditError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| AuditError::StorageError(format!("emergency sink lock poisoned: {}", e)))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        file.sync_data()?;
        Ok(())
    }
}

/// Format a record as a fallback line.
pub fn fallback_line(record: &AuditRecord) -> String {
    format!(
        "{}: {}|{}|{}|{}|{}|{}",
        EMERGENCY_MARKER,
        record.timestamp().to_rfc3339(),
        record.action(),
        record.entity_type().unwrap_or_default(),
        record
            .entity_id()
            .map(|id| id.to_string())
            .unwrap_or_default(),
        record.user_id(),
        record.details(),
    )
}

/// Last-resort recorder for critical records.
#[derive(Clone)]
pub struct EmergencyFallback {
    sink: Arc<dyn EmergencySink>,
}

impl EmergencyFallback {
    pub fn new(sink: Arc<dyn EmergencySink>) -> Self {
        Self { sink }
    }

    /// Write the record to the fallback channel. Returns whether it landed.
    pub async fn record(&self, record: &AuditRecord) -> bool {
        match self.sink.write_line(&fallback_line(record)).await {
            Ok(()) => {
                tracing::warn!(action = %record.action(), "Audit record written to emergency fallback");
                true
            }
            Err(e) => {
                tracing::error!(
                    action = %record.action(),
                    user_id = %record.user_id(),
                    error = %e,
                    "Emergency audit fallback failed, record lost"
                );
                false
            }
        }
    }
}

impl Default for EmergencyFallback {
    fn default() -> Self {
        Self::new(Arc::new(TracingEmergencySink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl EmergencySink for BrokenSink {
        async fn write_line(&self, _line: &str) -> Result<(), AuditError> {
            Err(AuditError::StorageError("disk full".to_string()))
        }
    }

    fn delete_record() -> AuditRecord {
        AuditRecord::builder("DELETE_ACCOUNT")
            .unwrap()
            .entity_type("User")
            .entity_id(Some(9))
            .user_id("admin")
            .build()
    }

    #[test]
    fn test_fallback_line_format() {
        let record = delete_record();
        let line = fallback_line(&record);
        let expected = format!(
            "EMERGENCY_AUDIT_BACKUP: {}|DELETE_ACCOUNT|User|9|admin|{{}}",
            record.timestamp().to_rfc3339()
        );
        assert_eq!(line, expected);
    }

    #[test]
    fn test_fallback_line_absent_fields_empty() {
        let record = AuditRecord::builder("AUTH_RESET").unwrap().build();
        let line = fallback_line(&record);
        assert!(line.contains("|AUTH_RESET|||SYSTEM|{}"));
    }

    #[tokio::test]
    async fn test_tracing_sink_emits_marker() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let fallback = EmergencyFallback::default();
        assert!(fallback.record(&delete_record()).await);

        let output = captured.contents();
        assert!(output.contains(EMERGENCY_MARKER));
        assert!(output.contains(EMERGENCY_TARGET));
        assert!(output.contains("DELETE_ACCOUNT"));
    }

    #[tokio::test]
    async fn test_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emergency.log");
        let sink = FileEmergencySink::new(&path).unwrap();
        assert_eq!(sink.path(), path.as_path());
        let fallback = EmergencyFallback::new(Arc::new(sink));

        assert!(fallback.record(&delete_record()).await);
        assert!(fallback.record(&delete_record()).await);

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.lines().all(|l| l.starts_with(EMERGENCY_MARKER)));
    }

    #[tokio::test]
    async fn test_failed_sink_is_terminal() {
        let fallback = EmergencyFallback::new(Arc::new(BrokenSink));
        assert!(!fallback.record(&delete_record()).await);
    }

    #[test]
    fn test_create_sink_rejects_empty_path() {
        let config = EmergencyConfig {
            backend: EmergencyBackend::File,
            file_path: String::new(),
        };
        assert!(create_emergency_sink(&config).is_err());
        assert!(create_emergency_sink(&EmergencyConfig::default()).is_ok());
    }
}
