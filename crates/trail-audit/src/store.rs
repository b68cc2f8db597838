//! Audit store backends.
//!
//! The store is the durable, append-only home of audit records. It is shared
//! between the caller's task and the dispatch workers and performs its own
//! write isolation; the pipeline never locks records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use trail_core::config::{StoreBackend, StoreConfig};

use crate::error::AuditError;
use crate::record::AuditRecord;

/// Trait for audit store backends.
///
/// Entity and user queries return records newest first.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a record, returning its assigned identifier.
    async fn save(&self, record: AuditRecord) -> Result<u64, AuditError>;

    /// Records about one entity.
    async fn find_by_entity(
        &self,
        entity_id: i64,
        entity_type: &str,
    ) -> Result<Vec<AuditRecord>, AuditError>;

    /// Records by one user within `[from, to]`.
    async fn find_by_user_and_time_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, AuditError>;

    /// Records with the given action.
    async fn find_by_action(&self, action: &str) -> Result<Vec<AuditRecord>, AuditError>;

    /// The `limit` most recent records.
    async fn find_most_recent(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError>;

    /// Records flagged with `has_errors`.
    async fn find_with_errors(&self) -> Result<Vec<AuditRecord>, AuditError>;
}

/// Create a store backend based on configuration.
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn AuditStore>, AuditError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryAuditStore::new())),
        StoreBackend::File => Ok(Arc::new(FileAuditStore::open(&config.file_path)?)),
    }
}

/// Records plus the next identifier to hand out.
#[derive(Debug, Default)]
struct RecordIndex {
    records: Vec<AuditRecord>,
    next_id: u64,
}

impl RecordIndex {
    fn from_records(records: Vec<AuditRecord>) -> Self {
        let next_id = records.iter().filter_map(AuditRecord::id).max().unwrap_or(0) + 1;
        Self { records, next_id }
    }

    fn assign(&mut self, record: AuditRecord) -> AuditRecord {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        record.with_id(id)
    }

    fn select(&self, pred: impl Fn(&AuditRecord) -> bool) -> Vec<AuditRecord> {
        let mut results: Vec<_> = self.records.iter().filter(|r| pred(r)).cloned().collect();
        sort_newest_first(&mut results);
        results
    }

    fn most_recent(&self, limit: usize) -> Vec<AuditRecord> {
        let mut results = self.select(|_| true);
        results.truncate(limit);
        results
    }
}

fn sort_newest_first(records: &mut [AuditRecord]) {
    records.sort_by(|a, b| {
        b.timestamp()
            .cmp(&a.timestamp())
            .then_with(|| b.id().cmp(&a.id()))
    });
}

fn lock_error<E: std::fmt::Display>(e: E) -> AuditError {
    AuditError::StorageError(format!("Failed to acquire store lock: {}", e))
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    index: RwLock<RecordIndex>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.index.read().map(|i| i.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn query(
        &self,
        pred: impl Fn(&AuditRecord) -> bool,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(self.index.read().map_err(lock_error)?.select(pred))
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn save(&self, record: AuditRecord) -> Result<u64, AuditError> {
        let mut index = self.index.write().map_err(lock_error)?;
        let record = index.assign(record);
        let id = record.id().unwrap_or_default();
        index.records.push(record);
        Ok(id)
    }

    async fn find_by_entity(
        &self,
        entity_id: i64,
        entity_type: &str,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        self.query(|r| r.entity_id() == Some(entity_id) && r.entity_type() == Some(entity_type))
    }

    async fn find_by_user_and_time_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        self.query(|r| r.user_id() == user_id && r.timestamp() >= from && r.timestamp() <= to)
    }

    async fn find_by_action(&self, action: &str) -> Result<Vec<AuditRecord>, AuditError> {
        self.query(|r| r.action() == action)
    }

    async fn find_most_recent(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(self.index.read().map_err(lock_error)?.most_recent(limit))
    }

    async fn find_with_errors(&self) -> Result<Vec<AuditRecord>, AuditError> {
        self.query(AuditRecord::has_errors)
    }
}

/// File store (appends JSON Lines to a log file).
///
/// Existing records are loaded when the store is opened; queries are served
/// from the in-memory copy.
#[derive(Debug)]
pub struct FileAuditStore {
    path: PathBuf,
    index: RwLock<RecordIndex>,
}

impl FileAuditStore {
    /// Open (or create) a file store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let records = Self::load_from_file(&path)?;
        tracing::info!(path = %path.display(), "Loaded {} audit records", records.len());

        Ok(Self {
            path,
            index: RwLock::new(RecordIndex::from_records(records)),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_file(path: &Path) -> Result<Vec<AuditRecord>, AuditError> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(path)?);
        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        error = %e,
                        "Skipping unreadable audit record"
                    );
                }
            }
        }
        Ok(records)
    }

    fn query(
        &self,
        pred: impl Fn(&AuditRecord) -> bool,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(self.index.read().map_err(lock_error)?.select(pred))
    }
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn save(&self, record: AuditRecord) -> Result<u64, AuditError> {
        let mut index = self.index.write().map_err(lock_error)?;
        let record = index.assign(record);
        let json = serde_json::to_string(&record)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;
        file.sync_data()?;

        let id = record.id().unwrap_or_default();
        index.records.push(record);
        Ok(id)
    }

    async fn find_by_entity(
        &self,
        entity_id: i64,
        entity_type: &str,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        self.query(|r| r.entity_id() == Some(entity_id) && r.entity_type() == Some(entity_type))
    }

    async fn find_by_user_and_time_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        self.query(|r| r.user_id() == user_id && r.timestamp() >= from && r.timestamp() <= to)
    }

    async fn find_by_action(&self, action: &str) -> Result<Vec<AuditRecord>, AuditError> {
        self.query(|r| r.action() == action)
    }

    async fn find_most_recent(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(self.index.read().map_err(lock_error)?.most_recent(limit))
    }

    async fn find_with_errors(&self) -> Result<Vec<AuditRecord>, AuditError> {
        self.query(AuditRecord::has_errors)
    }
}
