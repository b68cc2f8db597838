//! Synchronous vs. asynchronous dispatch of audit records.
//!
//! High-priority records are persisted on the caller's task. Everything else
//! goes onto a bounded queue served by a fixed pool of worker tasks; the
//! caller never waits on those writes and gets no result back. A full queue
//! drops the record with an error log rather than blocking the caller.
//!
//! [`Dispatcher::drain`] waits until every accepted record has been handled,
//! which gives tests and graceful shutdown a deterministic point to observe.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use trail_core::config::DispatchConfig;

use crate::persist::Persister;
use crate::record::AuditRecord;

const HIGH_PRIORITY_KEYWORDS: [&str; 4] = ["ERROR", "SECURITY", "AUTH", "CRITICAL"];

/// How a record should be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Persist before returning to the caller.
    High,
    /// Fire and forget on the worker pool.
    Normal,
}

impl Priority {
    /// Classify a system event type.
    ///
    /// `AUTH` covers both `AUTHENTICATION` and `AUTHORIZATION` as well as
    /// abbreviated types such as `AUTH_FAILURE`.
    pub fn for_system_event(event_type: &str) -> Self {
        let upper = event_type.to_uppercase();
        if HIGH_PRIORITY_KEYWORDS.iter().any(|k| upper.contains(k)) {
            Priority::High
        } else {
            Priority::Normal
        }
    }
}

/// Bounded worker pool for asynchronous audit writes.
///
/// Must be created inside a tokio runtime.
pub struct Dispatcher {
    tx: Mutex<Option<mpsc::Sender<AuditRecord>>>,
    pending: Arc<watch::Sender<usize>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the worker pool.
    pub fn spawn(persister: Arc<Persister>, config: &DispatchConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&persister),
                    Arc::clone(&pending),
                ))
            })
            .collect();

        Self {
            tx: Mutex::new(Some(tx)),
            pending,
            workers: Mutex::new(workers),
        }
    }

    /// Queue a record for background persistence. Never blocks.
    ///
    /// Returns whether the record was accepted onto the queue.
    pub fn submit(&self, record: AuditRecord) -> bool {
        let Ok(tx) = self.tx.lock() else {
            tracing::error!(action = %record.action(), "Dispatcher lock poisoned, audit record dropped");
            return false;
        };
        let Some(tx) = tx.as_ref() else {
            tracing::warn!(action = %record.action(), "Dispatcher shut down, audit record dropped");
            return false;
        };

        self.pending.send_modify(|n| *n += 1);
        match tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                self.pending.send_modify(|n| *n = n.saturating_sub(1));
                tracing::error!(action = %record.action(), "Audit queue full, audit record dropped");
                false
            }
            Err(TrySendError::Closed(record)) => {
                self.pending.send_modify(|n| *n = n.saturating_sub(1));
                tracing::error!(action = %record.action(), "Audit queue closed, audit record dropped");
                false
            }
        }
    }

    /// Number of accepted records not yet handled.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Wait until every accepted record has been handled.
    pub async fn drain(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Drain the queue, stop accepting records and join the workers.
    pub async fn shutdown(&self) {
        self.drain().await;

        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }

        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(_) => Vec::new(),
        };
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Audit worker terminated abnormally");
            }
        }
        tracing::debug!("Audit dispatcher shut down");
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<AuditRecord>>>,
    persister: Arc<Persister>,
    pending: Arc<watch::Sender<usize>>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(record) = next else {
            break;
        };

        let action = record.action().to_string();
        let persister = Arc::clone(&persister);
        // Run each record in its own task so a panic is contained and logged.
        let task = tokio::spawn(async move {
            persister.persist(record).await;
        });
        if let Err(e) = task.await {
            tracing::error!(worker_id, action = %action, error = %e, "Asynchronous audit task failed");
        }

        pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emergency::EmergencyFallback;
    use crate::store::{AuditStore, InMemoryAuditStore};

    fn dispatcher(store: Arc<InMemoryAuditStore>, config: &DispatchConfig) -> Dispatcher {
        let persister = Arc::new(Persister::new(store, EmergencyFallback::default()));
        Dispatcher::spawn(persister, config)
    }

    fn record(action: &str) -> AuditRecord {
        AuditRecord::builder(action).unwrap().build()
    }

    #[test]
    fn classifies_system_events() {
        assert_eq!(Priority::for_system_event("AUTH_FAILURE"), Priority::High);
        assert_eq!(Priority::for_system_event("authentication_failed"), Priority::High);
        assert_eq!(Priority::for_system_event("AUTHORIZATION_DENIED"), Priority::High);
        assert_eq!(Priority::for_system_event("DB_ERROR"), Priority::High);
        assert_eq!(Priority::for_system_event("Security_Alert"), Priority::High);
        assert_eq!(Priority::for_system_event("CRITICAL_DISK"), Priority::High);
        assert_eq!(Priority::for_system_event("INFO"), Priority::Normal);
        assert_eq!(Priority::for_system_event("STARTUP"), Priority::Normal);
    }

    #[tokio::test]
    async fn drain_waits_for_all_records() {
        let store = Arc::new(InMemoryAuditStore::new());
        let dispatcher = dispatcher(Arc::clone(&store), &DispatchConfig::default());

        for i in 0..20 {
            assert!(dispatcher.submit(record(&format!("EVENT_{}", i))));
        }
        dispatcher.drain().await;

        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(store.find_most_recent(100).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let store = Arc::new(InMemoryAuditStore::new());
        let config = DispatchConfig {
            workers: 1,
            queue_capacity: 2,
        };
        let dispatcher = dispatcher(Arc::clone(&store), &config);

        // Workers cannot run until this task yields, so the queue fills up.
        assert!(dispatcher.submit(record("A")));
        assert!(dispatcher.submit(record("B")));
        assert!(!dispatcher.submit(record("C")));
        assert_eq!(dispatcher.pending(), 2);

        dispatcher.drain().await;
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_records() {
        let store = Arc::new(InMemoryAuditStore::new());
        let dispatcher = dispatcher(Arc::clone(&store), &DispatchConfig::default());

        assert!(dispatcher.submit(record("BEFORE")));
        dispatcher.shutdown().await;

        assert_eq!(store.len(), 1);
        assert!(!dispatcher.submit(record("AFTER")));
        assert_eq!(store.len(), 1);
    }
}
