//! The asynchronous audit logger.
//!
//! `record` enqueues and returns; a background worker drains the queue and
//! writes to the sink with bounded retry. Recording never alters the
//! already-made dispatch decision, and a persistent sink failure is surfaced
//! on a separate operational-error channel rather than silently dropped.

use crate::entry::AuditEntry;
use crate::error::{AuditError, AuditWriteFailure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::error;

/// Where to put pressure when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Evict the oldest queued entry and count the drop.
    #[default]
    DropOldest,
    /// Make `record` wait for queue space.
    BlockPublisher,
}

/// Audit logger configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Maximum queued entries.
    pub queue_capacity: usize,
    /// Behavior when the queue is full.
    pub backpressure: BackpressurePolicy,
    /// Sink write attempts before an entry is declared lost.
    pub max_write_attempts: u32,
    /// Delay between write attempts, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            backpressure: BackpressurePolicy::default(),
            max_write_attempts: 3,
            retry_backoff_ms: 50,
        }
    }
}

/// Destination for audit entries (database table, log shipper, ...).
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Writes one entry.
    ///
    /// # Errors
    ///
    /// Returns an error on write failure; the logger retries a bounded
    /// number of times.
    async fn write(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

struct QueueState {
    entries: VecDeque<AuditEntry>,
    last_timestamp: DateTime<Utc>,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    capacity: usize,
    policy: BackpressurePolicy,
    dropped: AtomicU64,
    write_failures: AtomicU64,
    /// Signaled when the worker pops an entry (space available).
    space: Notify,
    /// Signaled when an entry is pushed or the queue closes.
    pending: Notify,
}

/// Asynchronous, append-only audit recording.
pub struct AuditLogger {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AuditLogger {
    /// Spawns the logger's background worker over the given sink.
    ///
    /// Returns the logger and the operational-error channel carrying
    /// [`AuditWriteFailure`] reports.
    #[must_use]
    pub fn spawn(
        sink: Arc<dyn AuditSink>,
        config: AuditConfig,
    ) -> (Self, mpsc::UnboundedReceiver<AuditWriteFailure>) {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                last_timestamp: DateTime::<Utc>::MIN_UTC,
                closed: false,
            }),
            capacity: config.queue_capacity.max(1),
            policy: config.backpressure,
            dropped: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            space: Notify::new(),
            pending: Notify::new(),
        });

        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(Self::drain(
            Arc::clone(&shared),
            sink,
            config,
            ops_tx,
        ));

        (
            Self {
                shared,
                worker: Mutex::new(Some(worker)),
            },
            ops_rx,
        )
    }

    /// Enqueues an entry.
    ///
    /// The entry's timestamp is clamped so timestamps are monotonic
    /// non-decreasing in queue order. Under `drop_oldest` this never waits;
    /// under `block_publisher` it waits for queue space (bounded by queue
    /// drain, not by sink latency for the entry being recorded).
    pub async fn record(&self, mut entry: AuditEntry) {
        loop {
            {
                let mut state = self.shared.state.lock().unwrap();
                if state.closed {
                    // Late entries after shutdown are counted, not silently lost.
                    self.shared.dropped.fetch_add(1, Ordering::SeqCst);
                    return;
                }
                if state.entries.len() < self.shared.capacity {
                    if entry.timestamp < state.last_timestamp {
                        entry.timestamp = state.last_timestamp;
                    }
                    state.last_timestamp = entry.timestamp;
                    state.entries.push_back(entry);
                    self.shared.pending.notify_one();
                    return;
                }
                if self.shared.policy == BackpressurePolicy::DropOldest {
                    state.entries.pop_front();
                    self.shared.dropped.fetch_add(1, Ordering::SeqCst);
                    if entry.timestamp < state.last_timestamp {
                        entry.timestamp = state.last_timestamp;
                    }
                    state.last_timestamp = entry.timestamp;
                    state.entries.push_back(entry);
                    self.shared.pending.notify_one();
                    return;
                }
            }
            // BlockPublisher: wait for the worker to pop something.
            self.shared.space.notified().await;
        }
    }

    /// Entries evicted (or refused after shutdown) so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::SeqCst)
    }

    /// Entries declared lost after exhausting write attempts.
    #[must_use]
    pub fn write_failures(&self) -> u64 {
        self.shared.write_failures.load(Ordering::SeqCst)
    }

    /// Closes the queue and waits for the worker to drain it.
    pub async fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.closed = true;
        }
        self.shared.pending.notify_one();

        let worker = {
            let mut slot = self.worker.lock().unwrap();
            slot.take()
        };
        if let Some(worker) = worker {
            // The worker only ever exits cleanly.
            let _ = worker.await;
        }
    }

    async fn drain(
        shared: Arc<Shared>,
        sink: Arc<dyn AuditSink>,
        config: AuditConfig,
        ops_tx: mpsc::UnboundedSender<AuditWriteFailure>,
    ) {
        loop {
            let next = {
                let mut state = shared.state.lock().unwrap();
                match state.entries.pop_front() {
                    Some(entry) => Some(entry),
                    None if state.closed => break,
                    None => None,
                }
            };

            let Some(entry) = next else {
                shared.pending.notified().await;
                continue;
            };
            shared.space.notify_one();

            let mut last_error = None;
            let attempts = config.max_write_attempts.max(1);
            for attempt in 1..=attempts {
                match sink.write(&entry).await {
                    Ok(()) => {
                        last_error = None;
                        break;
                    }
                    Err(e) => {
                        last_error = Some(e);
                        if attempt < attempts {
                            tokio::time::sleep(Duration::from_millis(config.retry_backoff_ms))
                                .await;
                        }
                    }
                }
            }

            if let Some(e) = last_error {
                shared.write_failures.fetch_add(1, Ordering::SeqCst);
                error!(entry_id = %entry.id, error = %e, "audit entry lost");
                let _ = ops_tx.send(AuditWriteFailure {
                    entry_id: entry.id,
                    attempts,
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AuditDecision;
    use crate::query::InMemoryAuditStore;
    use tollgate_core::{ConnectorId, PrincipalId};

    fn entry() -> AuditEntry {
        AuditEntry::new(
            PrincipalId::new(),
            ConnectorId::new(),
            "cache",
            "read",
            "user:1",
            AuditDecision::Allowed,
        )
    }

    fn config(capacity: usize, backpressure: BackpressurePolicy) -> AuditConfig {
        AuditConfig {
            queue_capacity: capacity,
            backpressure,
            max_write_attempts: 3,
            retry_backoff_ms: 10,
        }
    }

    #[tokio::test]
    async fn records_every_entry() {
        let store = Arc::new(InMemoryAuditStore::new());
        let (logger, _ops) = AuditLogger::spawn(
            Arc::clone(&store) as Arc<dyn AuditSink>,
            AuditConfig::default(),
        );

        for _ in 0..25 {
            logger.record(entry()).await;
        }
        logger.shutdown().await;

        assert_eq!(store.len(), 25);
        assert_eq!(logger.dropped(), 0);
        assert_eq!(logger.write_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_oldest_evicts_and_counts() {
        let store = Arc::new(InMemoryAuditStore::new());
        // An hour-long write keeps the worker busy on the first entry.
        store.set_write_delay(Some(Duration::from_secs(3600)));
        let (logger, _ops) = AuditLogger::spawn(
            Arc::clone(&store) as Arc<dyn AuditSink>,
            config(2, BackpressurePolicy::DropOldest),
        );

        logger.record(entry()).await;
        tokio::task::yield_now().await; // worker takes the first entry

        logger.record(entry()).await;
        logger.record(entry()).await;
        logger.record(entry()).await; // queue full: evicts one

        assert_eq!(logger.dropped(), 1);

        store.set_write_delay(None);
        tokio::time::advance(Duration::from_secs(3600)).await;
        logger.shutdown().await;

        assert_eq!(store.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn block_publisher_waits_for_space() {
        let store = Arc::new(InMemoryAuditStore::new());
        store.set_write_delay(Some(Duration::from_secs(60)));
        let logger = Arc::new(
            AuditLogger::spawn(
                Arc::clone(&store) as Arc<dyn AuditSink>,
                config(1, BackpressurePolicy::BlockPublisher),
            )
            .0,
        );

        logger.record(entry()).await;
        tokio::task::yield_now().await; // worker busy with the first entry
        logger.record(entry()).await; // fills the queue

        let blocked = {
            let logger = Arc::clone(&logger);
            tokio::spawn(async move { logger.record(entry()).await })
        };
        tokio::task::yield_now().await;
        assert!(!blocked.is_finished());

        // Finishing one write frees a slot.
        tokio::time::advance(Duration::from_secs(60)).await;
        blocked.await.expect("record completes");

        assert_eq!(logger.dropped(), 0);
    }

    #[tokio::test]
    async fn transient_sink_failure_is_retried() {
        let store = Arc::new(InMemoryAuditStore::new());
        store.fail_next_writes(2);
        let (logger, mut ops) = AuditLogger::spawn(
            Arc::clone(&store) as Arc<dyn AuditSink>,
            AuditConfig::default(),
        );

        logger.record(entry()).await;
        logger.shutdown().await;

        assert_eq!(store.len(), 1);
        assert_eq!(logger.write_failures(), 0);
        assert!(ops.try_recv().is_err());
    }

    #[tokio::test]
    async fn persistent_sink_failure_is_reported_not_silent() {
        let store = Arc::new(InMemoryAuditStore::new());
        store.fail_next_writes(10);
        let (logger, mut ops) = AuditLogger::spawn(
            Arc::clone(&store) as Arc<dyn AuditSink>,
            AuditConfig::default(),
        );

        logger.record(entry()).await;
        logger.shutdown().await;

        assert_eq!(store.len(), 0);
        assert_eq!(logger.write_failures(), 1);
        let failure = ops.try_recv().expect("operational error reported");
        assert_eq!(failure.attempts, 3);
    }

    #[tokio::test]
    async fn timestamps_are_monotonic_in_queue_order() {
        let store = Arc::new(InMemoryAuditStore::new());
        let (logger, _ops) = AuditLogger::spawn(
            Arc::clone(&store) as Arc<dyn AuditSink>,
            AuditConfig::default(),
        );

        let mut early = entry();
        early.timestamp = Utc::now() - chrono::Duration::hours(1);
        logger.record(entry()).await;
        logger.record(early).await;
        logger.shutdown().await;

        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].timestamp >= entries[0].timestamp);
    }

    #[tokio::test]
    async fn record_after_shutdown_counts_as_dropped() {
        let store = Arc::new(InMemoryAuditStore::new());
        let (logger, _ops) = AuditLogger::spawn(
            Arc::clone(&store) as Arc<dyn AuditSink>,
            AuditConfig::default(),
        );

        logger.shutdown().await;
        logger.record(entry()).await;
        assert_eq!(logger.dropped(), 1);
    }
}
