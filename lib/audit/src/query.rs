//! Read-only audit queries for compliance export.

use crate::entry::AuditEntry;
use crate::error::AuditError;
use crate::logger::AuditSink;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Filter for audit queries. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQuery {
    /// Inclusive lower bound on the entry timestamp.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the entry timestamp.
    pub to: Option<DateTime<Utc>>,
    /// Restrict to one connector.
    pub connector_id: Option<tollgate_core::ConnectorId>,
    /// Restrict to one principal.
    pub principal: Option<tollgate_core::PrincipalId>,
}

impl AuditQuery {
    /// Matches everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to entries at or after `from`.
    #[must_use]
    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    /// Restricts to entries strictly before `to`.
    #[must_use]
    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    /// Restricts to one connector.
    #[must_use]
    pub fn for_connector(mut self, id: tollgate_core::ConnectorId) -> Self {
        self.connector_id = Some(id);
        self
    }

    /// Restricts to one principal.
    #[must_use]
    pub fn for_principal(mut self, id: tollgate_core::PrincipalId) -> Self {
        self.principal = Some(id);
        self
    }

    /// Whether an entry satisfies the filter.
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(from) = self.from
            && entry.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to
            && entry.timestamp >= to
        {
            return false;
        }
        if let Some(connector_id) = self.connector_id
            && entry.connector_id != connector_id
        {
            return false;
        }
        if let Some(principal) = self.principal
            && entry.principal != principal
        {
            return false;
        }
        true
    }
}

/// A queryable audit destination.
#[async_trait]
pub trait AuditStore: AuditSink {
    /// Returns entries matching the query, in recording order.
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError>;
}

/// In-memory audit store, for tests and embedded deployments.
///
/// Write behavior is scriptable (delays and failures) so logger retry and
/// backpressure paths can be exercised.
#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: Mutex<Vec<AuditEntry>>,
    fail_next: AtomicU32,
    write_delay: Mutex<Option<Duration>>,
}

impl InMemoryAuditStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns whether no entries have been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries in recording order.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Makes the next `n` writes fail.
    pub fn fail_next_writes(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delays every write by `delay`.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditStore {
    async fn write(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(AuditError::WriteFailed {
                reason: "scripted failure".to_string(),
            });
        }

        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AuditDecision;
    use chrono::Duration as ChronoDuration;
    use tollgate_core::{ConnectorId, PrincipalId};

    fn entry_for(
        principal: PrincipalId,
        connector_id: ConnectorId,
        timestamp: DateTime<Utc>,
    ) -> AuditEntry {
        let mut entry = AuditEntry::new(
            principal,
            connector_id,
            "cache",
            "read",
            "user:1",
            AuditDecision::Allowed,
        );
        entry.timestamp = timestamp;
        entry
    }

    #[tokio::test]
    async fn query_filters_by_connector_and_principal() {
        let store = InMemoryAuditStore::new();
        let now = Utc::now();

        let principal_a = PrincipalId::new();
        let principal_b = PrincipalId::new();
        let conn_a = ConnectorId::new();
        let conn_b = ConnectorId::new();

        store
            .write(&entry_for(principal_a, conn_a, now))
            .await
            .expect("write");
        store
            .write(&entry_for(principal_a, conn_b, now))
            .await
            .expect("write");
        store
            .write(&entry_for(principal_b, conn_a, now))
            .await
            .expect("write");

        let by_connector = store
            .query(&AuditQuery::all().for_connector(conn_a))
            .await
            .expect("query");
        assert_eq!(by_connector.len(), 2);

        let narrowed = store
            .query(
                &AuditQuery::all()
                    .for_connector(conn_a)
                    .for_principal(principal_b),
            )
            .await
            .expect("query");
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].principal, principal_b);
    }

    #[tokio::test]
    async fn query_filters_by_time_range() {
        let store = InMemoryAuditStore::new();
        let base = Utc::now();
        let principal = PrincipalId::new();
        let connector = ConnectorId::new();

        for offset in 0..5 {
            store
                .write(&entry_for(
                    principal,
                    connector,
                    base + ChronoDuration::minutes(offset),
                ))
                .await
                .expect("write");
        }

        let window = store
            .query(
                &AuditQuery::all()
                    .from(base + ChronoDuration::minutes(1))
                    .to(base + ChronoDuration::minutes(4)),
            )
            .await
            .expect("query");

        // Inclusive lower bound, exclusive upper bound.
        assert_eq!(window.len(), 3);
    }

    #[tokio::test]
    async fn empty_query_matches_all() {
        let store = InMemoryAuditStore::new();
        store
            .write(&entry_for(PrincipalId::new(), ConnectorId::new(), Utc::now()))
            .await
            .expect("write");

        let all = store.query(&AuditQuery::all()).await.expect("query");
        assert_eq!(all.len(), 1);
    }
}
