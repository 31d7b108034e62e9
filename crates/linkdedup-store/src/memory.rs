//! In-memory stores.
//!
//! Used when no storage directory is configured and throughout the tests.
//! Both stores guard their maps with a `tokio::sync::Mutex`, which also makes
//! compare-and-set atomic within the process.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::Mutex;

use linkdedup_core::{LinkState, LinkStateRow, SequenceKey, TableName};

use crate::error::StoreError;
use crate::traits::{LinkStateStore, PartitionStore, Recorded};

/// Link state rows keyed by sequence key.
#[derive(Debug, Default)]
pub struct MemoryLinkStateStore {
    rows: Mutex<HashMap<SequenceKey, LinkStateRow>>,
}

impl MemoryLinkStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of links with a stored row.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

impl LinkStateStore for MemoryLinkStateStore {
    async fn load(&self, key: &SequenceKey) -> Result<LinkState, StoreError> {
        let rows = self.rows.lock().await;
        match rows.get(key) {
            Some(row) => Ok(LinkState::try_from(row.clone())?),
            None => Ok(LinkState::uninitialized()),
        }
    }

    async fn compare_and_set(
        &self,
        key: &SequenceKey,
        expected: &LinkState,
        new: &LinkState,
    ) -> Result<(), StoreError> {
        let expected = LinkStateRow::from(expected);
        let mut rows = self.rows.lock().await;
        let current = rows
            .get(key)
            .map(LinkStateRow::version)
            .unwrap_or((0, false));
        if current != expected.version() {
            return Err(StoreError::Conflict { key: key.clone() });
        }
        rows.insert(key.clone(), LinkStateRow::from(new));
        Ok(())
    }
}

/// Dedup records per partition, keyed by sequence number.
#[derive(Debug, Default)]
pub struct MemoryPartitionStore {
    tables: Mutex<HashMap<TableName, BTreeMap<u64, String>>>,
}

impl MemoryPartitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held by `table`.
    pub async fn record_count(&self, table: &TableName) -> usize {
        self.tables
            .lock()
            .await
            .get(table)
            .map_or(0, BTreeMap::len)
    }

    /// Whether `seq` is recorded in `table`.
    pub async fn contains(&self, table: &TableName, seq: u64) -> bool {
        self.tables
            .lock()
            .await
            .get(table)
            .is_some_and(|records| records.contains_key(&seq))
    }
}

impl PartitionStore for MemoryPartitionStore {
    async fn record(
        &self,
        table: &TableName,
        seq: u64,
        message_id: &str,
    ) -> Result<Recorded, StoreError> {
        let mut tables = self.tables.lock().await;
        let records = tables.entry(table.clone()).or_default();
        match records.get(&seq) {
            Some(existing) => {
                if existing != message_id {
                    tracing::warn!(
                        %table,
                        seq,
                        recorded = %existing,
                        incoming = %message_id,
                        "sequence number reused by a different message"
                    );
                }
                Ok(Recorded::Duplicate)
            }
            None => {
                records.insert(seq, message_id.to_string());
                Ok(Recorded::New)
            }
        }
    }

    async fn truncate(&self, table: &TableName) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let removed = tables
            .get_mut(table)
            .map_or(0, |records| std::mem::take(records).len());
        tracing::debug!(%table, removed, "truncated partition");
        Ok(removed as u64)
    }
}
