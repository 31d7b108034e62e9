//! Storage traits used by the dedup pipeline.

use std::sync::Arc;

use linkdedup_core::{LinkState, SequenceKey, TableName};

use crate::error::StoreError;

/// Durable home of each link's [`LinkState`].
///
/// The only write path is [`compare_and_set`](LinkStateStore::compare_and_set),
/// so concurrent writers racing on the same link see a
/// [`StoreError::Conflict`] instead of silently overwriting each other.
pub trait LinkStateStore: Send + Sync {
    /// Load the state of `key`. A link with no row is uninitialized.
    fn load(
        &self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<LinkState, StoreError>> + Send;

    /// Replace the stored state with `new` if it still has the same
    /// `(epoch, isAnnounced)` version as `expected`.
    ///
    /// A missing row matches an uninitialized `expected`.
    fn compare_and_set(
        &self,
        key: &SequenceKey,
        expected: &LinkState,
        new: &LinkState,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Outcome of recording a sequence number in a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// First time this sequence number was seen; forward the message.
    New,
    /// Already recorded; suppress the message.
    Duplicate,
}

/// Physical dedup partitions.
pub trait PartitionStore: Send + Sync {
    /// Record `seq` in `table`, reporting whether it was already present.
    fn record(
        &self,
        table: &TableName,
        seq: u64,
        message_id: &str,
    ) -> impl Future<Output = Result<Recorded, StoreError>> + Send;

    /// Drop every record in `table`, returning how many were removed.
    ///
    /// Called when an advance recycles the partition for a new head window.
    fn truncate(&self, table: &TableName) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

impl<T: LinkStateStore> LinkStateStore for Arc<T> {
    fn load(
        &self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<LinkState, StoreError>> + Send {
        (**self).load(key)
    }

    fn compare_and_set(
        &self,
        key: &SequenceKey,
        expected: &LinkState,
        new: &LinkState,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).compare_and_set(key, expected, new)
    }
}

impl<T: PartitionStore> PartitionStore for Arc<T> {
    fn record(
        &self,
        table: &TableName,
        seq: u64,
        message_id: &str,
    ) -> impl Future<Output = Result<Recorded, StoreError>> + Send {
        (**self).record(table, seq, message_id)
    }

    fn truncate(&self, table: &TableName) -> impl Future<Output = Result<u64, StoreError>> + Send {
        (**self).truncate(table)
    }
}
