//! Truncation of partitions recycled by a committed window transition.
//!
//! A transition is persisted first and its recycled partitions are truncated
//! afterwards. When a truncation fails the partition is remembered here, and
//! the link must not record into it until [`PendingTruncations::flush`]
//! succeeds.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::Mutex;

use linkdedup_core::{SequenceKey, TableName};
use linkdedup_store::{PartitionStore, StoreError};

#[derive(Debug, Default)]
pub(crate) struct PendingTruncations {
    pending: Mutex<HashMap<SequenceKey, BTreeSet<TableName>>>,
}

impl PendingTruncations {
    pub(crate) async fn is_pending(&self, key: &SequenceKey) -> bool {
        self.pending.lock().await.contains_key(key)
    }

    /// Truncate `tables` in order. On the first failure that table and every
    /// one after it stay pending for `key`.
    pub(crate) async fn truncate<P: PartitionStore>(
        &self,
        partitions: &P,
        key: &SequenceKey,
        tables: Vec<TableName>,
    ) -> Result<u64, StoreError> {
        let mut removed = 0;
        let mut remaining = tables.into_iter();
        while let Some(table) = remaining.next() {
            match partitions.truncate(&table).await {
                Ok(n) => {
                    tracing::debug!(%key, %table, removed = n, "recycled partition");
                    removed += n;
                }
                Err(e) => {
                    tracing::warn!(%key, %table, error = %e, "partition truncation failed, will retry");
                    let mut pending = self.pending.lock().await;
                    pending
                        .entry(key.clone())
                        .or_default()
                        .extend(std::iter::once(table).chain(remaining));
                    return Err(e);
                }
            }
        }
        Ok(removed)
    }

    /// Retry whatever truncation is still outstanding for `key`.
    pub(crate) async fn flush<P: PartitionStore>(
        &self,
        partitions: &P,
        key: &SequenceKey,
    ) -> Result<(), StoreError> {
        let Some(tables) = self.pending.lock().await.remove(key) else {
            return Ok(());
        };
        let removed = self
            .truncate(partitions, key, tables.into_iter().collect())
            .await?;
        tracing::info!(%key, removed, "completed deferred partition truncation");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FailingTruncate;
    use super::*;

    #[tokio::test]
    async fn failed_truncation_stays_pending_until_flushed() {
        let partitions = FailingTruncate::default();
        let pending = PendingTruncations::default();
        let key = SequenceKey::from("k");
        let (a, b) = (TableName::from("a"), TableName::from("b"));
        partitions.inner.record(&a, 1, "m1").await.unwrap();
        partitions.inner.record(&b, 2, "m2").await.unwrap();

        partitions.fail_next_truncate();
        assert!(
            pending
                .truncate(&partitions, &key, vec![a.clone(), b.clone()])
                .await
                .is_err()
        );
        assert!(pending.is_pending(&key).await);
        assert_eq!(partitions.inner.record_count(&a).await, 1);
        assert_eq!(partitions.inner.record_count(&b).await, 1);

        pending.flush(&partitions, &key).await.unwrap();
        assert!(!pending.is_pending(&key).await);
        assert_eq!(partitions.inner.record_count(&a).await, 0);
        assert_eq!(partitions.inner.record_count(&b).await, 0);
    }

    #[tokio::test]
    async fn flush_without_pending_work_is_a_noop() {
        let partitions = FailingTruncate::default();
        let pending = PendingTruncations::default();
        let key = SequenceKey::from("k");
        partitions.inner.record(&TableName::from("a"), 1, "m1").await.unwrap();

        pending.flush(&partitions, &key).await.unwrap();
        assert_eq!(partitions.inner.record_count(&TableName::from("a")).await, 1);
    }
}
