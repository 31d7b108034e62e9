//! Forwarding-pipeline dedup step.
//!
//! For every sequenced message on a link the [`Deduplicator`] picks the
//! partition that owns the sequence number, records the message there and
//! reports whether it should be forwarded. Once a message reaches the middle
//! of the head window, the window pair is advanced and the peer is told.
//!
//! Two guards keep window recycling ordered with respect to dedup writes:
//! - a per-link `RwLock` gate: recording holds it shared, initialization and
//!   advancing hold it exclusively, so no worker can write into a partition
//!   while it is being truncated for reuse;
//! - compare-and-set on the persisted link state, so writers in other
//!   processes lose cleanly and retry from a fresh load.
//!
//! A recycled partition whose truncation failed blocks recording on its link
//! until the truncation is retried successfully.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use linkdedup_core::{LinkState, SequenceKey, SessionState, TableName, WindowError};
use linkdedup_store::{LinkStateStore, PartitionStore, Recorded};

use crate::config::DedupSection;
use crate::error::PipelineError;
use crate::recycle::PendingTruncations;
use crate::sink::AnnounceSink;

/// What to do with a message after the dedup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// First sighting of this sequence number on the link.
    Forward,
    /// Already forwarded; drop it.
    Duplicate,
}

/// Result of trying to announce the current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Announced {
    Yes,
    /// The peer could not be reached; the state stays un-announced.
    Deferred,
    /// Someone else changed the state between load and write.
    Conflict,
}

pub struct Deduplicator<S, P, A> {
    states: S,
    partitions: P,
    sink: A,
    config: DedupSection,
    gates: Mutex<HashMap<SequenceKey, Arc<RwLock<()>>>>,
    recycling: PendingTruncations,
}

impl<S, P, A> Deduplicator<S, P, A>
where
    S: LinkStateStore,
    P: PartitionStore,
    A: AnnounceSink,
{
    pub fn new(states: S, partitions: P, sink: A, config: DedupSection) -> Self {
        Self {
            states,
            partitions,
            sink,
            config,
            gates: Mutex::new(HashMap::new()),
            recycling: PendingTruncations::default(),
        }
    }

    pub fn states(&self) -> &S {
        &self.states
    }

    pub fn partitions(&self) -> &P {
        &self.partitions
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }

    /// Current persisted state of `key`.
    pub async fn state(&self, key: &SequenceKey) -> Result<LinkState, PipelineError> {
        Ok(self.states.load(key).await?)
    }

    async fn gate(&self, key: &SequenceKey) -> Arc<RwLock<()>> {
        let mut gates = self.gates.lock().await;
        gates.entry(key.clone()).or_default().clone()
    }

    /// Run the dedup step for one message.
    ///
    /// Fails with an out-of-window [`PipelineError`] when `seq` is not covered
    /// by either retained window; such messages are neither forwarded nor
    /// silently dropped.
    pub async fn process(
        &self,
        key: &SequenceKey,
        seq: u64,
        message_id: &str,
    ) -> Result<Outcome, PipelineError> {
        let gate = self.gate(key).await;

        if !self.states.load(key).await?.is_initialized() {
            let _exclusive = gate.write().await;
            self.initialize(key).await?;
        }

        let (outcome, state) = loop {
            if self.recycling.is_pending(key).await {
                let _exclusive = gate.write().await;
                self.recycling.flush(&self.partitions, key).await?;
            }

            let _shared = gate.read().await;
            if self.recycling.is_pending(key).await {
                continue;
            }
            let state = self.states.load(key).await?;
            let table = match state.table_name(seq) {
                Ok(table) => table.clone(),
                Err(e) => {
                    if matches!(e, WindowError::OutOfWindow { .. }) {
                        tracing::error!(
                            %key,
                            seq,
                            state = %state,
                            ahead = state.is_stale(seq),
                            "sequence outside both dedup windows"
                        );
                    }
                    return Err(e.into());
                }
            };
            let outcome = match self.partitions.record(&table, seq, message_id).await? {
                Recorded::New => Outcome::Forward,
                Recorded::Duplicate => Outcome::Duplicate,
            };
            tracing::trace!(%key, seq, %table, ?outcome, "dedup decision");
            break (outcome, state);
        };

        if state.should_advance(seq) || !state.is_announced() {
            let _exclusive = gate.write().await;
            // The decision above is already recorded, so a failure here only
            // postpones the advance to a later message.
            if let Err(e) = self.maintain(key, seq).await {
                tracing::warn!(%key, seq, error = %e, "window maintenance deferred");
            }
        }

        Ok(outcome)
    }

    /// Initialize an unknown link. Caller holds the exclusive gate.
    async fn initialize(&self, key: &SequenceKey) -> Result<(), PipelineError> {
        let mut conflicts = 0;
        loop {
            let state = self.states.load(key).await?;
            if state.is_initialized() {
                return Ok(());
            }

            let (head, tail) = self.config.partition_names(key);
            let next = state.initialize(head, tail, self.config.epoch_size)?;
            match self.states.compare_and_set(key, &state, &next).await {
                Ok(()) => {
                    let tables: Vec<TableName> = [next.head(), next.tail()]
                        .into_iter()
                        .flatten()
                        .map(|session| session.table().clone())
                        .collect();
                    self.recycling
                        .truncate(&self.partitions, key, tables)
                        .await?;
                    tracing::info!(%key, state = %next, "initialized link");
                    self.announce(key, &next).await?;
                    return Ok(());
                }
                Err(e) if e.is_conflict() => conflicts = self.on_conflict(key, conflicts)?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Deliver a pending announcement and advance if `seq` calls for it.
    /// Caller holds the exclusive gate.
    ///
    /// An epoch is never advanced past before it has been announced, so the
    /// peer cannot miss an intermediate window.
    async fn maintain(&self, key: &SequenceKey, seq: u64) -> Result<(), PipelineError> {
        self.recycling.flush(&self.partitions, key).await?;

        let mut conflicts = 0;
        loop {
            let state = self.states.load(key).await?;
            if !state.is_initialized() {
                return Ok(());
            }

            if !state.is_announced() {
                match self.announce(key, &state).await? {
                    Announced::Yes => continue,
                    Announced::Deferred => return Ok(()),
                    Announced::Conflict => {
                        conflicts = self.on_conflict(key, conflicts)?;
                        continue;
                    }
                }
            }

            if !state.should_advance(seq) {
                return Ok(());
            }

            let epoch_size = state.epoch_size().unwrap_or(self.config.epoch_size);
            let next = state.advance(epoch_size)?;
            match self.states.compare_and_set(key, &state, &next).await {
                Ok(()) => {
                    if let Some(head) = next.head().map(SessionState::table) {
                        self.recycling
                            .truncate(&self.partitions, key, vec![head.clone()])
                            .await?;
                    }
                    tracing::info!(%key, from = %state, to = %next, "advanced link window");
                }
                Err(e) if e.is_conflict() => conflicts = self.on_conflict(key, conflicts)?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send the announcement for `state`'s epoch, then persist it as announced.
    async fn announce(
        &self,
        key: &SequenceKey,
        state: &LinkState,
    ) -> Result<Announced, PipelineError> {
        let (announced, message) = state.announce(key)?;
        let message_id = message.id.clone();

        if let Err(e) = self.sink.send(message).await {
            tracing::warn!(
                %key,
                epoch = state.epoch(),
                error = %e,
                "announce delivery failed, will retry"
            );
            return Ok(Announced::Deferred);
        }
        tracing::debug!(%key, epoch = state.epoch(), %message_id, "announced window transition");

        match self.states.compare_and_set(key, state, &announced).await {
            Ok(()) => Ok(Announced::Yes),
            Err(e) if e.is_conflict() => Ok(Announced::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    fn on_conflict(&self, key: &SequenceKey, conflicts: u32) -> Result<u32, PipelineError> {
        let conflicts = conflicts + 1;
        if conflicts >= self.config.max_conflict_retries {
            tracing::warn!(%key, conflicts, "too many concurrent link state updates");
            return Err(PipelineError::ConflictRetriesExhausted {
                key: key.clone(),
                attempts: conflicts,
            });
        }
        tracing::debug!(%key, conflicts, "link state changed concurrently, retrying");
        Ok(conflicts)
    }
}
