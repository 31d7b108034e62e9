//! Receiving side of the announce protocol.
//!
//! Both ends of a link recycle their own pair of partitions, so the receiver
//! keeps a mirror [`LinkState`] per sequence key and replays each announced
//! transition on it. After every applied announcement the mirror's windows
//! have exactly the bounds the sender announced, and the mirrored state is
//! marked announced since the peer has already told us about that epoch.

use linkdedup_core::{
    Announcement, Bounds, ControlMessage, LinkState, SequenceKey, SessionState, TableName,
    WindowError,
};
use linkdedup_store::{LinkStateStore, PartitionStore};

use crate::config::DedupSection;
use crate::error::MirrorError;
use crate::recycle::PendingTruncations;

/// What applying an announcement did to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    Initialized,
    Advanced { epoch: u64 },
    /// The announcement was a redelivery of something already applied.
    AlreadyApplied,
}

pub struct AnnounceMirror<S, P> {
    states: S,
    partitions: P,
    config: DedupSection,
    recycling: PendingTruncations,
}

impl<S, P> AnnounceMirror<S, P>
where
    S: LinkStateStore,
    P: PartitionStore,
{
    pub fn new(states: S, partitions: P, config: DedupSection) -> Self {
        Self {
            states,
            partitions,
            config,
            recycling: PendingTruncations::default(),
        }
    }

    pub fn states(&self) -> &S {
        &self.states
    }

    pub fn partitions(&self) -> &P {
        &self.partitions
    }

    /// Current mirrored state of `key`.
    pub async fn state(&self, key: &SequenceKey) -> Result<LinkState, MirrorError> {
        Ok(self.states.load(key).await?)
    }

    /// Decode and apply a control message received from the peer.
    pub async fn apply(&self, message: &ControlMessage) -> Result<MirrorOutcome, MirrorError> {
        let announcement = Announcement::from_message(message)?;
        self.apply_announcement(&announcement).await
    }

    pub async fn apply_announcement(
        &self,
        announcement: &Announcement,
    ) -> Result<MirrorOutcome, MirrorError> {
        let key = announcement.key();
        self.recycling.flush(&self.partitions, key).await?;

        let mut conflicts = 0;
        loop {
            let state = self.states.load(key).await?;
            let Some(next) = self.next_state(&state, announcement)? else {
                tracing::debug!(%key, state = %state, "announcement already applied");
                return Ok(MirrorOutcome::AlreadyApplied);
            };

            match self.states.compare_and_set(key, &state, &next).await {
                Ok(()) => return self.commit(key, &state, &next).await,
                Err(e) if e.is_conflict() => {
                    conflicts += 1;
                    if conflicts >= self.config.max_conflict_retries {
                        return Err(MirrorError::ConflictRetriesExhausted {
                            key: key.clone(),
                            attempts: conflicts,
                        });
                    }
                    tracing::debug!(%key, conflicts, "mirror state changed concurrently, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// The state `announcement` moves `state` to, or `None` if it was
    /// already applied.
    fn next_state(
        &self,
        state: &LinkState,
        announcement: &Announcement,
    ) -> Result<Option<LinkState>, MirrorError> {
        match announcement {
            Announcement::Initialize { key, head, tail } => {
                if let (Some(local_head), Some(local_tail)) = (state.head(), state.tail()) {
                    if state.epoch() > 1 {
                        return Ok(None);
                    }
                    check_bounds(key, local_head, *head)?;
                    check_bounds(key, local_tail, *tail)?;
                    return Ok(None);
                }

                let (head_table, tail_table) = self.config.partition_names(key);
                let next = state.initialize(head_table, tail_table, head.len())?;
                verify(key, &next, *head)?;
                if let Some(local_tail) = next.tail() {
                    check_bounds(key, local_tail, *tail)?;
                }
                Ok(Some(next.marked_announced()))
            }
            Announcement::Advance { key, epoch, head } => {
                if !state.is_initialized() {
                    return Err(WindowError::NotInitialized.into());
                }
                if *epoch <= state.epoch() {
                    return Ok(None);
                }
                if *epoch > state.epoch() + 1 {
                    tracing::error!(
                        %key,
                        local = state.epoch(),
                        announced = epoch,
                        "missed window announcements"
                    );
                    return Err(MirrorError::EpochGap {
                        key: key.clone(),
                        local: state.epoch(),
                        announced: *epoch,
                    });
                }

                let next = state.advance(head.len())?;
                verify(key, &next, *head)?;
                Ok(Some(next.marked_announced()))
            }
        }
    }

    /// Post-commit cleanup: empty the partitions that just took on a new range.
    ///
    /// A failed truncation is retried before the next announcement for `key`
    /// is applied, including a redelivery of this one.
    async fn commit(
        &self,
        key: &SequenceKey,
        previous: &LinkState,
        next: &LinkState,
    ) -> Result<MirrorOutcome, MirrorError> {
        if previous.is_initialized() {
            if let Some(head) = next.head() {
                self.recycling
                    .truncate(&self.partitions, key, vec![head.table().clone()])
                    .await?;
            }
            tracing::info!(%key, from = %previous, to = %next, "mirrored window advance");
            Ok(MirrorOutcome::Advanced {
                epoch: next.epoch(),
            })
        } else {
            let tables: Vec<TableName> = [next.head(), next.tail()]
                .into_iter()
                .flatten()
                .map(|session| session.table().clone())
                .collect();
            self.recycling
                .truncate(&self.partitions, key, tables)
                .await?;
            tracing::info!(%key, state = %next, "mirrored link initialization");
            Ok(MirrorOutcome::Initialized)
        }
    }
}

fn verify(key: &SequenceKey, next: &LinkState, announced: Bounds) -> Result<(), MirrorError> {
    match next.head() {
        Some(head) => check_bounds(key, head, announced),
        None => Err(WindowError::NotInitialized.into()),
    }
}

fn check_bounds(
    key: &SequenceKey,
    local: &SessionState,
    announced: Bounds,
) -> Result<(), MirrorError> {
    if local.bounds() != announced {
        tracing::error!(%key, local = %local.bounds(), %announced, "announced window mismatch");
        return Err(MirrorError::BoundsMismatch {
            key: key.clone(),
            local: local.bounds(),
            announced,
        });
    }
    Ok(())
}
