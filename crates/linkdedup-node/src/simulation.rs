//! In-process replay of a link: a sending [`Deduplicator`] and a receiving
//! [`AnnounceMirror`] connected by a [`ChannelSink`].
//!
//! Backs the `simulate` subcommand and doubles as an end-to-end smoke test
//! of the announce protocol.

use std::sync::Arc;

use linkdedup_core::{LinkState, SequenceKey};
use linkdedup_store::{
    FileLinkStateStore, LinkStateStore, MemoryLinkStateStore, MemoryPartitionStore,
};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::mirror::{AnnounceMirror, MirrorOutcome};
use crate::pipeline::{Deduplicator, Outcome};
use crate::sink::ChannelSink;

/// Capacity of the announce channel between the two sides.
const ANNOUNCE_CHANNEL_CAPACITY: usize = 64;

/// Parameters of one replay.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub key: SequenceKey,
    /// Sequence numbers `0..messages` are sent in order.
    pub messages: u64,
    /// Every `k`-th message is sent a second time. `None` disables resends.
    pub duplicate_every: Option<u64>,
}

/// What happened during a replay.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub forwarded: u64,
    pub duplicates: u64,
    pub announcements: u64,
    pub sender: LinkState,
    pub mirror: LinkState,
}

/// Run a replay, persisting the sender's state under `[storage].path` when set.
pub async fn run(config: &NodeConfig, plan: &SimulationPlan) -> Result<SimulationReport, NodeError> {
    match &config.storage.path {
        Some(path) => {
            let states = FileLinkStateStore::new(path.clone())?;
            run_with(states, config, plan).await
        }
        None => run_with(MemoryLinkStateStore::new(), config, plan).await,
    }
}

async fn run_with<S>(
    states: S,
    config: &NodeConfig,
    plan: &SimulationPlan,
) -> Result<SimulationReport, NodeError>
where
    S: LinkStateStore,
{
    let (sink, mut rx) = ChannelSink::channel(ANNOUNCE_CHANNEL_CAPACITY);
    let sender = Deduplicator::new(
        states,
        MemoryPartitionStore::new(),
        sink,
        config.dedup.clone(),
    );
    let mirror = Arc::new(AnnounceMirror::new(
        MemoryLinkStateStore::new(),
        MemoryPartitionStore::new(),
        config.dedup.clone(),
    ));

    let receiver = {
        let mirror = Arc::clone(&mirror);
        tokio::spawn(async move {
            let mut applied = 0u64;
            while let Some(message) = rx.recv().await {
                match mirror.apply(&message).await? {
                    MirrorOutcome::AlreadyApplied => {}
                    MirrorOutcome::Initialized | MirrorOutcome::Advanced { .. } => applied += 1,
                }
            }
            Ok::<u64, NodeError>(applied)
        })
    };

    let mut forwarded = 0;
    let mut duplicates = 0;
    for seq in 0..plan.messages {
        let message_id = format!("{}-{seq}", plan.key);
        let resend = plan
            .duplicate_every
            .is_some_and(|k| k > 0 && seq % k == k - 1);
        let sends = if resend { 2 } else { 1 };
        for _ in 0..sends {
            match sender.process(&plan.key, seq, &message_id).await? {
                Outcome::Forward => forwarded += 1,
                Outcome::Duplicate => duplicates += 1,
            }
        }
    }

    let sender_state = sender.state(&plan.key).await?;
    // Dropping the sender closes the channel and lets the receiver drain.
    drop(sender);
    let announcements = receiver
        .await
        .map_err(|e| NodeError::Io(std::io::Error::other(e)))??;
    let mirror_state = mirror.state(&plan.key).await?;

    tracing::info!(
        key = %plan.key,
        forwarded,
        duplicates,
        announcements,
        sender = %sender_state,
        mirror = %mirror_state,
        "simulation finished"
    );

    Ok(SimulationReport {
        forwarded,
        duplicates,
        announcements,
        sender: sender_state,
        mirror: mirror_state,
    })
}
