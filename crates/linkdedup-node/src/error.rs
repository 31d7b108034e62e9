//! Error types for the dedup pipeline, the announce mirror and the binary.

use linkdedup_core::{AnnounceError, Bounds, SequenceKey, WindowError};
use linkdedup_store::StoreError;

/// Errors from processing one message on the sending side.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("window error: {0}")]
    Window(#[from] WindowError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("gave up on {key} after {attempts} conflicting updates")]
    ConflictRetriesExhausted { key: SequenceKey, attempts: u32 },
}

impl PipelineError {
    /// The message's sequence number is outside both retained windows.
    pub fn is_out_of_window(&self) -> bool {
        matches!(self, PipelineError::Window(WindowError::OutOfWindow { .. }))
    }
}

/// Errors applying a peer's announcement.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("announce error: {0}")]
    Announce(#[from] AnnounceError),

    #[error("window error: {0}")]
    Window(#[from] WindowError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("announced window {announced} for {key} does not match local window {local}")]
    BoundsMismatch {
        key: SequenceKey,
        local: Bounds,
        announced: Bounds,
    },

    #[error("missed announcements for {key}: local epoch {local}, announced epoch {announced}")]
    EpochGap {
        key: SequenceKey,
        local: u64,
        announced: u64,
    },

    #[error("gave up on {key} after {attempts} conflicting updates")]
    ConflictRetriesExhausted { key: SequenceKey, attempts: u32 },
}

/// Errors delivering a control message to the peer.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("announce channel closed")]
    Closed,

    #[error("peer rejected announcement: {0}")]
    Rejected(String),
}

/// Errors surfaced by the binary.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("mirror error: {0}")]
    Mirror(#[from] MirrorError),
}
