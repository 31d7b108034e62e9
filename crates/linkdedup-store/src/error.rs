//! Storage error types.

use linkdedup_core::{SequenceKey, WindowError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("concurrent update of link state for {key}")]
    Conflict { key: SequenceKey },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("window error: {0}")]
    Window(#[from] WindowError),

    #[error("failed to determine storage directory: {0}")]
    Directory(String),
}

impl StoreError {
    /// Whether the caller should reload and retry its read-decide-write cycle.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
