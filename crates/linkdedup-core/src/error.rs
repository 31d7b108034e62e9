//! Window state and announce error types.

use crate::session::Bounds;
use crate::types::TableName;

/// Errors raised by [`LinkState`](crate::LinkState) transitions and queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("link state has already been initialized")]
    AlreadyInitialized,

    #[error("link state has not been initialized")]
    NotInitialized,

    #[error("sequence {seq} does not match the current epoch {head},{tail}")]
    OutOfWindow { seq: u64, head: Bounds, tail: Bounds },

    #[error("empty window: [{lo},{hi})")]
    EmptyWindow { lo: u64, hi: u64 },

    #[error("head and tail must use distinct partitions, both are {0}")]
    SharedPartition(TableName),

    #[error("sequence overflow advancing past {0}")]
    SequenceOverflow(u64),

    #[error("corrupt link state row: {0}")]
    CorruptRow(String),
}

/// Errors decoding an announce control message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnnounceError {
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid number in header {header}: {value:?}")]
    InvalidNumber { header: &'static str, value: String },

    #[error("message is neither an initialize nor an advance announcement")]
    UnknownKind,

    #[error("announce message carries a {0} byte body")]
    NonEmptyBody(usize),

    #[error("announced window is empty: [{lo},{hi})")]
    EmptyWindow { lo: u64, hi: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_error_display() {
        assert_eq!(
            WindowError::AlreadyInitialized.to_string(),
            "link state has already been initialized"
        );

        let err = WindowError::OutOfWindow {
            seq: 250,
            head: Bounds::new(100, 200),
            tail: Bounds::new(0, 100),
        };
        assert_eq!(
            err.to_string(),
            "sequence 250 does not match the current epoch [100,200),[0,100)"
        );

        let err = WindowError::SharedPartition(TableName::from("t"));
        assert_eq!(
            err.to_string(),
            "head and tail must use distinct partitions, both are t"
        );
    }

    #[test]
    fn test_announce_error_display() {
        let err = AnnounceError::MissingHeader("advanceEpoch");
        assert_eq!(err.to_string(), "missing header: advanceEpoch");

        let err = AnnounceError::InvalidNumber {
            header: "advanceHeadLo",
            value: "x1".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid number in header advanceHeadLo: \"x1\""
        );
    }
}
