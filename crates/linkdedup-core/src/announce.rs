//! Announce control messages.
//!
//! When a link's window pair changes, the side that changed it tells the peer
//! with a metadata-only [`ControlMessage`]. An `initialize` announcement carries
//! both windows so the peer can build its mirror from scratch; an `advance`
//! announcement carries the epoch number and the new head window only.

use std::collections::BTreeMap;

use crate::error::AnnounceError;
use crate::message::ControlMessage;
use crate::session::Bounds;
use crate::types::SequenceKey;

pub const SEQUENCE_KEY: &str = "sequenceKey";

pub const ADVANCE: &str = "advance";
pub const ADVANCE_EPOCH: &str = "advanceEpoch";
pub const ADVANCE_HEAD_LO: &str = "advanceHeadLo";
pub const ADVANCE_HEAD_HI: &str = "advanceHeadHi";

pub const INITIALIZE: &str = "initialize";
pub const INITIALIZE_HEAD_LO: &str = "initializeHeadLo";
pub const INITIALIZE_HEAD_HI: &str = "initializeHeadHi";
pub const INITIALIZE_TAIL_LO: &str = "initializeTailLo";
pub const INITIALIZE_TAIL_HI: &str = "initializeTailHi";

/// A decoded window transition announced by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    Initialize {
        key: SequenceKey,
        head: Bounds,
        tail: Bounds,
    },
    Advance {
        key: SequenceKey,
        epoch: u64,
        head: Bounds,
    },
}

impl Announcement {
    pub fn key(&self) -> &SequenceKey {
        match self {
            Announcement::Initialize { key, .. } | Announcement::Advance { key, .. } => key,
        }
    }

    /// Encode into a fresh control message.
    pub fn to_message(&self) -> ControlMessage {
        let mut headers = BTreeMap::new();
        match self {
            Announcement::Initialize { key, head, tail } => {
                headers.insert(SEQUENCE_KEY.to_string(), key.to_string());
                headers.insert(INITIALIZE.to_string(), "true".to_string());
                headers.insert(INITIALIZE_HEAD_LO.to_string(), head.lo.to_string());
                headers.insert(INITIALIZE_HEAD_HI.to_string(), head.hi.to_string());
                headers.insert(INITIALIZE_TAIL_LO.to_string(), tail.lo.to_string());
                headers.insert(INITIALIZE_TAIL_HI.to_string(), tail.hi.to_string());
            }
            Announcement::Advance { key, epoch, head } => {
                headers.insert(SEQUENCE_KEY.to_string(), key.to_string());
                headers.insert(ADVANCE.to_string(), "true".to_string());
                headers.insert(ADVANCE_EPOCH.to_string(), epoch.to_string());
                headers.insert(ADVANCE_HEAD_LO.to_string(), head.lo.to_string());
                headers.insert(ADVANCE_HEAD_HI.to_string(), head.hi.to_string());
            }
        }
        ControlMessage::new(headers)
    }

    /// Decode a control message received from the peer.
    pub fn from_message(msg: &ControlMessage) -> Result<Self, AnnounceError> {
        if !msg.body.is_empty() {
            return Err(AnnounceError::NonEmptyBody(msg.body.len()));
        }
        let key = SequenceKey::new(require(msg, SEQUENCE_KEY)?);

        if is_flag_set(msg, INITIALIZE) {
            let head = bounds(msg, INITIALIZE_HEAD_LO, INITIALIZE_HEAD_HI)?;
            let tail = bounds(msg, INITIALIZE_TAIL_LO, INITIALIZE_TAIL_HI)?;
            return Ok(Announcement::Initialize { key, head, tail });
        }

        if is_flag_set(msg, ADVANCE) {
            let epoch = number(msg, ADVANCE_EPOCH)?;
            let head = bounds(msg, ADVANCE_HEAD_LO, ADVANCE_HEAD_HI)?;
            return Ok(Announcement::Advance { key, epoch, head });
        }

        Err(AnnounceError::UnknownKind)
    }
}

/// Whether a message looks like an announcement at all.
///
/// Used by receivers to split announce traffic from ordinary messages before
/// attempting a full decode.
pub fn is_announcement(msg: &ControlMessage) -> bool {
    is_flag_set(msg, INITIALIZE) || is_flag_set(msg, ADVANCE)
}

fn is_flag_set(msg: &ControlMessage, name: &str) -> bool {
    msg.header(name)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

fn require<'a>(msg: &'a ControlMessage, name: &'static str) -> Result<&'a str, AnnounceError> {
    msg.header(name).ok_or(AnnounceError::MissingHeader(name))
}

fn number(msg: &ControlMessage, name: &'static str) -> Result<u64, AnnounceError> {
    let raw = require(msg, name)?;
    raw.trim().parse().map_err(|_| AnnounceError::InvalidNumber {
        header: name,
        value: raw.to_string(),
    })
}

fn bounds(
    msg: &ControlMessage,
    lo_name: &'static str,
    hi_name: &'static str,
) -> Result<Bounds, AnnounceError> {
    let lo = number(msg, lo_name)?;
    let hi = number(msg, hi_name)?;
    if lo >= hi {
        return Err(AnnounceError::EmptyWindow { lo, hi });
    }
    Ok(Bounds::new(lo, hi))
}
