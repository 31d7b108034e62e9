//! Epoch-versioned dedup windows for router links.
//!
//! This crate defines the per-link window state machine ([`LinkState`]), the
//! windows it is composed of ([`SessionState`]), the announce control messages
//! exchanged with the peer side of a link, and the flattened row used to
//! persist link state. Nothing here performs I/O.

pub mod announce;
pub mod error;
pub mod link_state;
pub mod message;
pub mod row;
pub mod session;
pub mod types;

pub use announce::Announcement;
pub use error::{AnnounceError, WindowError};
pub use link_state::LinkState;
pub use message::ControlMessage;
pub use row::LinkStateRow;
pub use session::{Bounds, SessionState};
pub use types::{SequenceKey, TableName};
