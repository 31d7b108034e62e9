//! Link dedup orchestration.
//!
//! Ties the window state machine to storage: the sending side's
//! [`Deduplicator`] decides forward-or-suppress for each sequenced message and
//! rotates windows as they fill, and the receiving side's [`AnnounceMirror`]
//! applies the announcements it emits.

pub mod config;
pub mod error;
pub mod inspect;
pub mod logging;
pub mod mirror;
pub mod pipeline;
mod recycle;
pub mod simulation;
pub mod sink;

pub use config::NodeConfig;
pub use error::{MirrorError, NodeError, PipelineError, SinkError};
pub use mirror::{AnnounceMirror, MirrorOutcome};
pub use pipeline::{Deduplicator, Outcome};
pub use sink::{AnnounceSink, ChannelSink};
