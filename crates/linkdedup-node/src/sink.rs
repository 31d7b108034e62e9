//! Delivery of announce messages to the peer side of a link.

use tokio::sync::mpsc;

use linkdedup_core::ControlMessage;

use crate::error::SinkError;

/// Where announcements go once the local state has changed.
///
/// A failed send is not fatal to forwarding: the state stays un-announced and
/// the pipeline tries again on a later message.
pub trait AnnounceSink: Send + Sync {
    fn send(&self, message: ControlMessage) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Sink backed by a tokio channel, for in-process peers and tests.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ControlMessage>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ControlMessage>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ControlMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl AnnounceSink for ChannelSink {
    async fn send(&self, message: ControlMessage) -> Result<(), SinkError> {
        self.tx.send(message).await.map_err(|_| SinkError::Closed)
    }
}
