//! Outgoing control messages.

use std::collections::BTreeMap;

/// A metadata-only message sent to the peer side of a link.
///
/// Every message gets a fresh UUID v4 identifier. Announcements never carry a
/// body; all information lives in the header map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub id: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl ControlMessage {
    /// Create a message with a newly generated identifier and an empty body.
    pub fn new(headers: BTreeMap<String, String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            headers,
            body: Vec::new(),
        }
    }

    /// Look up a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}
