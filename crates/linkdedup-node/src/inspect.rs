//! Read-only view of persisted link state, backing the `inspect` subcommand.

use std::path::Path;

use linkdedup_core::{LinkState, SequenceKey};
use linkdedup_store::{FileLinkStateStore, LinkStateStore};

use crate::error::NodeError;

/// Load the persisted state of `key` from `state_dir`.
///
/// Returns `None` when the directory does not exist. Nothing is created.
pub async fn load_state(
    state_dir: &Path,
    key: &SequenceKey,
) -> Result<Option<LinkState>, NodeError> {
    if !tokio::fs::try_exists(state_dir).await? {
        return Ok(None);
    }
    let store = FileLinkStateStore::new(state_dir.to_path_buf())?;
    Ok(Some(store.load(key).await?))
}
