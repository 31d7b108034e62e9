//! Persistence adapters for link window state.
//!
//! [`LinkStateStore`] holds one [`LinkStateRow`](linkdedup_core::LinkStateRow)
//! per link and only accepts writes through compare-and-set.
//! [`PartitionStore`] holds the dedup records for the two partitions each link
//! rotates between.

pub mod codec;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::StoreError;
pub use file::FileLinkStateStore;
pub use memory::{MemoryLinkStateStore, MemoryPartitionStore};
pub use traits::{LinkStateStore, PartitionStore, Recorded};
