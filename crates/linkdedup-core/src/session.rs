//! A single contiguous sequence window bound to one dedup partition.

use core::fmt;

use crate::error::WindowError;
use crate::types::TableName;

/// Half-open sequence range `[lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub lo: u64,
    pub hi: u64,
}

impl Bounds {
    pub const fn new(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }

    /// Number of sequence numbers covered by the range.
    pub const fn len(&self) -> u64 {
        self.hi.saturating_sub(self.lo)
    }

    pub const fn is_empty(&self) -> bool {
        self.lo >= self.hi
    }

    pub const fn contains(&self, seq: u64) -> bool {
        self.lo <= seq && seq < self.hi
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.lo, self.hi)
    }
}

/// One window of a link: the sequence range it owns and the partition that
/// holds dedup records for that range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    bounds: Bounds,
    table: TableName,
}

impl SessionState {
    /// Build a window over `[lo, hi)`. Fails if the range is empty.
    pub fn new(lo: u64, hi: u64, table: TableName) -> Result<Self, WindowError> {
        if lo >= hi {
            return Err(WindowError::EmptyWindow { lo, hi });
        }
        Ok(Self {
            bounds: Bounds::new(lo, hi),
            table,
        })
    }

    pub fn lo(&self) -> u64 {
        self.bounds.lo
    }

    pub fn hi(&self) -> u64 {
        self.bounds.hi
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn epoch_size(&self) -> u64 {
        self.bounds.len()
    }

    /// True iff `seq` lies in `[lo, hi)`.
    pub fn matches(&self, seq: u64) -> bool {
        self.bounds.contains(seq)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.bounds, self.table)
    }
}
