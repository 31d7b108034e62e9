//! Flattened, persistable form of a [`LinkState`].
//!
//! One row per link. A null table name means the corresponding window is
//! absent, which only happens for an uninitialized link.

use serde::{Deserialize, Serialize};

use crate::error::WindowError;
use crate::link_state::LinkState;
use crate::session::SessionState;
use crate::types::TableName;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStateRow {
    pub epoch: u64,
    pub is_announced: bool,
    pub head_lo: u64,
    pub head_hi: u64,
    pub head_table: Option<String>,
    pub tail_lo: u64,
    pub tail_hi: u64,
    pub tail_table: Option<String>,
}

impl LinkStateRow {
    /// The `(epoch, isAnnounced)` pair used as the compare-and-set version.
    pub fn version(&self) -> (u64, bool) {
        (self.epoch, self.is_announced)
    }
}

impl From<&LinkState> for LinkStateRow {
    fn from(state: &LinkState) -> Self {
        let (head_lo, head_hi, head_table) = flatten(state.head());
        let (tail_lo, tail_hi, tail_table) = flatten(state.tail());
        Self {
            epoch: state.epoch(),
            is_announced: state.is_announced(),
            head_lo,
            head_hi,
            head_table,
            tail_lo,
            tail_hi,
            tail_table,
        }
    }
}

impl TryFrom<LinkStateRow> for LinkState {
    type Error = WindowError;

    fn try_from(row: LinkStateRow) -> Result<Self, Self::Error> {
        let head = hydrate(row.head_lo, row.head_hi, row.head_table)?;
        let tail = hydrate(row.tail_lo, row.tail_hi, row.tail_table)?;
        LinkState::from_parts(row.epoch, row.is_announced, head, tail)
    }
}

fn flatten(session: Option<&SessionState>) -> (u64, u64, Option<String>) {
    match session {
        Some(s) => (s.lo(), s.hi(), Some(s.table().as_str().to_string())),
        None => (0, 0, None),
    }
}

fn hydrate(lo: u64, hi: u64, table: Option<String>) -> Result<Option<SessionState>, WindowError> {
    match table {
        None => Ok(None),
        Some(table) => SessionState::new(lo, hi, TableName::from(table))
            .map(Some)
            .map_err(|e| WindowError::CorruptRow(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_row_has_null_tables() {
        let row = LinkStateRow::from(&LinkState::uninitialized());
        assert_eq!(row.epoch, 0);
        assert!(!row.is_announced);
        assert!(row.head_table.is_none());
        assert!(row.tail_table.is_none());
        assert_eq!(LinkState::try_from(row).unwrap(), LinkState::uninitialized());
    }

    #[test]
    fn initialized_row_layout() {
        let state = LinkState::uninitialized()
            .initialize(TableName::from("T1"), TableName::from("T0"), 100)
            .unwrap();
        let row = LinkStateRow::from(&state);
        assert_eq!(row.epoch, 1);
        assert_eq!((row.head_lo, row.head_hi), (100, 200));
        assert_eq!(row.head_table.as_deref(), Some("T1"));
        assert_eq!((row.tail_lo, row.tail_hi), (0, 100));
        assert_eq!(row.tail_table.as_deref(), Some("T0"));
        assert_eq!(row.version(), (1, false));
    }

    #[test]
    fn one_null_table_is_corrupt() {
        let row = LinkStateRow {
            epoch: 3,
            is_announced: true,
            head_lo: 100,
            head_hi: 200,
            head_table: Some("T1".into()),
            tail_lo: 0,
            tail_hi: 100,
            tail_table: None,
        };
        assert!(matches!(
            LinkState::try_from(row),
            Err(WindowError::CorruptRow(_))
        ));
    }

    #[test]
    fn empty_window_is_corrupt() {
        let row = LinkStateRow {
            epoch: 1,
            is_announced: false,
            head_lo: 200,
            head_hi: 100,
            head_table: Some("T1".into()),
            tail_lo: 0,
            tail_hi: 200,
            tail_table: Some("T0".into()),
        };
        assert!(matches!(
            LinkState::try_from(row),
            Err(WindowError::CorruptRow(_))
        ));
    }
}
