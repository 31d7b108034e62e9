//! Pure encoding of link state rows.
//!
//! Kept separate from [`crate::file`] so the row codec can be tested without
//! touching the filesystem.

use linkdedup_core::{LinkState, LinkStateRow};

use crate::error::StoreError;

/// Encode a row with postcard.
pub fn encode_row(row: &LinkStateRow) -> Result<Vec<u8>, StoreError> {
    postcard::to_allocvec(row).map_err(|e| StoreError::Serialize(e.to_string()))
}

/// Decode a postcard-encoded row.
pub fn decode_row(bytes: &[u8]) -> Result<LinkStateRow, StoreError> {
    postcard::from_bytes(bytes).map_err(|e| StoreError::Deserialize(e.to_string()))
}

/// Encode a state via its flattened row.
pub fn encode_state(state: &LinkState) -> Result<Vec<u8>, StoreError> {
    encode_row(&LinkStateRow::from(state))
}

/// Decode bytes into a state, validating the row.
pub fn decode_state(bytes: &[u8]) -> Result<LinkState, StoreError> {
    Ok(LinkState::try_from(decode_row(bytes)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkdedup_core::{TableName, WindowError};

    #[test]
    fn state_survives_encoding() {
        let state = LinkState::uninitialized()
            .initialize(TableName::from("a"), TableName::from("b"), 64)
            .unwrap()
            .advance(64)
            .unwrap();
        let bytes = encode_state(&state).unwrap();
        assert_eq!(decode_state(&bytes).unwrap(), state);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(
            decode_row(&[0xFF; 3]),
            Err(StoreError::Deserialize(_))
        ));
    }

    #[test]
    fn corrupt_row_is_rejected() {
        let row = LinkStateRow {
            epoch: 2,
            is_announced: false,
            head_lo: 10,
            head_hi: 20,
            head_table: None,
            tail_lo: 0,
            tail_hi: 10,
            tail_table: Some("b".into()),
        };
        let bytes = encode_row(&row).unwrap();
        assert!(matches!(
            decode_state(&bytes),
            Err(StoreError::Window(WindowError::CorruptRow(_)))
        ));
    }
}
