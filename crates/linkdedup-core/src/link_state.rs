//! Per-link window pair and its transitions.
//!
//! [`LinkState`] composes two windows: the head (active, higher range) and the
//! tail (the previous window, kept so barely-late duplicates are still caught).
//! Only two partitions are ever used per link. Each advance recycles the
//! tail's partition as the new head's storage and demotes the old head to tail.
//!
//! Values are immutable; every transition returns a new `LinkState`, which is
//! what lets the persistence layer do compare-and-set on whole states.
//!
//! ```text
//! Uninitialized ─initialize─▶ epoch 1 ─announce_initialize─▶ epoch 1 (announced)
//!     ─advance─▶ epoch 2 ─announce_advance─▶ epoch 2 (announced) ─advance─▶ …
//! ```

use core::fmt;

use crate::announce::Announcement;
use crate::error::WindowError;
use crate::message::ControlMessage;
use crate::session::SessionState;
use crate::types::{SequenceKey, TableName};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Windows {
    head: SessionState,
    tail: SessionState,
}

/// Dedup window state for one directional link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkState {
    epoch: u64,
    announced: bool,
    windows: Option<Windows>,
}

impl LinkState {
    /// The state of a link that has never been initialized (epoch 0).
    pub fn uninitialized() -> Self {
        Self {
            epoch: 0,
            announced: false,
            windows: None,
        }
    }

    /// Rebuild a state from its parts, as loaded from storage.
    ///
    /// Head and tail must be both present or both absent, and when present
    /// the head must start exactly where the tail ends.
    pub fn from_parts(
        epoch: u64,
        announced: bool,
        head: Option<SessionState>,
        tail: Option<SessionState>,
    ) -> Result<Self, WindowError> {
        let windows = match (head, tail) {
            (None, None) => None,
            (Some(head), Some(tail)) => {
                if head.lo() != tail.hi() {
                    return Err(WindowError::CorruptRow(format!(
                        "head {head} does not follow tail {tail}"
                    )));
                }
                Some(Windows { head, tail })
            }
            (Some(_), None) => {
                return Err(WindowError::CorruptRow("head without tail".into()));
            }
            (None, Some(_)) => {
                return Err(WindowError::CorruptRow("tail without head".into()));
            }
        };
        Ok(Self {
            epoch,
            announced,
            windows,
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether the current epoch's transition has been sent to the peer.
    pub fn is_announced(&self) -> bool {
        self.announced
    }

    pub fn head(&self) -> Option<&SessionState> {
        self.windows.as_ref().map(|w| &w.head)
    }

    pub fn tail(&self) -> Option<&SessionState> {
        self.windows.as_ref().map(|w| &w.tail)
    }

    /// Width of the active window, if initialized.
    pub fn epoch_size(&self) -> Option<u64> {
        self.head().map(SessionState::epoch_size)
    }

    pub fn is_initialized(&self) -> bool {
        self.windows.is_some()
    }

    fn windows(&self) -> Result<&Windows, WindowError> {
        self.windows.as_ref().ok_or(WindowError::NotInitialized)
    }

    /// True iff `seq` lies beyond the head window.
    ///
    /// An uninitialized state has no window at all, so every sequence is stale.
    pub fn is_stale(&self, seq: u64) -> bool {
        match &self.windows {
            Some(w) => seq >= w.head.hi(),
            None => true,
        }
    }

    /// True once `seq` has reached the midpoint of the head window.
    pub fn should_advance(&self, seq: u64) -> bool {
        match &self.windows {
            Some(w) => seq >= w.head.lo() + w.head.epoch_size() / 2,
            None => false,
        }
    }

    /// The partition holding dedup records for `seq`.
    pub fn table_name(&self, seq: u64) -> Result<&TableName, WindowError> {
        let w = self.windows()?;
        if w.head.matches(seq) {
            return Ok(w.head.table());
        }
        if w.tail.matches(seq) {
            return Ok(w.tail.table());
        }
        Err(WindowError::OutOfWindow {
            seq,
            head: w.head.bounds(),
            tail: w.tail.bounds(),
        })
    }

    /// First transition: head `[n, 2n)` on `head_table`, tail `[0, n)` on
    /// `tail_table`, epoch 1.
    pub fn initialize(
        &self,
        head_table: TableName,
        tail_table: TableName,
        epoch_size: u64,
    ) -> Result<LinkState, WindowError> {
        if self.is_initialized() {
            return Err(WindowError::AlreadyInitialized);
        }
        if head_table == tail_table {
            return Err(WindowError::SharedPartition(head_table));
        }
        let head_hi = epoch_size
            .checked_mul(2)
            .ok_or(WindowError::SequenceOverflow(epoch_size))?;
        let tail = SessionState::new(0, epoch_size, tail_table)?;
        let head = SessionState::new(epoch_size, head_hi, head_table)?;

        Ok(LinkState {
            epoch: 1,
            announced: false,
            windows: Some(Windows { head, tail }),
        })
    }

    /// Rotate the windows: the old head becomes the tail and the old tail's
    /// partition is reused for a new head starting at the old head's end.
    ///
    /// The recycled partition still holds the discarded tail's records. The
    /// caller must truncate it as part of committing the returned state.
    pub fn advance(&self, epoch_size: u64) -> Result<LinkState, WindowError> {
        let w = self.windows()?;
        let lo = w.head.hi();
        let hi = lo
            .checked_add(epoch_size)
            .ok_or(WindowError::SequenceOverflow(lo))?;
        let head = SessionState::new(lo, hi, w.tail.table().clone())?;

        Ok(LinkState {
            epoch: self.epoch + 1,
            announced: false,
            windows: Some(Windows {
                head,
                tail: w.head.clone(),
            }),
        })
    }

    /// Mark the latest advance as announced and build the message telling the
    /// peer about the new head window.
    pub fn announce_advance(
        &self,
        key: &SequenceKey,
    ) -> Result<(LinkState, ControlMessage), WindowError> {
        let w = self.windows()?;
        let message = Announcement::Advance {
            key: key.clone(),
            epoch: self.epoch,
            head: w.head.bounds(),
        }
        .to_message();
        Ok((self.marked_announced(), message))
    }

    /// Mark the initialization as announced and build the message carrying
    /// both windows.
    pub fn announce_initialize(
        &self,
        key: &SequenceKey,
    ) -> Result<(LinkState, ControlMessage), WindowError> {
        let w = self.windows()?;
        let message = Announcement::Initialize {
            key: key.clone(),
            head: w.head.bounds(),
            tail: w.tail.bounds(),
        }
        .to_message();
        Ok((self.marked_announced(), message))
    }

    /// Announce whichever transition produced the current epoch.
    pub fn announce(&self, key: &SequenceKey) -> Result<(LinkState, ControlMessage), WindowError> {
        if self.epoch <= 1 {
            self.announce_initialize(key)
        } else {
            self.announce_advance(key)
        }
    }

    /// The same windows with the announced flag set.
    ///
    /// A receiving peer records the epochs it learned from announcements this
    /// way, without building a message of its own.
    pub fn marked_announced(&self) -> LinkState {
        LinkState {
            announced: true,
            ..self.clone()
        }
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::uninitialized()
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.windows {
            Some(w) => write!(
                f,
                "{},{},{}",
                self.epoch,
                w.head.bounds(),
                w.tail.bounds()
            ),
            None => write!(f, "{},uninitialized", self.epoch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce;
    use crate::session::Bounds;

    fn t(name: &str) -> TableName {
        TableName::from(name)
    }

    fn initialized(epoch_size: u64) -> LinkState {
        LinkState::uninitialized()
            .initialize(t("T1"), t("T0"), epoch_size)
            .unwrap()
    }

    #[test]
    fn uninitialized_defaults() {
        let s = LinkState::uninitialized();
        assert_eq!(s.epoch(), 0);
        assert!(!s.is_announced());
        assert!(!s.is_initialized());
        assert!(s.head().is_none());
        assert!(s.tail().is_none());
        assert_eq!(s, LinkState::default());
    }

    #[test]
    fn scenario_epoch_size_100() {
        let s = initialized(100);
        assert_eq!(s.epoch(), 1);
        assert!(!s.is_announced());
        assert_eq!(s.head().unwrap().bounds(), Bounds::new(100, 200));
        assert_eq!(s.head().unwrap().table(), &t("T1"));
        assert_eq!(s.tail().unwrap().bounds(), Bounds::new(0, 100));
        assert_eq!(s.tail().unwrap().table(), &t("T0"));

        assert!(!s.should_advance(149));
        assert!(s.should_advance(150));
        assert!(!s.is_stale(199));
        assert!(s.is_stale(200));

        assert_eq!(s.table_name(150).unwrap(), &t("T1"));
        assert_eq!(s.table_name(50).unwrap(), &t("T0"));
        assert!(matches!(
            s.table_name(250),
            Err(WindowError::OutOfWindow { seq: 250, .. })
        ));

        let next = s.advance(100).unwrap();
        assert_eq!(next.epoch(), 2);
        assert!(!next.is_announced());
        assert_eq!(next.head().unwrap().bounds(), Bounds::new(200, 300));
        assert_eq!(next.head().unwrap().table(), &t("T0"));
        assert_eq!(next.tail().unwrap().bounds(), Bounds::new(100, 200));
        assert_eq!(next.tail().unwrap().table(), &t("T1"));
    }

    #[test]
    fn partitions_ping_pong() {
        let s = initialized(10);
        let s2 = s.advance(10).unwrap();
        let s3 = s2.advance(10).unwrap();
        assert_eq!(s3.epoch(), 3);
        assert_eq!(s3.head().unwrap().table(), &t("T1"));
        assert_eq!(s3.tail().unwrap().table(), &t("T0"));
        assert_eq!(s3.head().unwrap().bounds(), Bounds::new(30, 40));
        // Sequences two epochs back are no longer covered.
        assert!(s3.table_name(19).is_err());
    }

    #[test]
    fn initialize_twice_fails() {
        let s = initialized(100);
        assert_eq!(
            s.initialize(t("A"), t("B"), 100),
            Err(WindowError::AlreadyInitialized)
        );
    }

    #[test]
    fn initialize_rejects_bad_arguments() {
        let s = LinkState::uninitialized();
        assert_eq!(
            s.initialize(t("A"), t("A"), 100),
            Err(WindowError::SharedPartition(t("A")))
        );
        assert_eq!(
            s.initialize(t("A"), t("B"), 0),
            Err(WindowError::EmptyWindow { lo: 0, hi: 0 })
        );
        assert_eq!(
            s.initialize(t("A"), t("B"), u64::MAX),
            Err(WindowError::SequenceOverflow(u64::MAX))
        );
    }

    #[test]
    fn uninitialized_transitions_fail() {
        let s = LinkState::uninitialized();
        let key = SequenceKey::from("k");
        assert_eq!(s.advance(100), Err(WindowError::NotInitialized));
        assert_eq!(s.table_name(5), Err(WindowError::NotInitialized));
        assert!(s.announce_advance(&key).is_err());
        assert!(s.announce_initialize(&key).is_err());
        assert!(s.is_stale(0));
        assert!(!s.should_advance(u64::MAX));
    }

    #[test]
    fn advance_rejects_zero_size() {
        let s = initialized(100);
        assert_eq!(
            s.advance(0),
            Err(WindowError::EmptyWindow { lo: 200, hi: 200 })
        );
    }

    #[test]
    fn announce_initialize_carries_both_windows() {
        let s = initialized(100);
        let key = SequenceKey::from("orders");
        let (next, msg) = s.announce_initialize(&key).unwrap();

        assert!(next.is_announced());
        assert_eq!(next.epoch(), 1);
        assert_eq!(next.head(), s.head());
        assert_eq!(next.tail(), s.tail());

        assert_eq!(msg.header(announce::SEQUENCE_KEY), Some("orders"));
        assert_eq!(msg.header(announce::INITIALIZE), Some("true"));
        assert_eq!(msg.header(announce::INITIALIZE_HEAD_LO), Some("100"));
        assert_eq!(msg.header(announce::INITIALIZE_HEAD_HI), Some("200"));
        assert_eq!(msg.header(announce::INITIALIZE_TAIL_LO), Some("0"));
        assert_eq!(msg.header(announce::INITIALIZE_TAIL_HI), Some("100"));
        assert!(msg.body.is_empty());
    }

    #[test]
    fn announce_advance_carries_epoch_and_head() {
        let s = initialized(100).advance(100).unwrap();
        let key = SequenceKey::from("orders");
        let (next, msg) = s.announce_advance(&key).unwrap();

        assert!(next.is_announced());
        assert_eq!(next.epoch(), 2);
        assert_eq!(msg.header(announce::ADVANCE), Some("true"));
        assert_eq!(msg.header(announce::ADVANCE_EPOCH), Some("2"));
        assert_eq!(msg.header(announce::ADVANCE_HEAD_LO), Some("200"));
        assert_eq!(msg.header(announce::ADVANCE_HEAD_HI), Some("300"));
    }

    #[test]
    fn reannounce_is_harmless() {
        let s = initialized(100).advance(100).unwrap();
        let key = SequenceKey::from("orders");
        let (once, first) = s.announce_advance(&key).unwrap();
        let (twice, second) = once.announce_advance(&key).unwrap();
        assert_eq!(once, twice);
        assert_eq!(first.headers, second.headers);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn marked_announced_matches_announce() {
        let s = initialized(100).advance(100).unwrap();
        let (announced, _) = s.announce(&SequenceKey::from("k")).unwrap();
        assert_eq!(s.marked_announced(), announced);
        assert!(!s.is_announced());
    }

    #[test]
    fn announce_picks_kind_by_epoch() {
        let key = SequenceKey::from("k");
        let (_, msg) = initialized(10).announce(&key).unwrap();
        assert_eq!(msg.header(announce::INITIALIZE), Some("true"));

        let (_, msg) = initialized(10).advance(10).unwrap().announce(&key).unwrap();
        assert_eq!(msg.header(announce::ADVANCE), Some("true"));
    }

    #[test]
    fn from_parts_validates_contiguity() {
        let head = SessionState::new(150, 250, t("A")).unwrap();
        let tail = SessionState::new(0, 100, t("B")).unwrap();
        assert!(matches!(
            LinkState::from_parts(1, false, Some(head.clone()), Some(tail)),
            Err(WindowError::CorruptRow(_))
        ));
        assert!(LinkState::from_parts(1, false, Some(head), None).is_err());
        assert_eq!(
            LinkState::from_parts(0, false, None, None).unwrap(),
            LinkState::uninitialized()
        );
    }

    #[test]
    fn display_format() {
        assert_eq!(LinkState::uninitialized().to_string(), "0,uninitialized");
        assert_eq!(initialized(100).to_string(), "1,[100,200),[0,100)");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::session::Bounds;
    use proptest::prelude::*;

    /// An initialized state after `advances` rotations.
    fn state(epoch_size: u64, advances: u8) -> LinkState {
        let mut s = LinkState::uninitialized()
            .initialize(TableName::from("A"), TableName::from("B"), epoch_size)
            .unwrap();
        for _ in 0..advances {
            s = s.advance(epoch_size).unwrap();
        }
        s
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn initialize_layout(epoch_size in 1..1_000_000u64) {
            let s = state(epoch_size, 0);
            prop_assert_eq!(s.epoch(), 1);
            prop_assert!(!s.is_announced());
            prop_assert_eq!(s.head().unwrap().bounds(), Bounds::new(epoch_size, 2 * epoch_size));
            prop_assert_eq!(s.tail().unwrap().bounds(), Bounds::new(0, epoch_size));
            prop_assert_eq!(s.head().unwrap().table().as_str(), "A");
            prop_assert_eq!(s.tail().unwrap().table().as_str(), "B");
        }

        #[test]
        fn advance_rotates(
            epoch_size in 1..100_000u64,
            advances in 0..20u8,
            next_size in 1..100_000u64,
        ) {
            let s = state(epoch_size, advances);
            let old_head = s.head().unwrap().clone();
            let old_tail = s.tail().unwrap().clone();

            let n = s.advance(next_size).unwrap();
            prop_assert_eq!(n.epoch(), s.epoch() + 1);
            prop_assert!(!n.is_announced());
            prop_assert_eq!(n.head().unwrap().lo(), old_head.hi());
            prop_assert_eq!(n.head().unwrap().hi(), old_head.hi() + next_size);
            prop_assert_eq!(n.head().unwrap().table(), old_tail.table());
            prop_assert_eq!(n.tail().unwrap(), &old_head);
        }

        #[test]
        fn queries_follow_bounds(
            epoch_size in 1..10_000u64,
            advances in 0..10u8,
            seq in 0..200_000u64,
        ) {
            let s = state(epoch_size, advances);
            let head = s.head().unwrap();
            let tail = s.tail().unwrap();

            prop_assert_eq!(s.should_advance(seq), seq >= head.lo() + epoch_size / 2);
            prop_assert_eq!(s.is_stale(seq), seq >= head.hi());

            match s.table_name(seq) {
                Ok(table) if head.matches(seq) => {
                    prop_assert_eq!(table, head.table());
                }
                Ok(table) => {
                    prop_assert!(tail.matches(seq));
                    prop_assert_eq!(table, tail.table());
                }
                Err(WindowError::OutOfWindow { .. }) => {
                    prop_assert!(!head.matches(seq) && !tail.matches(seq));
                }
                Err(e) => {
                    prop_assert!(false, "unexpected error: {}", e);
                }
            }
        }

        #[test]
        fn initialize_on_initialized_always_fails(
            epoch_size in 1..10_000u64,
            advances in 0..10u8,
        ) {
            let s = state(epoch_size, advances);
            prop_assert_eq!(
                s.initialize(TableName::from("X"), TableName::from("Y"), epoch_size),
                Err(WindowError::AlreadyInitialized)
            );
        }
    }
}
