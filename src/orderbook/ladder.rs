//! Price ladder of a single instrument.
//!
//! This implementation uses `BTreeMap` for sorted price levels, providing:
//!
//! - O(log n) insertion, deletion, and lookup
//! - O(1) access to best bid/ask (via `last_key_value` / `first_key_value`)
//! - Ordered iteration for depth-of-book queries, derived fresh on every read

use std::collections::BTreeMap;

use crate::error::Error;
use crate::types::{
    Instrument, LevelChange, Price, PriceLevel, Quantity, Sequence, Side, Snapshot, TimestampMs,
};
use crate::Result;

/// Canonical price key.
///
/// Venues format the same price inconsistently across messages (`"100.10"`
/// in one update, `"100.1"` in the next), so levels are keyed by the
/// trailing-zero-normalized decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriceKey(Price);

impl PriceKey {
    /// Canonicalize a price
    pub fn new(price: Price) -> Self {
        Self(price.normalize())
    }

    /// The normalized price
    pub fn price(self) -> Price {
        self.0
    }
}

/// Undo log of one [`OrderBookLadder::apply_changes`] call
///
/// Passing it back to [`OrderBookLadder::revert`] restores the ladder to the
/// state it had before the changes were applied.
#[derive(Debug, Default)]
#[must_use = "a journal that is dropped can no longer undo its changes"]
pub struct ApplyJournal {
    /// (side, key, level before the change)
    entries: Vec<(Side, PriceKey, Option<PriceLevel>)>,
}

impl ApplyJournal {
    /// Number of level changes recorded
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no change was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Bid/ask ladder of one instrument.
///
/// # Invariants
///
/// - every stored level has quantity > 0
/// - each side holds at most one level per canonical price
/// - [`bids`](Self::bids) iterate descending, [`asks`](Self::asks) ascending
///
/// The ladder does not refuse crossed states by itself; the reconciliation
/// engine checks [`is_crossed`](Self::is_crossed) after each update and
/// reverts it.
///
/// # Thread Safety
///
/// This struct is `Send + Sync` but not internally synchronized. The
/// [`OrderBookStore`](super::OrderBookStore) wraps each ladder in a mutex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBookLadder {
    /// Book identity
    instrument: Instrument,

    /// Bid levels, ascending by price (best bid = highest = last)
    bids: BTreeMap<PriceKey, PriceLevel>,

    /// Ask levels, ascending by price (best ask = lowest = first)
    asks: BTreeMap<PriceKey, PriceLevel>,

    /// Highest sequence folded into the ladder
    last_sequence: Option<Sequence>,

    /// Latest venue timestamp folded into the ladder
    last_event_time: Option<TimestampMs>,
}

impl OrderBookLadder {
    /// Create a new empty ladder for the given instrument
    #[must_use]
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_sequence: None,
            last_event_time: None,
        }
    }

    /// Build a ladder from a snapshot
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut ladder = Self::new(snapshot.instrument.clone());
        ladder.apply_snapshot(snapshot);
        ladder
    }

    /// Get the instrument
    #[must_use]
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Highest sequence applied, if the venue has sequences
    #[must_use]
    pub const fn last_sequence(&self) -> Option<Sequence> {
        self.last_sequence
    }

    /// Latest venue timestamp applied
    #[must_use]
    pub const fn last_event_time(&self) -> Option<TimestampMs> {
        self.last_event_time
    }

    /// Replace the whole ladder with a snapshot's levels.
    ///
    /// Zero-quantity levels in the snapshot are skipped. The side of each
    /// level is taken from the list it appears in.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.bids.clear();
        self.asks.clear();

        for level in &snapshot.bids {
            if !level.is_removal() {
                self.bids.insert(PriceKey::new(level.price), to_price_level(level));
            }
        }
        for level in &snapshot.asks {
            if !level.is_removal() {
                self.asks.insert(PriceKey::new(level.price), to_price_level(level));
            }
        }

        self.last_sequence = snapshot.sequence;
        self.record_event_time(snapshot.timestamp);
    }

    /// Apply level changes in order.
    ///
    /// - quantity <= 0 removes the level (no-op if absent)
    /// - quantity > 0 on an absent level inserts it
    /// - quantity > 0 on a present level replaces quantity and order count,
    ///   keeping the price representation first seen
    pub fn apply_changes(&mut self, changes: &[LevelChange]) -> ApplyJournal {
        let mut journal = ApplyJournal {
            entries: Vec::with_capacity(changes.len()),
        };

        for change in changes {
            let key = PriceKey::new(change.price);
            let book = self.side_mut(change.side);

            let previous = if change.is_removal() {
                book.remove(&key)
            } else if let Some(level) = book.get_mut(&key) {
                let previous = level.clone();
                level.quantity = change.quantity;
                level.order_count = change.order_count;
                Some(previous)
            } else {
                book.insert(key, to_price_level(change));
                None
            };

            journal.entries.push((change.side, key, previous));
        }

        journal
    }

    /// Undo changes recorded by [`apply_changes`](Self::apply_changes)
    pub fn revert(&mut self, journal: ApplyJournal) {
        for (side, key, previous) in journal.entries.into_iter().rev() {
            let book = self.side_mut(side);
            match previous {
                Some(level) => {
                    book.insert(key, level);
                }
                None => {
                    book.remove(&key);
                }
            }
        }
    }

    /// Set a price level directly. A quantity of zero removes the level.
    pub fn set_level(&mut self, side: Side, price: Price, quantity: Quantity) {
        let _ = self.apply_changes(&[LevelChange::new(side, price, quantity)]);
    }

    /// Advance the sequence to `max(current, sequence)`
    pub fn record_sequence(&mut self, sequence: Option<Sequence>) {
        self.last_sequence = match (self.last_sequence, sequence) {
            (Some(current), Some(new)) => Some(current.max(new)),
            (current, new) => current.or(new),
        };
    }

    /// Advance the event time to `max(current, timestamp)`
    pub fn record_event_time(&mut self, timestamp: Option<TimestampMs>) {
        self.last_event_time = match (self.last_event_time, timestamp) {
            (Some(current), Some(new)) => Some(current.max(new)),
            (current, new) => current.or(new),
        };
    }

    /// Look up the level at a price (any formatting of the price)
    #[must_use]
    pub fn level(&self, side: Side, price: Price) -> Option<&PriceLevel> {
        self.side_ref(side).get(&PriceKey::new(price))
    }

    /// Get the best bid
    ///
    /// Returns `(price, quantity)` or `None` if no bids.
    #[must_use]
    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.bids.last_key_value().map(|(_, l)| (l.price, l.quantity))
    }

    /// Get the best ask
    ///
    /// Returns `(price, quantity)` or `None` if no asks.
    #[must_use]
    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.asks.first_key_value().map(|(_, l)| (l.price, l.quantity))
    }

    /// Get the mid price
    ///
    /// Returns the average of best bid and best ask, or `None` if either is missing.
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Price::TWO),
            _ => None,
        }
    }

    /// Get the spread
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    /// Check if the book is crossed (best bid >= best ask)
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        self.crossing().is_some()
    }

    /// Best bid and best ask prices when the book is crossed
    #[must_use]
    pub fn crossing(&self) -> Option<(Price, Price)> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) if bid >= ask => Some((bid, ask)),
            _ => None,
        }
    }

    /// Fail if the book is crossed
    ///
    /// # Errors
    ///
    /// Returns [`Error::CrossedBook`] with the offending best prices.
    pub fn check_uncrossed(&self) -> Result<()> {
        match self.crossing() {
            Some((bid, ask)) => Err(Error::CrossedBook { bid, ask }),
            None => Ok(()),
        }
    }

    /// Get all bid levels, sorted by price descending (best first)
    pub fn bids(&self) -> impl Iterator<Item = &PriceLevel> + '_ {
        self.bids.values().rev()
    }

    /// Get all ask levels, sorted by price ascending (best first)
    pub fn asks(&self) -> impl Iterator<Item = &PriceLevel> + '_ {
        self.asks.values()
    }

    /// Get the top N bid levels
    #[must_use]
    pub fn top_bids(&self, n: usize) -> Vec<PriceLevel> {
        self.bids().take(n).cloned().collect()
    }

    /// Get the top N ask levels
    #[must_use]
    pub fn top_asks(&self, n: usize) -> Vec<PriceLevel> {
        self.asks().take(n).cloned().collect()
    }

    /// Get total bid quantity
    #[must_use]
    pub fn total_bid_quantity(&self) -> Quantity {
        self.bids.values().map(|l| l.quantity).sum()
    }

    /// Get total ask quantity
    #[must_use]
    pub fn total_ask_quantity(&self) -> Quantity {
        self.asks.values().map(|l| l.quantity).sum()
    }

    /// Clear the ladder, including sequence and time bookkeeping
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_sequence = None;
        self.last_event_time = None;
    }

    /// Check if the ladder is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Get the number of price levels as `(bids, asks)`
    #[must_use]
    pub fn num_levels(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<PriceKey, PriceLevel> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    fn side_ref(&self, side: Side) -> &BTreeMap<PriceKey, PriceLevel> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }
}

fn to_price_level(change: &LevelChange) -> PriceLevel {
    PriceLevel {
        price: change.price,
        quantity: change.quantity,
        order_count: change.order_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Venue;
    use rust_decimal_macros::dec;

    fn instrument() -> Instrument {
        Instrument::new(Venue::Kraken, "XBT", "USD")
    }

    fn prices<'a>(levels: impl Iterator<Item = &'a PriceLevel>) -> Vec<Price> {
        levels.map(|l| l.price).collect()
    }

    #[test]
    fn test_new_ladder() {
        let ladder = OrderBookLadder::new(instrument());
        assert_eq!(ladder.instrument(), &instrument());
        assert!(ladder.is_empty());
        assert_eq!(ladder.last_sequence(), None);
        assert_eq!(ladder.last_event_time(), None);
    }

    #[test]
    fn test_set_level() {
        let mut ladder = OrderBookLadder::new(instrument());

        ladder.set_level(Side::Bid, dec!(50), dec!(100));
        ladder.set_level(Side::Bid, dec!(45), dec!(50));
        ladder.set_level(Side::Ask, dec!(55), dec!(75));

        assert_eq!(ladder.best_bid(), Some((dec!(50), dec!(100))));
        assert_eq!(ladder.best_ask(), Some((dec!(55), dec!(75))));
    }

    #[test]
    fn test_apply_changes_insert_replace_remove() {
        let mut ladder = OrderBookLadder::new(instrument());

        let _ = ladder.apply_changes(&[LevelChange::new(Side::Bid, dec!(50), dec!(100))]);
        assert_eq!(ladder.best_bid(), Some((dec!(50), dec!(100))));

        // Absolute replacement, not accumulation
        let _ = ladder.apply_changes(&[LevelChange::new(Side::Bid, dec!(50), dec!(30))]);
        assert_eq!(ladder.best_bid(), Some((dec!(50), dec!(30))));

        let _ = ladder.apply_changes(&[LevelChange::new(Side::Bid, dec!(50), dec!(0))]);
        assert_eq!(ladder.best_bid(), None);

        // Removing an absent level is a no-op
        let _ = ladder.apply_changes(&[LevelChange::new(Side::Bid, dec!(50), dec!(0))]);
        assert!(ladder.is_empty());
    }

    #[test]
    fn test_negative_quantity_removes() {
        let mut ladder = OrderBookLadder::new(instrument());
        ladder.set_level(Side::Ask, dec!(10), dec!(1));
        let _ = ladder.apply_changes(&[LevelChange::new(Side::Ask, dec!(10), dec!(-1))]);
        assert!(ladder.level(Side::Ask, dec!(10)).is_none());
    }

    #[test]
    fn test_trailing_zeros_address_same_level() {
        let mut ladder = OrderBookLadder::new(instrument());
        ladder.set_level(Side::Ask, dec!(100.10), dec!(2));
        ladder.set_level(Side::Ask, dec!(100.1), dec!(3));

        assert_eq!(ladder.num_levels(), (0, 1));
        let level = ladder.level(Side::Ask, dec!(100.100)).unwrap();
        assert_eq!(level.quantity, dec!(3));
        // The first-seen representation is kept
        assert_eq!(level.price.to_string(), "100.10");

        ladder.set_level(Side::Ask, dec!(100.1000), dec!(0));
        assert!(ladder.is_empty());
    }

    #[test]
    fn test_replace_updates_order_count() {
        let mut ladder = OrderBookLadder::new(instrument());
        let _ = ladder.apply_changes(&[
            LevelChange::new(Side::Bid, dec!(9), dec!(1)).with_order_count(2)
        ]);
        let _ = ladder.apply_changes(&[
            LevelChange::new(Side::Bid, dec!(9), dec!(4)).with_order_count(5)
        ]);
        assert_eq!(ladder.level(Side::Bid, dec!(9)).unwrap().order_count, Some(5));
    }

    #[test]
    fn test_sorted_views() {
        let mut ladder = OrderBookLadder::new(instrument());
        for p in [dec!(3), dec!(1), dec!(2)] {
            ladder.set_level(Side::Bid, p, dec!(1));
            ladder.set_level(Side::Ask, p + dec!(10), dec!(1));
        }

        assert_eq!(prices(ladder.bids()), vec![dec!(3), dec!(2), dec!(1)]);
        assert_eq!(prices(ladder.asks()), vec![dec!(11), dec!(12), dec!(13)]);
    }

    #[test]
    fn test_revert_restores_previous_state() {
        let mut ladder = OrderBookLadder::new(instrument());
        ladder.set_level(Side::Bid, dec!(100), dec!(1));
        ladder.set_level(Side::Ask, dec!(101), dec!(1));
        let before = ladder.clone();

        let journal = ladder.apply_changes(&[
            LevelChange::new(Side::Ask, dec!(101), dec!(0)),
            LevelChange::new(Side::Bid, dec!(100), dec!(7)),
            LevelChange::new(Side::Bid, dec!(102), dec!(1)),
            LevelChange::new(Side::Bid, dec!(102), dec!(3)),
        ]);
        assert_eq!(journal.len(), 4);
        assert_ne!(ladder, before);

        ladder.revert(journal);
        assert_eq!(ladder, before);
    }

    #[test]
    fn test_mid_price_and_spread() {
        let mut ladder = OrderBookLadder::new(instrument());

        ladder.set_level(Side::Bid, dec!(45), dec!(100));
        ladder.set_level(Side::Ask, dec!(55.5), dec!(100));

        assert_eq!(ladder.mid_price(), Some(dec!(50.25)));
        assert_eq!(ladder.spread(), Some(dec!(10.5)));
    }

    #[test]
    fn test_top_levels() {
        let mut ladder = OrderBookLadder::new(instrument());

        ladder.set_level(Side::Bid, dec!(45), dec!(100));
        ladder.set_level(Side::Bid, dec!(44), dec!(200));
        ladder.set_level(Side::Bid, dec!(43), dec!(300));

        let top = ladder.top_bids(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0], PriceLevel::new(dec!(45), dec!(100)));
        assert_eq!(top[1], PriceLevel::new(dec!(44), dec!(200)));
        assert_eq!(ladder.total_bid_quantity(), dec!(600));
    }

    #[test]
    fn test_crossed_book() {
        let mut ladder = OrderBookLadder::new(instrument());

        ladder.set_level(Side::Bid, dec!(55), dec!(100));
        ladder.set_level(Side::Ask, dec!(50), dec!(100));

        assert!(ladder.is_crossed());
        assert_eq!(ladder.crossing(), Some((dec!(55), dec!(50))));
        assert!(matches!(
            ladder.check_uncrossed(),
            Err(Error::CrossedBook { bid, ask }) if bid == dec!(55) && ask == dec!(50)
        ));

        // Locked books count as crossed too
        ladder.set_level(Side::Ask, dec!(50), dec!(0));
        ladder.set_level(Side::Ask, dec!(55.0), dec!(1));
        assert!(ladder.is_crossed());

        ladder.set_level(Side::Ask, dec!(55), dec!(0));
        assert!(ladder.check_uncrossed().is_ok());
    }

    #[test]
    fn test_snapshot_replaces_levels() {
        let mut ladder = OrderBookLadder::new(instrument());
        ladder.set_level(Side::Bid, dec!(1), dec!(1));

        let snapshot = Snapshot {
            instrument: instrument(),
            sequence: Some(10),
            bids: vec![
                LevelChange::new(Side::Bid, dec!(100), dec!(1)),
                LevelChange::new(Side::Bid, dec!(99), dec!(0)),
            ],
            asks: vec![LevelChange::new(Side::Ask, dec!(101), dec!(1))],
            timestamp: Some(1_000),
        };
        ladder.apply_snapshot(&snapshot);

        assert_eq!(ladder.num_levels(), (1, 1));
        assert!(ladder.level(Side::Bid, dec!(1)).is_none());
        assert_eq!(ladder.last_sequence(), Some(10));
        assert_eq!(ladder.last_event_time(), Some(1_000));
    }

    #[test]
    fn test_sequence_and_time_only_move_forward() {
        let mut ladder = OrderBookLadder::new(instrument());
        ladder.record_sequence(Some(10));
        ladder.record_sequence(Some(8));
        ladder.record_sequence(None);
        assert_eq!(ladder.last_sequence(), Some(10));

        ladder.record_event_time(Some(500));
        ladder.record_event_time(Some(400));
        assert_eq!(ladder.last_event_time(), Some(500));
    }

    #[test]
    fn test_clear() {
        let mut ladder = OrderBookLadder::new(instrument());
        ladder.set_level(Side::Bid, dec!(50), dec!(100));
        ladder.set_level(Side::Ask, dec!(55), dec!(100));
        ladder.record_sequence(Some(3));

        assert!(!ladder.is_empty());

        ladder.clear();

        assert!(ladder.is_empty());
        assert_eq!(ladder.last_sequence(), None);
    }
}
