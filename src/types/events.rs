//! Canonical events consumed by the reconciliation engine.
//!
//! Adapters emit loosely typed [`AdapterMessage`](super::messages::AdapterMessage)s;
//! the [`Normalizer`](crate::normalizer::Normalizer) turns them into the
//! strongly typed [`RawEvent`]s defined here.

use serde::{Deserialize, Serialize};

use super::instrument::Instrument;
use super::{Price, Quantity, Sequence, TimestampMs};

/// Book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Resting buy interest
    Bid,
    /// Resting sell interest
    Ask,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// Aggressor side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Buyer took liquidity
    Buy,
    /// Seller took liquidity
    Sell,
}

impl From<Side> for TradeSide {
    /// A taker lifting the ask is a buy; hitting the bid is a sell.
    fn from(side: Side) -> Self {
        match side {
            Side::Ask => TradeSide::Buy,
            Side::Bid => TradeSide::Sell,
        }
    }
}

/// One (side, price, quantity) tuple of a depth update
///
/// A quantity of zero (or below) removes the level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelChange {
    /// Side of the book
    pub side: Side,
    /// Price of the level
    pub price: Price,
    /// New absolute quantity at the level
    pub quantity: Quantity,
    /// Number of orders resting at the level, when the venue reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_count: Option<u32>,
}

impl LevelChange {
    /// Create a change without order-count metadata
    pub fn new(side: Side, price: Price, quantity: Quantity) -> Self {
        Self {
            side,
            price,
            quantity,
            order_count: None,
        }
    }

    /// Attach an order count
    #[must_use]
    pub fn with_order_count(mut self, order_count: u32) -> Self {
        self.order_count = Some(order_count);
        self
    }

    /// Whether this change removes its level
    pub fn is_removal(&self) -> bool {
        self.quantity <= Quantity::ZERO
    }
}

/// Full description of all levels of one book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Book this snapshot describes
    pub instrument: Instrument,
    /// Sequence the snapshot is consistent with (if the venue has one)
    pub sequence: Option<Sequence>,
    /// Bid levels in any order
    pub bids: Vec<LevelChange>,
    /// Ask levels in any order
    pub asks: Vec<LevelChange>,
    /// Venue timestamp
    pub timestamp: Option<TimestampMs>,
}

impl Snapshot {
    /// Iterate over both sides' levels
    pub fn levels(&self) -> impl Iterator<Item = &LevelChange> + '_ {
        self.bids.iter().chain(self.asks.iter())
    }
}

/// Incremental update to one book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// Book this update applies to
    pub instrument: Instrument,
    /// First sequence covered by this update
    pub sequence_start: Option<Sequence>,
    /// Last sequence covered by this update (defaults to `sequence_start`)
    pub sequence_end: Option<Sequence>,
    /// Ordered level changes
    pub changes: Vec<LevelChange>,
    /// The venue flagged this update as a complete level list
    #[serde(default)]
    pub is_snapshot: bool,
    /// Venue timestamp
    pub timestamp: Option<TimestampMs>,
}

impl Delta {
    /// Last sequence covered, falling back to the start of the range
    pub fn last_sequence(&self) -> Option<Sequence> {
        self.sequence_end.or(self.sequence_start)
    }

    /// First sequence covered, falling back to the end of the range
    pub fn first_sequence(&self) -> Option<Sequence> {
        self.sequence_start.or(self.sequence_end)
    }

    /// Reinterpret this update as a snapshot (for self-contained venues)
    pub fn into_snapshot(self) -> Snapshot {
        let (bids, asks): (Vec<_>, Vec<_>) = self
            .changes
            .into_iter()
            .filter(|change| !change.is_removal())
            .partition(|change| change.side == Side::Bid);
        Snapshot {
            instrument: self.instrument,
            sequence: self.sequence_end.or(self.sequence_start),
            bids,
            asks,
            timestamp: self.timestamp,
        }
    }
}

/// Trade print
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Book the trade printed on
    pub instrument: Instrument,
    /// Venue trade id, when the venue provides a reliable one
    pub trade_id: Option<String>,
    /// Execution price
    pub price: Price,
    /// Executed quantity
    pub quantity: Quantity,
    /// Aggressor side
    pub side: Option<TradeSide>,
    /// Venue timestamp
    pub timestamp: TimestampMs,
}

/// Canonical event consumed by the reconciliation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    /// Full book state
    Snapshot(Snapshot),
    /// Incremental book update
    Delta(Delta),
    /// Trade print
    Trade(Trade),
}

impl RawEvent {
    /// Instrument the event belongs to
    pub fn instrument(&self) -> &Instrument {
        match self {
            RawEvent::Snapshot(snapshot) => &snapshot.instrument,
            RawEvent::Delta(delta) => &delta.instrument,
            RawEvent::Trade(trade) => &trade.instrument,
        }
    }

    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            RawEvent::Snapshot(_) => "snapshot",
            RawEvent::Delta(_) => "delta",
            RawEvent::Trade(_) => "trade",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::venue::Venue;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Bid.opposite(), Side::Ask);
        assert_eq!(Side::Ask.opposite(), Side::Bid);
    }

    #[test]
    fn test_serde_side() {
        let json = serde_json::to_string(&Side::Bid).unwrap();
        assert_eq!(json, "\"bid\"");

        let side: TradeSide = serde_json::from_str("\"sell\"").unwrap();
        assert_eq!(side, TradeSide::Sell);
    }

    #[test]
    fn test_delta_sequence_fallbacks() {
        let delta = Delta {
            instrument: Instrument::new(Venue::Kucoin, "BTC", "USDT"),
            sequence_start: Some(7),
            sequence_end: None,
            changes: vec![],
            is_snapshot: false,
            timestamp: None,
        };
        assert_eq!(delta.last_sequence(), Some(7));
        assert_eq!(delta.first_sequence(), Some(7));
    }

    #[test]
    fn test_delta_into_snapshot_splits_sides_and_skips_removals() {
        let delta = Delta {
            instrument: Instrument::new(Venue::Kraken, "XBT", "EUR"),
            sequence_start: None,
            sequence_end: None,
            changes: vec![
                LevelChange::new(Side::Bid, dec!(10), dec!(1)),
                LevelChange::new(Side::Ask, dec!(11), dec!(2)),
                LevelChange::new(Side::Ask, dec!(12), dec!(0)),
            ],
            is_snapshot: false,
            timestamp: Some(5),
        };

        let snapshot = delta.into_snapshot();
        assert_eq!(snapshot.bids.len(), 1);
        assert_eq!(snapshot.asks.len(), 1);
        assert_eq!(snapshot.asks[0].price, dec!(11));
        assert_eq!(snapshot.timestamp, Some(5));
    }
}
