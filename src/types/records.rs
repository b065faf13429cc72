//! Records published downstream.
//!
//! These are immutable copies: the ladder they were taken from keeps mutating
//! after emission.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::events::TradeSide;
use super::instrument::Instrument;
use super::venue::Venue;
use super::{Price, Quantity, TimestampMs};

/// One price level of a published book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Level price
    pub price: Price,
    /// Total quantity resting at the price (always > 0 in a published book)
    pub quantity: Quantity,
    /// Number of orders at the level, when the venue reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_count: Option<u32>,
}

impl PriceLevel {
    /// Create a level without order-count metadata
    pub fn new(price: Price, quantity: Quantity) -> Self {
        Self {
            price,
            quantity,
            order_count: None,
        }
    }
}

/// Published order book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Identifier unique per instrument within this process
    pub unique_id: String,
    /// Book the record describes
    pub instrument: Instrument,
    /// Time of the latest update folded into the book
    pub event_time: TimestampMs,
    /// Source venue
    pub venue: Venue,
    /// Bid levels, best (highest) first
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best (lowest) first
    pub asks: Vec<PriceLevel>,
}

impl OrderBook {
    /// Best bid level
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Best ask level
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }
}

/// Published trade print
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickData {
    /// Venue trade id, or a salted timestamp id
    pub unique_id: String,
    /// Trade time
    pub event_time: TimestampMs,
    /// Execution price
    pub price: Price,
    /// Executed quantity
    pub quantity: Quantity,
    /// Book the trade printed on
    pub instrument: Instrument,
    /// Source venue
    pub venue: Venue,
    /// Aggressor side, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<TradeSide>,
}

/// Why an instrument left the synchronized state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResyncReason {
    /// Updates were missed beyond the venue's tolerance
    SequenceGap {
        /// Sequence that should have come next
        expected: u64,
        /// First sequence actually received
        got: u64,
    },
    /// Applying an update would have crossed the book
    CrossedBook,
    /// The venue connection dropped
    Disconnected,
}

impl fmt::Display for ResyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResyncReason::SequenceGap { expected, got } => {
                write!(f, "sequence gap (expected {}, got {})", expected, got)
            }
            ResyncReason::CrossedBook => f.write_str("crossed book"),
            ResyncReason::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Whether a resync signal marks the start or the end of a resync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncPhase {
    /// Book updates for the instrument are suspended
    Entered,
    /// The book was rebuilt from a snapshot and updates resume
    Recovered,
}

/// Externally observable resync transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncSignal {
    /// Affected book
    pub instrument: Instrument,
    /// Cause of the resync
    pub reason: ResyncReason,
    /// Entry or exit
    pub phase: ResyncPhase,
}

impl ResyncSignal {
    /// Signal that a resync started
    pub fn entered(instrument: Instrument, reason: ResyncReason) -> Self {
        Self {
            instrument,
            reason,
            phase: ResyncPhase::Entered,
        }
    }

    /// Signal that a resync completed
    pub fn recovered(instrument: Instrument, reason: ResyncReason) -> Self {
        Self {
            instrument,
            reason,
            phase: ResyncPhase::Recovered,
        }
    }
}

/// Item delivered to the consumer of one instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedOutput {
    /// Book changed
    Book(OrderBook),
    /// Trade printed
    Tick(TickData),
    /// Resync started or finished
    Resync(ResyncSignal),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reason_display() {
        let reason = ResyncReason::SequenceGap {
            expected: 5,
            got: 8,
        };
        assert!(reason.to_string().contains('5'));
        assert!(reason.to_string().contains('8'));
        assert_eq!(ResyncReason::CrossedBook.to_string(), "crossed book");
    }

    #[test]
    fn test_order_book_serializes_decimals_as_strings() {
        let book = OrderBook {
            unique_id: "10".to_string(),
            instrument: Instrument::new(Venue::Kucoin, "BTC", "USDT"),
            event_time: 1,
            venue: Venue::Kucoin,
            bids: vec![PriceLevel::new(dec!(100.5), dec!(1))],
            asks: vec![],
        };
        let json = serde_json::to_string(&book).unwrap();
        assert!(json.contains("\"price\":\"100.5\""));
        assert_eq!(book.best_bid().map(|l| l.price), Some(dec!(100.5)));
        assert!(book.best_ask().is_none());
    }
}
