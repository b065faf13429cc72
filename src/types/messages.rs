//! Adapter output, before normalization.
//!
//! Venue adapters decode their bespoke wire formats into this loosely typed
//! shape: decimals stay as the strings the venue sent, sides are free-form
//! words and instruments are plain venue symbols. Everything here is
//! validated by the [`Normalizer`](crate::normalizer::Normalizer).
//!
//! The JSON form is `"type"`-tagged:
//!
//! ```json
//! {"type": "delta", "venue": "KUCOIN", "symbol": "BTC-USDT",
//!  "sequence_start": 11, "sequence_end": 11,
//!  "changes": [{"side": "ask", "price": "101", "quantity": "0"}]}
//! ```

use serde::{Deserialize, Serialize};

use super::venue::Venue;
use super::{Sequence, TimestampMs};

/// One price level as sent by the venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterLevel {
    /// Price as sent (e.g. `"100.10"`)
    pub price: String,
    /// Quantity as sent
    pub quantity: String,
    /// Order count, when the venue reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orders: Option<u32>,
}

impl AdapterLevel {
    /// Create a level from display strings
    pub fn new(price: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self {
            price: price.into(),
            quantity: quantity.into(),
            orders: None,
        }
    }
}

/// One level change as sent by the venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterChange {
    /// Side word (`bid`, `buy`, `ask`, `sell`, ...)
    pub side: String,
    /// Price as sent
    pub price: String,
    /// New absolute quantity as sent
    pub quantity: String,
    /// Order count, when the venue reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orders: Option<u32>,
}

impl AdapterChange {
    /// Create a change from display strings
    pub fn new(
        side: impl Into<String>,
        price: impl Into<String>,
        quantity: impl Into<String>,
    ) -> Self {
        Self {
            side: side.into(),
            price: price.into(),
            quantity: quantity.into(),
            orders: None,
        }
    }
}

/// Message produced by a venue adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdapterMessage {
    /// Full book
    Snapshot {
        /// Source venue
        venue: Venue,
        /// Venue symbol
        symbol: String,
        /// Snapshot sequence, if any
        #[serde(default)]
        sequence: Option<Sequence>,
        /// Bid levels
        #[serde(default)]
        bids: Vec<AdapterLevel>,
        /// Ask levels
        #[serde(default)]
        asks: Vec<AdapterLevel>,
        /// Venue timestamp
        #[serde(default)]
        timestamp: Option<TimestampMs>,
    },
    /// Incremental book update
    Delta {
        /// Source venue
        venue: Venue,
        /// Venue symbol
        symbol: String,
        /// First sequence of the update, if any
        #[serde(default)]
        sequence_start: Option<Sequence>,
        /// Last sequence of the update, if any
        #[serde(default)]
        sequence_end: Option<Sequence>,
        /// Level changes in venue order
        #[serde(default)]
        changes: Vec<AdapterChange>,
        /// Venue flagged the update as a complete level list
        #[serde(default)]
        is_snapshot: bool,
        /// Venue timestamp
        #[serde(default)]
        timestamp: Option<TimestampMs>,
    },
    /// Trade print
    Trade {
        /// Source venue
        venue: Venue,
        /// Venue symbol
        symbol: String,
        /// Price as sent
        price: String,
        /// Quantity as sent
        quantity: String,
        /// Aggressor side word, if any
        #[serde(default)]
        side: Option<String>,
        /// Venue timestamp
        timestamp: TimestampMs,
        /// Venue trade id, if any
        #[serde(default)]
        trade_id: Option<String>,
    },
}

impl AdapterMessage {
    /// Venue the message came from
    pub fn venue(&self) -> Venue {
        match self {
            AdapterMessage::Snapshot { venue, .. }
            | AdapterMessage::Delta { venue, .. }
            | AdapterMessage::Trade { venue, .. } => *venue,
        }
    }

    /// Venue symbol the message refers to
    pub fn symbol(&self) -> &str {
        match self {
            AdapterMessage::Snapshot { symbol, .. }
            | AdapterMessage::Delta { symbol, .. }
            | AdapterMessage::Trade { symbol, .. } => symbol,
        }
    }
}
