//! Data model shared by every stage of the feed pipeline.
//!
//! - [`instrument`] - Currencies, currency pairs and the instrument key
//! - [`venue`] - The closed venue enum and its capability registry
//! - [`events`] - Canonical events consumed by the reconciliation engine
//! - [`messages`] - Loosely typed adapter output, before normalization
//! - [`records`] - Immutable records published downstream

pub mod events;
pub mod instrument;
pub mod messages;
pub mod records;
pub mod venue;

pub use events::{Delta, LevelChange, RawEvent, Side, Snapshot, Trade, TradeSide};
pub use instrument::{Currency, CurrencyPair, Instrument};
pub use messages::{AdapterChange, AdapterLevel, AdapterMessage};
pub use records::{FeedOutput, OrderBook, PriceLevel, ResyncPhase, ResyncReason, ResyncSignal, TickData};
pub use venue::{Venue, VenueCapabilities, VenueProfile};

/// Price as an arbitrary-precision decimal
///
/// Venues quote prices as decimal strings with inconsistent formatting
/// (`"100.10"` vs `"100.1"`), so prices are never converted to floating point.
pub type Price = rust_decimal::Decimal;

/// Quantity as an arbitrary-precision decimal
pub type Quantity = rust_decimal::Decimal;

/// Timestamp in milliseconds since Unix epoch
pub type TimestampMs = u64;

/// Sequence number assigned by a venue
pub type Sequence = u64;

/// Current wall-clock time in milliseconds since Unix epoch
pub fn now_ms() -> TimestampMs {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as TimestampMs)
        .unwrap_or(0)
}
