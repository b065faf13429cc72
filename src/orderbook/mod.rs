//! Order book state and reconciliation.
//!
//! - [`OrderBookLadder`]: sorted bid/ask levels of one instrument
//!   (O(log n) level updates, canonical decimal price keys)
//! - [`OrderBookStore`]: one entry per instrument, each behind its own lock
//! - [`ReconciliationEngine`]: decides whether an update is applied,
//!   buffered, dropped or forces a resync
//!
//! # Example
//!
//! ```rust
//! use rust_decimal_macros::dec;
//! use venue_feed::orderbook::OrderBookLadder;
//! use venue_feed::types::{Instrument, Side, Venue};
//!
//! let mut book = OrderBookLadder::new(Instrument::new(Venue::Kraken, "XBT", "USD"));
//!
//! book.set_level(Side::Bid, dec!(100.5), dec!(2));
//! book.set_level(Side::Ask, dec!(101), dec!(1));
//!
//! if let Some((price, qty)) = book.best_bid() {
//!     println!("Best bid: {} @ {}", qty, price);
//! }
//! ```

pub mod engine;
pub mod ladder;
pub mod store;

pub use engine::{Decision, DropReason, ReconciliationEngine, Step};
pub use ladder::{ApplyJournal, OrderBookLadder, PriceKey};
pub use store::{BookEntry, BookStats, OrderBookStore, SharedEntry, SyncState};
