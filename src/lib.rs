//! # venue-feed
//!
//! Venue-agnostic market data core: turns the depth and trade streams of many
//! incompatible crypto venues into correct, sorted, duplicate-free local
//! order books.
//!
//! ## Features
//!
//! - **Reconciliation Engine** - Sequence dedup, gap detection, snapshot
//!   bootstrap with delta buffering, crossed-book rollback
//! - **Decimal Ladders** - Exact `rust_decimal` prices with canonical keys,
//!   O(log n) level updates
//! - **Per-Instrument Lanes** - One Tokio task per instrument, drop-oldest
//!   output queues so one slow consumer never stalls another
//! - **Venue Registry** - Compile-time table of venue capabilities
//!
//! ## Quick Start
//!
//! ```rust
//! use venue_feed::{FeedConfig, FeedSession};
//! use venue_feed::types::{FeedOutput, Instrument, Venue};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let session = FeedSession::new(FeedConfig::new());
//! let stream = session.subscribe(Instrument::new(Venue::Kraken, "XBT", "USD"));
//!
//! // Kraken's first book message is a full book
//! session.ingest_payload(
//!     r#"{"type":"delta","venue":"KRAKEN","symbol":"XBT/USD","changes":[
//!         {"side":"bid","price":"100.10","quantity":"1"},
//!         {"side":"ask","price":"100.20","quantity":"2"}]}"#,
//! );
//!
//! if let Some(FeedOutput::Book(book)) = stream.recv().await {
//!     println!("best bid {:?}", book.best_bid());
//! }
//! # }
//! ```
//!
//! ## Architecture
//!
//! Data flows adapter → normalizer → engine (+ store) → emitter → queue:
//!
//! - [`adapter`] - Seam for venue wire decoders
//! - [`normalizer`] - Adapter output to canonical events
//! - [`orderbook`] - Ladder, store and reconciliation engine
//! - [`emitter`] - Published records and their unique ids
//! - [`feed`] - Lanes, output queues, REST snapshots, WebSocket transport
//! - [`types`] - Instruments, venues, events and records
//! - [`config`] - Feed configuration
//! - [`error`] - Error types for the crate

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod adapter;
pub mod config;
pub mod emitter;
pub mod error;
pub mod feed;
pub mod normalizer;
pub mod orderbook;
pub mod types;

// Re-export main types at crate root for convenience
pub use config::FeedConfig;
pub use error::Error;
pub use feed::FeedSession;
pub use normalizer::Normalizer;
pub use orderbook::{OrderBookLadder, OrderBookStore, ReconciliationEngine};

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;
