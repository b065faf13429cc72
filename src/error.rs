//! Error types for the venue-feed crate.
//!
//! Nothing in the reconciliation core is process-fatal: decode errors are
//! reported and the offending message dropped, sequence faults become resync
//! signals. The variants below are what surfaces to callers of the fallible
//! entry points (normalization, transport, snapshot fetches).

use rust_decimal::Decimal;

use crate::types::{Instrument, Venue};

/// The main error type for this crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Adapter payload could not be turned into a canonical event
    #[error("decode error{}: {reason}", venue_suffix(.venue))]
    Decode {
        /// Venue the payload came from, when known
        venue: Option<Venue>,
        /// What was wrong with the payload
        reason: String,
    },

    /// A price or quantity string is not a decimal number
    #[error("invalid decimal: {0:?}")]
    InvalidDecimal(String),

    /// A side word is not recognised
    #[error("invalid side: {0:?}")]
    InvalidSide(String),

    /// A venue symbol cannot be split into a currency pair
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// A venue name is not recognised
    #[error("unknown venue: {0:?}")]
    UnknownVenue(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// URL could not be built
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A REST endpoint answered with an error status
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or its `message` field
        message: String,
    },

    /// Rate limit exceeded
    #[error("rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited {
        /// Suggested wait, when the venue sends `Retry-After`
        retry_after_ms: Option<u64>,
    },

    /// WebSocket connection closed unexpectedly
    #[error("WebSocket connection closed")]
    ConnectionClosed,

    /// Updates were missed beyond the venue's tolerance
    #[error("sequence gap: expected {expected}, got {got}")]
    SequenceGap {
        /// Expected sequence number
        expected: u64,
        /// Actual sequence number received
        got: u64,
    },

    /// Applying an update would have crossed the book
    #[error("crossed book: best bid {bid} >= best ask {ask}")]
    CrossedBook {
        /// Best bid after the update
        bid: Decimal,
        /// Best ask after the update
        ask: Decimal,
    },

    /// The instrument has no active subscription
    #[error("not subscribed: {0}")]
    NotSubscribed(Instrument),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out
    #[error("operation timed out")]
    Timeout,
}

fn venue_suffix(venue: &Option<Venue>) -> String {
    venue.map(|v| format!(" ({})", v)).unwrap_or_default()
}

impl Error {
    /// Build a decode error
    pub fn decode(venue: Option<Venue>, reason: impl Into<String>) -> Self {
        Error::Decode {
            venue,
            reason: reason.into(),
        }
    }

    /// Whether the error only affects a single message
    ///
    /// Such errors are dropped and counted; the stream keeps going.
    pub fn is_message_local(&self) -> bool {
        matches!(
            self,
            Error::Decode { .. }
                | Error::InvalidDecimal(_)
                | Error::InvalidSide(_)
                | Error::InvalidSymbol(_)
                | Error::UnknownVenue(_)
                | Error::Json(_)
        )
    }
}
