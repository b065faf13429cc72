//! Adapter output to canonical events.
//!
//! [`Normalizer`] is stateless: every [`AdapterMessage`] maps to zero or one
//! [`RawEvent`]. A message that cannot be normalized yields an error for that
//! message only; callers log it, count it and move on.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::Error;
use crate::types::messages::{AdapterChange, AdapterLevel};
use crate::types::{
    AdapterMessage, Delta, Instrument, LevelChange, RawEvent, Side, Snapshot, Trade, TradeSide,
    Venue,
};
use crate::Result;

/// Maps adapter messages onto [`RawEvent`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    /// Create a normalizer
    pub fn new() -> Self {
        Self
    }

    /// Normalize one adapter message.
    ///
    /// Returns `Ok(None)` for a delta that carries no changes and is not
    /// flagged as a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if a decimal, side or symbol cannot be parsed, or if
    /// a delta's sequence range ends before it starts.
    pub fn normalize(&self, message: AdapterMessage) -> Result<Option<RawEvent>> {
        match message {
            AdapterMessage::Snapshot {
                venue,
                symbol,
                sequence,
                bids,
                asks,
                timestamp,
            } => {
                let instrument = instrument(venue, &symbol)?;
                Ok(Some(RawEvent::Snapshot(Snapshot {
                    instrument,
                    sequence,
                    bids: levels(Side::Bid, &bids)?,
                    asks: levels(Side::Ask, &asks)?,
                    timestamp,
                })))
            }
            AdapterMessage::Delta {
                venue,
                symbol,
                sequence_start,
                sequence_end,
                changes,
                is_snapshot,
                timestamp,
            } => {
                if changes.is_empty() && !is_snapshot {
                    return Ok(None);
                }
                if let (Some(start), Some(end)) = (sequence_start, sequence_end) {
                    if end < start {
                        return Err(Error::decode(
                            Some(venue),
                            format!("sequence range {}..{} ends before it starts", start, end),
                        ));
                    }
                }

                let instrument = instrument(venue, &symbol)?;
                let changes = changes
                    .iter()
                    .map(change)
                    .collect::<Result<Vec<_>>>()?;

                Ok(Some(RawEvent::Delta(Delta {
                    instrument,
                    sequence_start,
                    sequence_end,
                    changes,
                    is_snapshot,
                    timestamp,
                })))
            }
            AdapterMessage::Trade {
                venue,
                symbol,
                price,
                quantity,
                side,
                timestamp,
                trade_id,
            } => {
                let instrument = instrument(venue, &symbol)?;
                let side = side.as_deref().map(parse_trade_side).transpose()?;
                Ok(Some(RawEvent::Trade(Trade {
                    instrument,
                    trade_id: trade_id.filter(|id| !id.is_empty()),
                    price: parse_decimal(&price)?,
                    quantity: parse_decimal(&quantity)?,
                    side,
                    timestamp,
                })))
            }
        }
    }

    /// Normalize the JSON text of one adapter message
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for malformed JSON, otherwise as [`normalize`](Self::normalize).
    pub fn normalize_payload(&self, payload: &str) -> Result<Option<RawEvent>> {
        let message: AdapterMessage = serde_json::from_str(payload)?;
        self.normalize(message)
    }
}

/// Parse a decimal in plain (`"100.50"`) or scientific (`"1e-5"`) notation
pub fn parse_decimal(value: &str) -> Result<Decimal> {
    let trimmed = value.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| Error::InvalidDecimal(value.to_string()))
}

/// Parse a book side word
pub fn parse_side(value: &str) -> Result<Side> {
    match value.trim().to_ascii_lowercase().as_str() {
        "bid" | "bids" | "buy" | "b" => Ok(Side::Bid),
        "ask" | "asks" | "sell" | "offer" | "a" | "s" => Ok(Side::Ask),
        _ => Err(Error::InvalidSide(value.to_string())),
    }
}

/// Parse a trade aggressor side word
///
/// `buy` means the buyer took liquidity; book side words are accepted too.
pub fn parse_trade_side(value: &str) -> Result<TradeSide> {
    match value.trim().to_ascii_lowercase().as_str() {
        "buy" | "b" => Ok(TradeSide::Buy),
        "sell" | "s" => Ok(TradeSide::Sell),
        _ => parse_side(value).map(TradeSide::from),
    }
}

fn instrument(venue: Venue, symbol: &str) -> Result<Instrument> {
    Instrument::from_symbol(venue, symbol)
}

fn levels(side: Side, levels: &[AdapterLevel]) -> Result<Vec<LevelChange>> {
    levels
        .iter()
        .map(|level| {
            Ok(LevelChange {
                side,
                price: parse_decimal(&level.price)?,
                quantity: parse_decimal(&level.quantity)?,
                order_count: level.orders,
            })
        })
        .collect()
}

fn change(change: &AdapterChange) -> Result<LevelChange> {
    Ok(LevelChange {
        side: parse_side(&change.side)?,
        price: parse_decimal(&change.price)?,
        quantity: parse_decimal(&change.quantity)?,
        order_count: change.orders,
    })
}
