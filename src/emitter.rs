//! Conversion of ladder state and trades into published records.
//!
//! Records carry a `unique_id`. Venue sequences and trade ids are used when
//! present; otherwise the id is the event timestamp in milliseconds salted
//! with a three-digit counter, so several records sharing a millisecond stay
//! distinct: trades at `T` become `T000`, `T001`, `T002`.

use crate::orderbook::OrderBookLadder;
use crate::types::{now_ms, Instrument, OrderBook, TickData, TimestampMs, Trade};

/// Generates salted timestamp ids
///
/// The counter restarts at zero whenever the timestamp differs from the
/// previous one. Past 999 records in one millisecond the counter simply
/// grows wider.
#[derive(Debug, Clone, Default)]
pub struct UniqueIdSalter {
    last_timestamp: Option<TimestampMs>,
    counter: u32,
}

impl UniqueIdSalter {
    /// Create a salter
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for a record at `timestamp`
    pub fn next_id(&mut self, timestamp: TimestampMs) -> String {
        if self.last_timestamp == Some(timestamp) {
            self.counter += 1;
        } else {
            self.last_timestamp = Some(timestamp);
            self.counter = 0;
        }
        format!("{}{:03}", timestamp, self.counter)
    }
}

/// Builds downstream records for one instrument.
///
/// Owned by the instrument's lane; ids are unique per instrument.
#[derive(Debug, Clone)]
pub struct Emitter {
    instrument: Instrument,
    book_ids: UniqueIdSalter,
    trade_ids: UniqueIdSalter,
}

impl Emitter {
    /// Create an emitter for an instrument
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            book_ids: UniqueIdSalter::new(),
            trade_ids: UniqueIdSalter::new(),
        }
    }

    /// Get the instrument
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Copy the ladder into an [`OrderBook`]
    ///
    /// The id is the ladder's last sequence when the venue has one.
    pub fn emit_book(&mut self, ladder: &OrderBookLadder) -> OrderBook {
        let event_time = ladder.last_event_time().unwrap_or_else(now_ms);
        let unique_id = match ladder.last_sequence() {
            Some(sequence) => sequence.to_string(),
            None => self.book_ids.next_id(event_time),
        };

        OrderBook {
            unique_id,
            instrument: ladder.instrument().clone(),
            event_time,
            venue: ladder.instrument().venue,
            bids: ladder.bids().cloned().collect(),
            asks: ladder.asks().cloned().collect(),
        }
    }

    /// Turn a trade into a [`TickData`]
    pub fn emit_trade(&mut self, trade: Trade) -> TickData {
        let unique_id = match trade.trade_id {
            Some(id) => id,
            None => self.trade_ids.next_id(trade.timestamp),
        };

        TickData {
            unique_id,
            event_time: trade.timestamp,
            price: trade.price,
            quantity: trade.quantity,
            venue: trade.instrument.venue,
            instrument: trade.instrument,
            side: trade.side,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Side, TradeSide, Venue};
    use rust_decimal_macros::dec;

    fn idax() -> Instrument {
        Instrument::new(Venue::Idax, "ETH", "BTC")
    }

    fn trade(timestamp: TimestampMs, trade_id: Option<&str>) -> Trade {
        Trade {
            instrument: idax(),
            trade_id: trade_id.map(str::to_string),
            price: dec!(0.03),
            quantity: dec!(1),
            side: Some(TradeSide::Buy),
            timestamp,
        }
    }

    #[test]
    fn test_salted_ids_same_timestamp() {
        let mut emitter = Emitter::new(idax());
        let ids: Vec<String> = (0..3)
            .map(|_| emitter.emit_trade(trade(1_700_000_000_123, None)).unique_id)
            .collect();

        assert_eq!(
            ids,
            vec![
                "1700000000123000".to_string(),
                "1700000000123001".to_string(),
                "1700000000123002".to_string(),
            ]
        );
    }

    #[test]
    fn test_salt_resets_on_new_timestamp() {
        let mut salter = UniqueIdSalter::new();
        assert_eq!(salter.next_id(5), "5000");
        assert_eq!(salter.next_id(5), "5001");
        assert_eq!(salter.next_id(6), "6000");
        assert_eq!(salter.next_id(5), "5000");
    }

    #[test]
    fn test_venue_trade_id_is_kept() {
        let mut emitter = Emitter::new(idax());
        let tick = emitter.emit_trade(trade(1, Some("abc-1")));
        assert_eq!(tick.unique_id, "abc-1");
        assert_eq!(tick.venue, Venue::Idax);
        assert_eq!(tick.side, Some(TradeSide::Buy));
    }

    #[test]
    fn test_emit_book_copies_sorted_levels() {
        let mut ladder = OrderBookLadder::new(idax());
        ladder.set_level(Side::Bid, dec!(1), dec!(1));
        ladder.set_level(Side::Bid, dec!(2), dec!(1));
        ladder.set_level(Side::Ask, dec!(4), dec!(1));
        ladder.set_level(Side::Ask, dec!(3), dec!(1));
        ladder.record_event_time(Some(77));

        let mut emitter = Emitter::new(idax());
        let book = emitter.emit_book(&ladder);

        assert_eq!(book.unique_id, "77000");
        assert_eq!(book.event_time, 77);
        assert_eq!(book.best_bid().map(|l| l.price), Some(dec!(2)));
        assert_eq!(book.best_ask().map(|l| l.price), Some(dec!(3)));

        // Later ladder changes do not leak into the published copy
        ladder.set_level(Side::Bid, dec!(2), dec!(0));
        assert_eq!(book.bids.len(), 2);
    }

    #[test]
    fn test_emit_book_uses_sequence() {
        let mut ladder = OrderBookLadder::new(idax());
        ladder.record_sequence(Some(42));
        let book = Emitter::new(idax()).emit_book(&ladder);
        assert_eq!(book.unique_id, "42");
    }
}
