//! Seam between venue wire formats and the feed core.
//!
//! A [`FeedAdapter`] knows one venue's WebSocket endpoint, how to ask it for
//! instruments and how to turn a frame into [`AdapterMessage`]s. Everything
//! venue-specific stays behind this trait; the core only sees adapter
//! messages.
//!
//! [`JsonFeedAdapter`] speaks the crate's own adapter JSON shape directly.
//! It fits relays that already normalize venue output and is what the demo
//! and tests replay.

use serde::Deserialize;
use serde_json::json;

use crate::error::Error;
use crate::types::{AdapterMessage, Instrument, Venue};
use crate::Result;

/// Decoder for one venue's stream
pub trait FeedAdapter: Send + Sync {
    /// Venue this adapter decodes
    fn venue(&self) -> Venue;

    /// WebSocket URL to connect to
    fn endpoint(&self) -> &str;

    /// Text frames that subscribe the given instruments
    fn subscribe_frames(&self, instruments: &[Instrument]) -> Vec<String>;

    /// Text frames that unsubscribe the given instruments
    ///
    /// Sent ahead of the subscribe frames when a desynchronized book is
    /// resubscribed. Venues that resend their opening book on a repeated
    /// subscribe need none.
    fn unsubscribe_frames(&self, _instruments: &[Instrument]) -> Vec<String> {
        Vec::new()
    }

    /// Decode one text frame.
    ///
    /// Control frames (acks, heartbeats) decode to an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is malformed; the caller drops it.
    fn decode(&self, frame: &str) -> Result<Vec<AdapterMessage>>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Frame {
    Batch(Vec<AdapterMessage>),
    Single(AdapterMessage),
}

/// Adapter for streams already in the adapter JSON shape
#[derive(Debug, Clone)]
pub struct JsonFeedAdapter {
    venue: Venue,
    endpoint: String,
}

impl JsonFeedAdapter {
    /// Create an adapter for a venue's relay endpoint
    pub fn new(venue: Venue, endpoint: impl Into<String>) -> Self {
        Self {
            venue,
            endpoint: endpoint.into(),
        }
    }

    fn command(&self, op: &str, instruments: &[Instrument]) -> Vec<String> {
        if instruments.is_empty() {
            return Vec::new();
        }
        let symbols: Vec<String> = instruments.iter().map(|i| i.pair.to_string()).collect();
        vec![json!({
            "op": op,
            "venue": self.venue,
            "symbols": symbols,
        })
        .to_string()]
    }
}

impl FeedAdapter for JsonFeedAdapter {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn subscribe_frames(&self, instruments: &[Instrument]) -> Vec<String> {
        self.command("subscribe", instruments)
    }

    fn unsubscribe_frames(&self, instruments: &[Instrument]) -> Vec<String> {
        self.command("unsubscribe", instruments)
    }

    fn decode(&self, frame: &str) -> Result<Vec<AdapterMessage>> {
        let value: serde_json::Value = serde_json::from_str(frame)?;
        if value.is_object() && value.get("type").is_none() {
            return Ok(Vec::new());
        }

        let messages = match serde_json::from_value(value)? {
            Frame::Batch(messages) => messages,
            Frame::Single(message) => vec![message],
        };

        if let Some(foreign) = messages.iter().find(|m| m.venue() != self.venue) {
            return Err(Error::decode(
                Some(self.venue),
                format!("frame for {} on a {} stream", foreign.venue(), self.venue),
            ));
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> JsonFeedAdapter {
        JsonFeedAdapter::new(Venue::Kucoin, "wss://relay.invalid/kucoin")
    }

    #[test]
    fn test_decode_single_and_batch() {
        let single = r#"{"type":"trade","venue":"KUCOIN","symbol":"BTC-USDT",
            "price":"1","quantity":"1","timestamp":1}"#;
        assert_eq!(adapter().decode(single).unwrap().len(), 1);

        let batch = r#"[
            {"type":"delta","venue":"KUCOIN","symbol":"BTC-USDT","sequence_start":1,
             "changes":[{"side":"bid","price":"1","quantity":"1"}]},
            {"type":"delta","venue":"KUCOIN","symbol":"BTC-USDT","sequence_start":2,
             "changes":[{"side":"bid","price":"1","quantity":"0"}]}
        ]"#;
        assert_eq!(adapter().decode(batch).unwrap().len(), 2);
    }

    #[test]
    fn test_control_frames_are_empty() {
        let ack = r#"{"event":"subscribed","symbols":["BTC-USDT"]}"#;
        assert!(adapter().decode(ack).unwrap().is_empty());
    }

    #[test]
    fn test_foreign_venue_is_rejected() {
        let frame = r#"{"type":"trade","venue":"BINANCE","symbol":"BTCUSDT",
            "price":"1","quantity":"1","timestamp":1}"#;
        let err = adapter().decode(frame).unwrap_err();
        assert!(err.is_message_local());
    }

    #[test]
    fn test_malformed_frame() {
        assert!(matches!(adapter().decode("{oops"), Err(Error::Json(_))));
    }

    #[test]
    fn test_subscribe_frames() {
        let frames = adapter().subscribe_frames(&[
            Instrument::new(Venue::Kucoin, "BTC", "USDT"),
            Instrument::new(Venue::Kucoin, "ETH", "USDT"),
        ]);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("\"BTC-USDT\""));
        assert!(frames[0].contains("\"KUCOIN\""));
        assert!(adapter().subscribe_frames(&[]).is_empty());
    }

    #[test]
    fn test_unsubscribe_frames() {
        let frames = adapter().unsubscribe_frames(&[Instrument::new(Venue::Kucoin, "BTC", "USDT")]);
        assert_eq!(frames.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["op"], "unsubscribe");
        assert_eq!(value["symbols"][0], "BTC-USDT");
    }
}
