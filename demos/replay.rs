//! Replays a recorded feed through a session and prints what comes out.
//!
//! ```bash
//! RUST_LOG=venue_feed=debug cargo run --example replay
//! ```
//!
//! With a relay URL, the demo streams Kraken XBT/USD from it instead:
//!
//! ```bash
//! cargo run --example replay -- wss://relay.example/kraken
//! ```

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;
use venue_feed::adapter::JsonFeedAdapter;
use venue_feed::feed::{run_connection, InstrumentStream, ReconnectConfig, SnapshotReply, SnapshotSource};
use venue_feed::types::{FeedOutput, Instrument, LevelChange, Side, Snapshot, Venue};
use venue_feed::{FeedConfig, FeedSession};

/// Recorded Kucoin frames: deltas before and after the REST snapshot, a
/// duplicate, a gap and a trade.
const RECORDED: &[&str] = &[
    r#"{"type":"delta","venue":"KUCOIN","symbol":"BTC-USDT","sequence_start":10,"sequence_end":10,"changes":[{"side":"bid","price":"99.5","quantity":"3"}]}"#,
    r#"{"type":"delta","venue":"KUCOIN","symbol":"BTC-USDT","sequence_start":11,"sequence_end":11,"changes":[{"side":"ask","price":"101","quantity":"0"}],"timestamp":1700000000011}"#,
    r#"{"type":"trade","venue":"KUCOIN","symbol":"BTC-USDT","price":"100.5","quantity":"0.2","side":"buy","timestamp":1700000000011}"#,
    r#"{"type":"delta","venue":"KUCOIN","symbol":"BTC-USDT","sequence_start":12,"sequence_end":12,"changes":[{"side":"bid","price":"100","quantity":"1.5"}],"timestamp":1700000000012}"#,
    r#"{"type":"delta","venue":"KUCOIN","symbol":"BTC-USDT","sequence_start":12,"sequence_end":12,"changes":[{"side":"bid","price":"100","quantity":"9"}],"timestamp":1700000000012}"#,
    r#"{"type":"delta","venue":"KUCOIN","symbol":"BTC-USDT","sequence_start":15,"sequence_end":15,"changes":[{"side":"bid","price":"98","quantity":"1"}],"timestamp":1700000000015}"#,
    r#"{"type":"trade","venue":"KUCOIN","symbol":"BTC-USDT","price":"oops","quantity":"1","timestamp":1700000000016}"#,
];

/// Answers every request with the same canned book
struct CannedSnapshots {
    sequence: std::sync::atomic::AtomicU64,
}

impl SnapshotSource for CannedSnapshots {
    fn request(&self, instrument: &Instrument, reply: SnapshotReply) {
        let sequence = self
            .sequence
            .fetch_add(5, std::sync::atomic::Ordering::Relaxed);
        let snapshot = Snapshot {
            instrument: instrument.clone(),
            sequence: Some(sequence),
            bids: vec![LevelChange::new(Side::Bid, dec!(100), dec!(1))],
            asks: vec![
                LevelChange::new(Side::Ask, dec!(101), dec!(2)),
                LevelChange::new(Side::Ask, dec!(102), dec!(4)),
            ],
            timestamp: Some(1_700_000_000_000 + sequence),
        };
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            reply.deliver(snapshot);
        });
    }
}

fn print_output(output: &FeedOutput) {
    match output {
        FeedOutput::Book(book) => {
            let best = |level: Option<&venue_feed::types::PriceLevel>| {
                level.map_or_else(|| "-".to_string(), |l| format!("{} x {}", l.quantity, l.price))
            };
            println!(
                "BOOK  {} id={} bid {} | ask {} ({} / {} levels)",
                book.instrument,
                book.unique_id,
                best(book.best_bid()),
                best(book.best_ask()),
                book.bids.len(),
                book.asks.len()
            );
        }
        FeedOutput::Tick(tick) => {
            println!(
                "TICK  {} id={} {} @ {} side={:?}",
                tick.instrument, tick.unique_id, tick.quantity, tick.price, tick.side
            );
        }
        FeedOutput::Resync(signal) => {
            println!(
                "RESYNC {} {:?}: {}",
                signal.instrument, signal.phase, signal.reason
            );
        }
    }
}

async fn drain(stream: &InstrumentStream, idle: Duration) {
    while let Ok(Some(output)) = tokio::time::timeout(idle, stream.recv()).await {
        print_output(&output);
    }
}

async fn replay() {
    let source = Arc::new(CannedSnapshots {
        sequence: std::sync::atomic::AtomicU64::new(10),
    });
    let session = FeedSession::with_snapshot_source(FeedConfig::new(), source);
    let instrument = Instrument::new(Venue::Kucoin, "BTC", "USDT");
    let stream = session.subscribe(instrument.clone());

    for frame in RECORDED {
        session.ingest_payload(frame);
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    drain(&stream, Duration::from_millis(200)).await;

    if let Some(stats) = session.store().stats(&instrument) {
        println!("stats: {:?}", stats);
    }
    println!("decode errors: {}", session.decode_errors());
}

async fn live(endpoint: String) {
    let session = FeedSession::new(FeedConfig::new());
    let instrument = Instrument::new(Venue::Kraken, "XBT", "USD");
    let stream = session.subscribe(instrument.clone());

    let connection = tokio::spawn(run_connection(
        JsonFeedAdapter::new(Venue::Kraken, endpoint),
        session.clone(),
        vec![instrument],
        ReconnectConfig::new().max_retries(3),
    ));

    tokio::select! {
        _ = async { while let Some(output) = stream.recv().await { print_output(&output) } } => {}
        result = connection => println!("connection ended: {:?}", result),
        _ = tokio::signal::ctrl_c() => println!("interrupted"),
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("venue_feed=info"));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    match std::env::args().nth(1) {
        Some(endpoint) => live(endpoint).await,
        None => replay().await,
    }
}
