//! Benchmarks for ladder updates and reconciliation.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use venue_feed::emitter::Emitter;
use venue_feed::normalizer::Normalizer;
use venue_feed::orderbook::{BookEntry, OrderBookLadder, ReconciliationEngine};
use venue_feed::types::{Delta, Instrument, LevelChange, RawEvent, Side, Snapshot, Venue};

fn instrument() -> Instrument {
    Instrument::new(Venue::Kucoin, "BTC", "USDT")
}

/// Ladder with `size` levels per side around 10_000
fn populated_ladder(size: u32) -> OrderBookLadder {
    let mut ladder = OrderBookLadder::new(instrument());
    for i in 1..=size {
        ladder.set_level(Side::Bid, Decimal::from(10_000 - i), Decimal::ONE);
        ladder.set_level(Side::Ask, Decimal::from(10_000 + i), Decimal::ONE);
    }
    ladder
}

fn bench_ladder_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("ladder_apply");

    for size in [10u32, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut ladder = populated_ladder(size);
            let changes = [
                LevelChange::new(Side::Bid, Decimal::from(9_995), Decimal::TWO),
                LevelChange::new(Side::Ask, Decimal::from(10_005), Decimal::ZERO),
                LevelChange::new(Side::Ask, Decimal::from(10_005), Decimal::ONE),
            ];

            b.iter(|| {
                let journal = ladder.apply_changes(black_box(&changes));
                black_box(ladder.is_crossed());
                black_box(journal.len());
            });
        });
    }

    group.finish();
}

fn bench_engine_delta(c: &mut Criterion) {
    let engine = ReconciliationEngine::new(Venue::Kucoin.profile());
    let mut entry = BookEntry::new(instrument());
    let bids = (1..=100)
        .map(|i| LevelChange::new(Side::Bid, Decimal::from(10_000 - i), Decimal::ONE))
        .collect();
    let asks = (1..=100)
        .map(|i| LevelChange::new(Side::Ask, Decimal::from(10_000 + i), Decimal::ONE))
        .collect();
    let _ = engine.apply(
        &mut entry,
        RawEvent::Snapshot(Snapshot {
            instrument: instrument(),
            sequence: Some(0),
            bids,
            asks,
            timestamp: Some(0),
        }),
    );

    let mut sequence = 0u64;
    c.bench_function("engine_delta", |b| {
        b.iter(|| {
            sequence += 1;
            let step = engine.apply(
                &mut entry,
                RawEvent::Delta(Delta {
                    instrument: instrument(),
                    sequence_start: Some(sequence),
                    sequence_end: Some(sequence),
                    changes: vec![LevelChange::new(
                        Side::Bid,
                        Decimal::from(9_990 + sequence % 10),
                        Decimal::from(sequence % 3),
                    )],
                    is_snapshot: false,
                    timestamp: Some(sequence),
                }),
            );
            black_box(step);
        });
    });
}

fn bench_emit_book(c: &mut Criterion) {
    let ladder = populated_ladder(50);
    let mut emitter = Emitter::new(instrument());

    c.bench_function("emit_book_50", |b| {
        b.iter(|| {
            black_box(emitter.emit_book(black_box(&ladder)));
        });
    });
}

fn bench_normalize_payload(c: &mut Criterion) {
    let normalizer = Normalizer::new();
    let payload = r#"{"type":"delta","venue":"KUCOIN","symbol":"BTC-USDT",
        "sequence_start":11,"sequence_end":11,
        "changes":[{"side":"ask","price":"101.10","quantity":"0"},
                   {"side":"bid","price":"100.05","quantity":"1.5"}]}"#;

    c.bench_function("normalize_payload", |b| {
        b.iter(|| {
            black_box(normalizer.normalize_payload(black_box(payload)).ok());
        });
    });
}

criterion_group!(
    benches,
    bench_ladder_apply,
    bench_engine_delta,
    bench_emit_book,
    bench_normalize_payload
);
criterion_main!(benches);
