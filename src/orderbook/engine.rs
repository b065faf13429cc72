//! Reconciliation of venue depth streams into a local ladder.
//!
//! One [`ReconciliationEngine`] is built per venue from its
//! [`VenueProfile`]; the capability flags decide how a book is bootstrapped
//! and whether sequence numbers are checked. The engine is stateless itself:
//! everything it mutates lives in the [`BookEntry`] it is handed.
//!
//! # Sequence Tracking
//!
//! For sequenced venues, a delta whose last sequence is at or below the
//! ladder's is a duplicate and is dropped. A delta starting beyond
//! `last + 1 + gap_tolerance` means updates were lost; the book is marked
//! [`SyncState::Desynced`] and only a snapshot brings it back.
//!
//! # Recovery
//!
//! A desynchronized book asks for a fresh start: venues seeded over REST get
//! a snapshot fetch ([`Step::fetch_snapshot`]), every other venue asks the
//! connection to resubscribe the channel ([`Step::resubscribe`]) so the venue
//! sends its opening full book again.

use std::mem;

use tracing::{debug, trace, warn};

use crate::config::FeedConfig;
use crate::error::Error;
use crate::types::{
    Delta, RawEvent, ResyncReason, ResyncSignal, Sequence, Snapshot, Trade, Venue, VenueProfile,
};
use crate::Result;

use super::store::{BookEntry, SyncState};
use super::OrderBookLadder;

/// Default bound on deltas buffered per book while waiting for a snapshot
pub const DEFAULT_MAX_BUFFERED: usize = 10_000;

/// Why a delta was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// At or below the last applied sequence
    Stale,
    /// The book is desynchronized and the venue cannot rebuild from deltas
    Desynced,
}

/// What the engine did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A delta was folded into the ladder
    Applied,
    /// The ladder was rebuilt from a snapshot, then buffered deltas replayed
    Bootstrapped {
        /// Buffered deltas applied on top of the snapshot
        replayed: usize,
    },
    /// The delta was parked until a snapshot arrives
    Buffered,
    /// The delta was discarded
    Dropped(DropReason),
    /// The update was rejected and the book left the synchronized state
    Desynced(ResyncReason),
    /// Trades do not touch the ladder
    Trade(Trade),
}

/// Outcome of [`ReconciliationEngine::apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Step {
    /// What happened to the event
    pub decision: Decision,
    /// Resync transition to publish, if any
    pub signal: Option<ResyncSignal>,
    /// The caller should fetch a snapshot out of band
    pub fetch_snapshot: bool,
    /// The caller should have the connection resubscribe the instrument
    pub resubscribe: bool,
}

impl Step {
    fn new(decision: Decision) -> Self {
        Self {
            decision,
            signal: None,
            fetch_snapshot: false,
            resubscribe: false,
        }
    }

    /// Whether the ladder changed and a book should be published
    pub fn emits_book(&self) -> bool {
        matches!(
            self.decision,
            Decision::Applied | Decision::Bootstrapped { .. }
        )
    }
}

/// Applies snapshots and deltas to books of one venue.
///
/// # Example
///
/// ```rust
/// use rust_decimal_macros::dec;
/// use venue_feed::orderbook::{BookEntry, ReconciliationEngine, SyncState};
/// use venue_feed::types::{Instrument, LevelChange, RawEvent, Side, Snapshot, Venue};
///
/// let instrument = Instrument::new(Venue::Kucoin, "BTC", "USDT");
/// let engine = ReconciliationEngine::new(Venue::Kucoin.profile());
/// let mut entry = BookEntry::new(instrument.clone());
///
/// let step = engine.apply(&mut entry, RawEvent::Snapshot(Snapshot {
///     instrument,
///     sequence: Some(10),
///     bids: vec![LevelChange::new(Side::Bid, dec!(100), dec!(1))],
///     asks: vec![LevelChange::new(Side::Ask, dec!(101), dec!(1))],
///     timestamp: None,
/// }));
///
/// assert!(step.emits_book());
/// assert_eq!(entry.state(), SyncState::Synced);
/// ```
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    profile: VenueProfile,
    max_buffered: usize,
}

impl ReconciliationEngine {
    /// Create an engine for a venue profile
    pub fn new(profile: VenueProfile) -> Self {
        Self {
            profile,
            max_buffered: DEFAULT_MAX_BUFFERED,
        }
    }

    /// Create an engine for a venue using a feed configuration
    pub fn from_config(config: &FeedConfig, venue: Venue) -> Self {
        Self::new(config.profile_for(venue)).with_max_buffered(config.max_buffered_deltas())
    }

    /// Set the bound on buffered deltas per book
    #[must_use]
    pub fn with_max_buffered(mut self, max_buffered: usize) -> Self {
        self.max_buffered = max_buffered;
        self
    }

    /// Get the venue profile
    pub fn profile(&self) -> &VenueProfile {
        &self.profile
    }

    /// Apply one event to a book.
    pub fn apply(&self, entry: &mut BookEntry, event: RawEvent) -> Step {
        match event {
            RawEvent::Trade(trade) => Step::new(Decision::Trade(trade)),
            RawEvent::Snapshot(snapshot) => self.rebuild(entry, snapshot),
            RawEvent::Delta(delta) if delta.is_snapshot => self.rebuild(entry, delta.into_snapshot()),
            RawEvent::Delta(delta) => self.on_delta(entry, delta),
        }
    }

    /// Clear a book after its venue connection dropped
    ///
    /// The book goes back to [`SyncState::Uninitialized`] and a resync is
    /// reported; the next snapshot (or self-contained delta) rebuilds it.
    pub fn reset(&self, entry: &mut BookEntry, reason: ResyncReason) -> ResyncSignal {
        entry.ladder.clear();
        entry.pending.clear();
        entry.state = SyncState::Uninitialized;
        entry.snapshot_requested = false;
        entry.resubscribe_requested = false;
        entry.awaiting_bootstrap = false;
        entry.resync_pending = Some(reason);
        entry.stats.resyncs += 1;

        debug!(instrument = %entry.instrument(), %reason, "book reset");
        ResyncSignal::entered(entry.instrument().clone(), reason)
    }

    /// The transport resubscribed the book's channel
    pub fn resubscribed(&self, entry: &mut BookEntry) {
        entry.resubscribe_requested = false;
        entry.awaiting_bootstrap = true;
    }

    /// An out-of-band snapshot fetch failed; the next delta may request another
    pub fn snapshot_failed(&self, entry: &mut BookEntry) {
        entry.snapshot_requested = false;
    }

    fn on_delta(&self, entry: &mut BookEntry, delta: Delta) -> Step {
        let capabilities = self.profile.capabilities;

        match entry.state {
            SyncState::Uninitialized if capabilities.self_contained_first_delta => {
                self.rebuild(entry, delta.into_snapshot())
            }
            SyncState::Uninitialized | SyncState::AwaitingSnapshot => {
                self.buffer(entry, delta);
                entry.state = SyncState::AwaitingSnapshot;
                let mut step = Step::new(Decision::Buffered);
                step.fetch_snapshot = self.request_snapshot(entry);
                step
            }
            SyncState::Synced => self.apply_synced(entry, delta),
            SyncState::Desynced if capabilities.needs_rest_snapshot_bootstrap => {
                self.buffer(entry, delta);
                let mut step = Step::new(Decision::Buffered);
                step.fetch_snapshot = self.request_snapshot(entry);
                step
            }
            SyncState::Desynced
                if entry.awaiting_bootstrap && capabilities.self_contained_first_delta =>
            {
                self.rebuild(entry, delta.into_snapshot())
            }
            SyncState::Desynced => {
                entry.stats.dropped_desynced += 1;
                trace!(instrument = %entry.instrument(), "delta dropped while desynchronized");
                let mut step = Step::new(Decision::Dropped(DropReason::Desynced));
                if !entry.awaiting_bootstrap {
                    step.resubscribe = self.request_resubscribe(entry);
                }
                step
            }
        }
    }

    fn apply_synced(&self, entry: &mut BookEntry, delta: Delta) -> Step {
        let sequenced = self.profile.capabilities.has_sequence_numbers;

        if sequenced {
            if let (Some(last), Some(end)) = (entry.ladder.last_sequence(), delta.last_sequence()) {
                if end <= last {
                    entry.stats.dropped_stale += 1;
                    trace!(
                        instrument = %entry.instrument(),
                        sequence = end,
                        last_sequence = last,
                        "stale delta dropped"
                    );
                    return Step::new(Decision::Dropped(DropReason::Stale));
                }

                let start = delta.first_sequence().unwrap_or(end);
                if let Err(Error::SequenceGap { expected, got }) = self.check_gap(last, start) {
                    return self.desync(entry, ResyncReason::SequenceGap { expected, got }, Some(delta));
                }
            }
        }

        let journal = entry.ladder.apply_changes(&delta.changes);
        if let Err(fault) = entry.ladder.check_uncrossed() {
            entry.ladder.revert(journal);
            entry.stats.crossed += 1;
            warn!(instrument = %entry.instrument(), %fault, "delta rolled back");
            return self.desync(entry, ResyncReason::CrossedBook, None);
        }

        if sequenced {
            entry.ladder.record_sequence(delta.last_sequence());
        }
        entry.ladder.record_event_time(delta.timestamp);
        entry.stats.applied += 1;
        Step::new(Decision::Applied)
    }

    fn rebuild(&self, entry: &mut BookEntry, snapshot: Snapshot) -> Step {
        let base_sequence = snapshot.sequence;
        let mut ladder = OrderBookLadder::from_snapshot(&snapshot);

        if let Err(fault) = ladder.check_uncrossed() {
            entry.stats.crossed += 1;
            warn!(instrument = %entry.instrument(), %fault, "snapshot rejected");

            // No immediate retry; the next delta asks for a new snapshot or
            // resubscription.
            let mut step = if entry.state == SyncState::Desynced {
                Step::new(Decision::Desynced(ResyncReason::CrossedBook))
            } else {
                self.desync(entry, ResyncReason::CrossedBook, None)
            };
            entry.snapshot_requested = false;
            entry.resubscribe_requested = false;
            entry.awaiting_bootstrap = false;
            step.fetch_snapshot = false;
            step.resubscribe = false;
            return step;
        }

        // Keep the previous event time so published times never go backwards.
        ladder.record_event_time(entry.ladder.last_event_time());

        let pending = mem::take(&mut entry.pending);
        let recovered = entry.install(ladder);
        entry.stats.applied += 1;

        let mut replayed = 0;
        let mut pending = pending.into_iter();
        while let Some(delta) = pending.next() {
            // Only deltas provably newer than the snapshot survive it.
            let newer = matches!(
                (base_sequence, delta.last_sequence()),
                (Some(base), Some(end)) if end > base
            );
            if !newer {
                entry.stats.dropped_stale += 1;
                continue;
            }

            let step = self.apply_synced(entry, delta);
            match step.decision {
                Decision::Applied => replayed += 1,
                Decision::Desynced(_) => {
                    for delta in pending {
                        self.buffer(entry, delta);
                    }
                    return step;
                }
                _ => {}
            }
        }

        debug!(
            instrument = %entry.instrument(),
            sequence = ?entry.ladder.last_sequence(),
            replayed,
            "book rebuilt from snapshot"
        );

        let mut step = Step::new(Decision::Bootstrapped { replayed });
        if let Some(reason) = recovered {
            debug!(instrument = %entry.instrument(), %reason, "book recovered");
            step.signal = Some(ResyncSignal::recovered(entry.instrument().clone(), reason));
        }
        step
    }

    /// Accept `start` after `last` unless more than the tolerated number of
    /// updates were skipped
    fn check_gap(&self, last: Sequence, start: Sequence) -> Result<()> {
        let expected = last.saturating_add(1);
        if start > expected.saturating_add(self.profile.gap_tolerance) {
            return Err(Error::SequenceGap {
                expected,
                got: start,
            });
        }
        Ok(())
    }

    fn desync(&self, entry: &mut BookEntry, reason: ResyncReason, trigger: Option<Delta>) -> Step {
        entry.state = SyncState::Desynced;
        entry.pending.clear();
        entry.awaiting_bootstrap = false;
        entry.resync_pending = Some(reason);
        entry.stats.resyncs += 1;

        warn!(instrument = %entry.instrument(), %reason, "book desynchronized");

        let mut step = Step::new(Decision::Desynced(reason));
        step.signal = Some(ResyncSignal::entered(entry.instrument().clone(), reason));

        if self.profile.capabilities.needs_rest_snapshot_bootstrap {
            if let Some(delta) = trigger {
                self.buffer(entry, delta);
            }
            step.fetch_snapshot = self.request_snapshot(entry);
        } else {
            step.resubscribe = self.request_resubscribe(entry);
        }
        step
    }

    fn buffer(&self, entry: &mut BookEntry, delta: Delta) {
        if self.max_buffered == 0 {
            entry.stats.buffer_overflow += 1;
            return;
        }
        while entry.pending.len() >= self.max_buffered {
            entry.pending.pop_front();
            entry.stats.buffer_overflow += 1;
        }
        entry.pending.push_back(delta);
        entry.stats.buffered += 1;
    }

    fn request_resubscribe(&self, entry: &mut BookEntry) -> bool {
        if self.profile.capabilities.needs_rest_snapshot_bootstrap || entry.resubscribe_requested {
            return false;
        }
        entry.resubscribe_requested = true;
        true
    }

    fn request_snapshot(&self, entry: &mut BookEntry) -> bool {
        if !self.profile.capabilities.needs_rest_snapshot_bootstrap || entry.snapshot_requested {
            return false;
        }
        entry.snapshot_requested = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Instrument, LevelChange, Side};
    use rust_decimal_macros::dec;

    fn kucoin() -> Instrument {
        Instrument::new(Venue::Kucoin, "BTC", "USDT")
    }

    fn delta(instrument: &Instrument, seq: Option<u64>, changes: Vec<LevelChange>) -> RawEvent {
        RawEvent::Delta(Delta {
            instrument: instrument.clone(),
            sequence_start: seq,
            sequence_end: seq,
            changes,
            is_snapshot: false,
            timestamp: None,
        })
    }

    fn snapshot(instrument: &Instrument, seq: Option<u64>) -> RawEvent {
        RawEvent::Snapshot(Snapshot {
            instrument: instrument.clone(),
            sequence: seq,
            bids: vec![LevelChange::new(Side::Bid, dec!(100), dec!(1))],
            asks: vec![LevelChange::new(Side::Ask, dec!(101), dec!(1))],
            timestamp: Some(1),
        })
    }

    #[test]
    fn test_first_delta_requests_snapshot_once() {
        let engine = ReconciliationEngine::new(Venue::Kucoin.profile());
        let mut entry = BookEntry::new(kucoin());

        let step = engine.apply(&mut entry, delta(&kucoin(), Some(5), vec![]));
        assert_eq!(step.decision, Decision::Buffered);
        assert!(step.fetch_snapshot);
        assert_eq!(entry.state(), SyncState::AwaitingSnapshot);

        let step = engine.apply(&mut entry, delta(&kucoin(), Some(6), vec![]));
        assert!(!step.fetch_snapshot);
        assert_eq!(entry.pending_len(), 2);

        engine.snapshot_failed(&mut entry);
        let step = engine.apply(&mut entry, delta(&kucoin(), Some(7), vec![]));
        assert!(step.fetch_snapshot);
    }

    #[test]
    fn test_buffer_drops_oldest() {
        let engine = ReconciliationEngine::new(Venue::Kucoin.profile()).with_max_buffered(2);
        let mut entry = BookEntry::new(kucoin());

        for seq in 1..=3 {
            let _ = engine.apply(&mut entry, delta(&kucoin(), Some(seq), vec![]));
        }

        assert_eq!(entry.pending_len(), 2);
        assert_eq!(entry.pending[0].sequence_start, Some(2));
        assert_eq!(entry.stats().buffer_overflow, 1);
    }

    #[test]
    fn test_self_contained_first_delta_bootstraps() {
        let kraken = Instrument::new(Venue::Kraken, "XBT", "USD");
        let engine = ReconciliationEngine::new(Venue::Kraken.profile());
        let mut entry = BookEntry::new(kraken.clone());

        let step = engine.apply(
            &mut entry,
            delta(
                &kraken,
                None,
                vec![
                    LevelChange::new(Side::Bid, dec!(10), dec!(1)),
                    LevelChange::new(Side::Ask, dec!(11), dec!(1)),
                ],
            ),
        );

        assert_eq!(step.decision, Decision::Bootstrapped { replayed: 0 });
        assert_eq!(entry.state(), SyncState::Synced);
        assert_eq!(entry.ladder().num_levels(), (1, 1));
    }

    #[test]
    fn test_trade_passes_through() {
        let engine = ReconciliationEngine::new(Venue::Kucoin.profile());
        let mut entry = BookEntry::new(kucoin());
        let trade = Trade {
            instrument: kucoin(),
            trade_id: None,
            price: dec!(1),
            quantity: dec!(1),
            side: None,
            timestamp: 1,
        };

        let step = engine.apply(&mut entry, RawEvent::Trade(trade.clone()));
        assert_eq!(step.decision, Decision::Trade(trade));
        assert!(!step.emits_book());
        assert_eq!(entry.state(), SyncState::Uninitialized);
    }

    #[test]
    fn test_reset_and_recover() {
        let engine = ReconciliationEngine::new(Venue::Kucoin.profile());
        let mut entry = BookEntry::new(kucoin());
        let _ = engine.apply(&mut entry, snapshot(&kucoin(), Some(10)));

        let signal = engine.reset(&mut entry, ResyncReason::Disconnected);
        assert_eq!(signal.reason, ResyncReason::Disconnected);
        assert!(entry.ladder().is_empty());
        assert_eq!(entry.state(), SyncState::Uninitialized);

        let step = engine.apply(&mut entry, snapshot(&kucoin(), Some(20)));
        let signal = step.signal.unwrap();
        assert_eq!(signal.phase, crate::types::ResyncPhase::Recovered);
        assert_eq!(signal.reason, ResyncReason::Disconnected);
    }

    #[test]
    fn test_reset_clears_resubscribe_request() {
        let kraken = Instrument::new(Venue::Kraken, "XBT", "USD");
        let engine = ReconciliationEngine::new(Venue::Kraken.profile());
        let mut entry = BookEntry::new(kraken.clone());
        let _ = engine.apply(
            &mut entry,
            delta(
                &kraken,
                None,
                vec![
                    LevelChange::new(Side::Bid, dec!(10), dec!(1)),
                    LevelChange::new(Side::Ask, dec!(11), dec!(1)),
                ],
            ),
        );
        let step = engine.apply(
            &mut entry,
            delta(&kraken, None, vec![LevelChange::new(Side::Ask, dec!(9), dec!(1))]),
        );
        assert!(step.resubscribe);
        assert!(entry.resubscribe_requested());

        let _ = engine.reset(&mut entry, ResyncReason::Disconnected);
        assert!(!entry.resubscribe_requested());
        assert_eq!(entry.state(), SyncState::Uninitialized);
    }

    #[test]
    fn test_gap_tolerance_boundary() {
        let profile = Venue::Kucoin.profile().with_gap_tolerance(2);
        let engine = ReconciliationEngine::new(profile);
        let mut entry = BookEntry::new(kucoin());
        let _ = engine.apply(&mut entry, snapshot(&kucoin(), Some(10)));

        // 11 expected, 13 is within a tolerance of 2
        let step = engine.apply(&mut entry, delta(&kucoin(), Some(13), vec![]));
        assert_eq!(step.decision, Decision::Applied);

        // 14 expected, 17 is one past the tolerance
        let step = engine.apply(&mut entry, delta(&kucoin(), Some(17), vec![]));
        assert_eq!(
            step.decision,
            Decision::Desynced(ResyncReason::SequenceGap {
                expected: 14,
                got: 17
            })
        );
    }
}
