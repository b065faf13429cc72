//! Store of order books for many instruments.
//!
//! This module provides [`OrderBookStore`], a thread-safe container that owns
//! one [`BookEntry`] per (venue, instrument).
//!
//! # Design
//!
//! The map itself sits behind a `parking_lot::RwLock` that is only taken to
//! create, remove or look up entries. Each entry has its own
//! `parking_lot::Mutex` in an `Arc`, so one instrument's update never waits
//! on another's, and a lane can hold its entry without holding the map.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::types::{Delta, Instrument, ResyncReason, Venue};

use super::OrderBookLadder;

/// Synchronization state of a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// No snapshot yet
    Uninitialized,
    /// Deltas are buffered until a snapshot arrives
    AwaitingSnapshot,
    /// The ladder tracks the venue and is published
    Synced,
    /// Updates were lost or the book crossed; waiting for a rebuild
    Desynced,
}

impl SyncState {
    /// Whether book updates are published in this state
    pub fn is_synced(self) -> bool {
        self == SyncState::Synced
    }
}

/// Per-book counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookStats {
    /// Snapshots and deltas folded into the ladder
    pub applied: u64,
    /// Deltas at or below the last applied sequence
    pub dropped_stale: u64,
    /// Deltas discarded while desynchronized
    pub dropped_desynced: u64,
    /// Deltas parked while waiting for a snapshot
    pub buffered: u64,
    /// Buffered deltas evicted because the buffer was full
    pub buffer_overflow: u64,
    /// Times the book left the synchronized state
    pub resyncs: u64,
    /// Updates rejected because they crossed the book
    pub crossed: u64,
}

/// Everything tracked for one instrument
///
/// Fields are crate-private; the [`ReconciliationEngine`](super::ReconciliationEngine)
/// is the only writer besides [`OrderBookStore::replace`].
#[derive(Debug, Clone)]
pub struct BookEntry {
    pub(crate) ladder: OrderBookLadder,
    pub(crate) state: SyncState,
    /// Deltas waiting for a snapshot, oldest first
    pub(crate) pending: VecDeque<Delta>,
    /// An out-of-band snapshot fetch is in flight
    pub(crate) snapshot_requested: bool,
    /// The connection was asked to resubscribe the book's channel
    pub(crate) resubscribe_requested: bool,
    /// The transport resubscribed; the next self-contained delta may rebuild
    pub(crate) awaiting_bootstrap: bool,
    /// Reason of the resync in progress, reported once the book recovers
    pub(crate) resync_pending: Option<ResyncReason>,
    pub(crate) stats: BookStats,
}

impl BookEntry {
    /// Create an empty, uninitialized entry
    pub fn new(instrument: Instrument) -> Self {
        Self {
            ladder: OrderBookLadder::new(instrument),
            state: SyncState::Uninitialized,
            pending: VecDeque::new(),
            snapshot_requested: false,
            resubscribe_requested: false,
            awaiting_bootstrap: false,
            resync_pending: None,
            stats: BookStats::default(),
        }
    }

    /// Get the instrument
    pub fn instrument(&self) -> &Instrument {
        self.ladder.instrument()
    }

    /// Get the ladder
    pub fn ladder(&self) -> &OrderBookLadder {
        &self.ladder
    }

    /// Get the synchronization state
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Get the counters
    pub fn stats(&self) -> BookStats {
        self.stats
    }

    /// Number of deltas waiting for a snapshot
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether an out-of-band snapshot fetch is outstanding
    pub fn snapshot_requested(&self) -> bool {
        self.snapshot_requested
    }

    /// Whether a resubscription was requested and not yet performed
    pub fn resubscribe_requested(&self) -> bool {
        self.resubscribe_requested
    }

    /// Install an authoritative ladder and mark the entry synchronized.
    ///
    /// Returns the reason of the resync this ends, if one was in progress.
    pub(crate) fn install(&mut self, ladder: OrderBookLadder) -> Option<ResyncReason> {
        self.ladder = ladder;
        self.state = SyncState::Synced;
        self.pending.clear();
        self.snapshot_requested = false;
        self.resubscribe_requested = false;
        self.awaiting_bootstrap = false;
        self.resync_pending.take()
    }
}

/// Shared handle to one entry
pub type SharedEntry = Arc<Mutex<BookEntry>>;

/// Store of books for many instruments.
///
/// # Thread Safety
///
/// The store is safe to share across threads via `Arc<OrderBookStore>`.
///
/// # Example
///
/// ```rust
/// use venue_feed::orderbook::{OrderBookStore, SyncState};
/// use venue_feed::types::{Instrument, Venue};
///
/// let store = OrderBookStore::new();
/// let instrument = Instrument::new(Venue::Kucoin, "BTC", "USDT");
///
/// store.get_or_create(&instrument);
/// assert_eq!(store.state(&instrument), Some(SyncState::Uninitialized));
/// assert_eq!(store.instruments_needing_resync(), vec![instrument]);
/// ```
#[derive(Debug, Default)]
pub struct OrderBookStore {
    /// Entries by instrument
    books: RwLock<FxHashMap<Instrument, SharedEntry>>,
}

impl OrderBookStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry for an instrument, creating an uninitialized one on miss
    pub fn get_or_create(&self, instrument: &Instrument) -> SharedEntry {
        if let Some(entry) = self.books.read().get(instrument) {
            return Arc::clone(entry);
        }

        let mut books = self.books.write();
        Arc::clone(
            books
                .entry(instrument.clone())
                .or_insert_with(|| Arc::new(Mutex::new(BookEntry::new(instrument.clone())))),
        )
    }

    /// Get the entry for an instrument
    pub fn get(&self, instrument: &Instrument) -> Option<SharedEntry> {
        self.books.read().get(instrument).cloned()
    }

    /// Install an authoritative ladder and mark the book synchronized
    pub fn replace(&self, instrument: &Instrument, ladder: OrderBookLadder) {
        let entry = self.get_or_create(instrument);
        let _ = entry.lock().install(ladder);
    }

    /// Remove an instrument's entry
    pub fn remove(&self, instrument: &Instrument) -> bool {
        self.books.write().remove(instrument).is_some()
    }

    /// Remove every entry of a venue, returning the removed instruments
    pub fn remove_venue(&self, venue: Venue) -> Vec<Instrument> {
        let mut books = self.books.write();
        let removed: Vec<Instrument> = books
            .keys()
            .filter(|instrument| instrument.venue == venue)
            .cloned()
            .collect();
        for instrument in &removed {
            books.remove(instrument);
        }
        removed
    }

    /// Get a copy of an instrument's ladder
    ///
    /// The copy is safe to read without holding locks.
    pub fn ladder(&self, instrument: &Instrument) -> Option<OrderBookLadder> {
        self.get(instrument).map(|e| e.lock().ladder.clone())
    }

    /// Get the state of a book
    pub fn state(&self, instrument: &Instrument) -> Option<SyncState> {
        self.get(instrument).map(|e| e.lock().state)
    }

    /// Get the counters of a book
    pub fn stats(&self, instrument: &Instrument) -> Option<BookStats> {
        self.get(instrument).map(|e| e.lock().stats)
    }

    /// Get all tracked instruments, sorted
    pub fn instruments(&self) -> Vec<Instrument> {
        let mut instruments: Vec<Instrument> = self.books.read().keys().cloned().collect();
        instruments.sort();
        instruments
    }

    /// Get all instruments whose book is not synchronized, sorted
    pub fn instruments_needing_resync(&self) -> Vec<Instrument> {
        let entries: Vec<(Instrument, SharedEntry)> = self
            .books
            .read()
            .iter()
            .map(|(instrument, entry)| (instrument.clone(), Arc::clone(entry)))
            .collect();

        let mut instruments: Vec<Instrument> = entries
            .into_iter()
            .filter(|(_, entry)| !entry.lock().state.is_synced())
            .map(|(instrument, _)| instrument)
            .collect();
        instruments.sort();
        instruments
    }

    /// Get number of tracked instruments
    pub fn len(&self) -> usize {
        self.books.read().len()
    }

    /// Check if the store has no instruments
    pub fn is_empty(&self) -> bool {
        self.books.read().is_empty()
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.books.write().clear();
    }
}
