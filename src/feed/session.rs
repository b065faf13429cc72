//! Per-instrument lanes feeding per-instrument output queues.
//!
//! Every subscribed instrument gets a lane: a tokio task with an inbound
//! channel, its store entry, its [`Emitter`] and a bounded [`LatestQueue`]
//! for the consumer. Events of one instrument are processed strictly in
//! arrival order; different instruments never wait on each other, and a slow
//! consumer only loses its own oldest items.
//!
//! Disconnects, resubscriptions and out-of-band snapshot replies travel
//! through the same channel as market events, so they are ordered with them.
//!
//! A desynchronized book on a venue without REST snapshots cannot heal on
//! its own. Its lane posts the instrument on the venue's resubscribe channel
//! ([`FeedSession::resubscribe_requests`]); the connection task resubscribes
//! it and reports back with [`FeedSession::instrument_resubscribed`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::FeedConfig;
use crate::emitter::Emitter;
use crate::error::Error;
use crate::normalizer::Normalizer;
use crate::orderbook::{
    Decision, OrderBookLadder, OrderBookStore, ReconciliationEngine, SharedEntry,
};
use crate::types::{
    AdapterMessage, FeedOutput, Instrument, RawEvent, ResyncReason, Snapshot, Venue,
};
use crate::Result;

use super::queue::LatestQueue;

/// Source of out-of-band snapshots for venues that only stream deltas
///
/// `request` must not block; implementations start the fetch and answer
/// through the [`SnapshotReply`] later.
pub trait SnapshotSource: Send + Sync + 'static {
    /// Start fetching a snapshot for `instrument`
    fn request(&self, instrument: &Instrument, reply: SnapshotReply);
}

#[derive(Debug)]
enum LaneCommand {
    Event(RawEvent),
    Reset(ResyncReason),
    Resubscribed,
    SnapshotFailed,
}

/// Handle for answering one snapshot request
///
/// The answer is queued behind the events the lane already received.
#[derive(Debug, Clone)]
pub struct SnapshotReply {
    instrument: Instrument,
    tx: mpsc::UnboundedSender<LaneCommand>,
}

impl SnapshotReply {
    /// Instrument the snapshot was requested for
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Hand the fetched snapshot to the lane
    ///
    /// Returns `false` if the instrument was unsubscribed meanwhile.
    pub fn deliver(self, snapshot: Snapshot) -> bool {
        self.tx
            .send(LaneCommand::Event(RawEvent::Snapshot(snapshot)))
            .is_ok()
    }

    /// Report a failed fetch so a later delta can request another one
    pub fn failed(self, error: &Error) -> bool {
        warn!(instrument = %self.instrument, %error, "snapshot fetch failed");
        self.tx.send(LaneCommand::SnapshotFailed).is_ok()
    }
}

/// Receiving end of one instrument's output
#[derive(Debug, Clone)]
pub struct InstrumentStream {
    instrument: Instrument,
    queue: Arc<LatestQueue<FeedOutput>>,
}

impl InstrumentStream {
    /// Instrument this stream belongs to
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Wait for the next output
    ///
    /// Returns `None` once the instrument is unsubscribed and the queue drained.
    pub async fn recv(&self) -> Option<FeedOutput> {
        self.queue.recv().await
    }

    /// Take the next output without waiting
    pub fn try_recv(&self) -> Option<FeedOutput> {
        self.queue.try_recv()
    }

    /// Outputs evicted because this consumer fell behind
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Number of outputs waiting
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no output is waiting
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

struct Lane {
    tx: mpsc::UnboundedSender<LaneCommand>,
    queue: Arc<LatestQueue<FeedOutput>>,
    task: JoinHandle<()>,
}

/// Resubscribe request senders, one per venue connection
type Resubscribers = Arc<RwLock<FxHashMap<Venue, mpsc::UnboundedSender<Instrument>>>>;

struct SessionInner {
    config: FeedConfig,
    store: Arc<OrderBookStore>,
    normalizer: Normalizer,
    snapshots: Option<Arc<dyn SnapshotSource>>,
    lanes: RwLock<FxHashMap<Instrument, Lane>>,
    resubscribers: Resubscribers,
    decode_errors: AtomicU64,
    unrouted: AtomicU64,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        for (_, lane) in self.lanes.get_mut().drain() {
            lane.task.abort();
            lane.queue.close();
        }
    }
}

/// Entry point of the feed core.
///
/// Cloning is cheap; clones share the same lanes and store. Lanes are tokio
/// tasks, so [`subscribe`](Self::subscribe) must run inside a runtime.
///
/// # Example
///
/// ```rust
/// use venue_feed::config::FeedConfig;
/// use venue_feed::feed::FeedSession;
/// use venue_feed::types::{FeedOutput, Instrument, Venue};
///
/// # #[tokio::main]
/// # async fn main() {
/// let session = FeedSession::new(FeedConfig::new());
/// let stream = session.subscribe(Instrument::new(Venue::Upbit, "BTC", "KRW"));
///
/// session.ingest_payload(r#"{"type":"snapshot","venue":"UPBIT","symbol":"BTC-KRW",
///     "bids":[{"price":"100","quantity":"1"}],"asks":[{"price":"101","quantity":"2"}]}"#);
///
/// match stream.recv().await {
///     Some(FeedOutput::Book(book)) => assert_eq!(book.bids.len(), 1),
///     other => panic!("unexpected {:?}", other),
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct FeedSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for FeedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedSession")
            .field("lanes", &self.inner.lanes.read().len())
            .field("has_snapshot_source", &self.inner.snapshots.is_some())
            .field("decode_errors", &self.decode_errors())
            .field("unrouted", &self.unrouted())
            .finish()
    }
}

impl FeedSession {
    /// Create a session without an out-of-band snapshot source
    pub fn new(config: FeedConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a session that fetches bootstrap snapshots from `source`
    pub fn with_snapshot_source(config: FeedConfig, source: Arc<dyn SnapshotSource>) -> Self {
        Self::build(config, Some(source))
    }

    fn build(config: FeedConfig, snapshots: Option<Arc<dyn SnapshotSource>>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config,
                store: Arc::new(OrderBookStore::new()),
                normalizer: Normalizer::new(),
                snapshots,
                lanes: RwLock::new(FxHashMap::default()),
                resubscribers: Arc::new(RwLock::new(FxHashMap::default())),
                decode_errors: AtomicU64::new(0),
                unrouted: AtomicU64::new(0),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &FeedConfig {
        &self.inner.config
    }

    /// Get the shared book store
    pub fn store(&self) -> &Arc<OrderBookStore> {
        &self.inner.store
    }

    /// Start a lane for an instrument and return its output stream.
    ///
    /// Subscribing an instrument twice returns a second handle on the same
    /// queue.
    pub fn subscribe(&self, instrument: Instrument) -> InstrumentStream {
        let mut lanes = self.inner.lanes.write();
        if let Some(lane) = lanes.get(&instrument) {
            return InstrumentStream {
                instrument,
                queue: Arc::clone(&lane.queue),
            };
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(LatestQueue::new(self.inner.config.queue_capacity()));
        let worker = LaneWorker {
            engine: ReconciliationEngine::from_config(&self.inner.config, instrument.venue),
            entry: self.inner.store.get_or_create(&instrument),
            emitter: Emitter::new(instrument.clone()),
            snapshots: self.inner.snapshots.clone(),
            resubscribers: Arc::clone(&self.inner.resubscribers),
            tx: tx.clone(),
        };
        let task = tokio::spawn(run_lane(worker, rx, Arc::clone(&queue)));

        info!(%instrument, "subscribed");
        lanes.insert(
            instrument.clone(),
            Lane {
                tx,
                queue: Arc::clone(&queue),
                task,
            },
        );

        InstrumentStream { instrument, queue }
    }

    /// Stop an instrument's lane, drop its book and close its stream.
    ///
    /// Returns `false` if the instrument was not subscribed.
    pub fn unsubscribe(&self, instrument: &Instrument) -> bool {
        let Some(lane) = self.inner.lanes.write().remove(instrument) else {
            return false;
        };
        lane.task.abort();
        lane.queue.close();
        self.inner.store.remove(instrument);
        info!(%instrument, "unsubscribed");
        true
    }

    /// Instruments with a running lane, sorted
    pub fn subscriptions(&self) -> Vec<Instrument> {
        let mut instruments: Vec<Instrument> = self.inner.lanes.read().keys().cloned().collect();
        instruments.sort();
        instruments
    }

    /// Copy of a subscribed instrument's ladder.
    ///
    /// Returns `Ok(None)` while the book is not synchronized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSubscribed`] if the instrument has no lane.
    pub fn book(&self, instrument: &Instrument) -> Result<Option<OrderBookLadder>> {
        if !self.inner.lanes.read().contains_key(instrument) {
            return Err(Error::NotSubscribed(instrument.clone()));
        }
        Ok(self.inner.store.get(instrument).and_then(|entry| {
            let entry = entry.lock();
            entry.state().is_synced().then(|| entry.ladder().clone())
        }))
    }

    /// Normalize and route one adapter message.
    ///
    /// Returns `true` if the message reached a lane. Malformed messages are
    /// logged and counted in [`decode_errors`](Self::decode_errors).
    pub fn ingest(&self, message: AdapterMessage) -> bool {
        let venue = message.venue();
        match self.inner.normalizer.normalize(message) {
            Ok(Some(event)) => self.ingest_event(event),
            Ok(None) => false,
            Err(error) => {
                self.record_decode_error(Some(venue), &error);
                false
            }
        }
    }

    /// Normalize and route the JSON text of one adapter message
    pub fn ingest_payload(&self, payload: &str) -> bool {
        match self.inner.normalizer.normalize_payload(payload) {
            Ok(Some(event)) => self.ingest_event(event),
            Ok(None) => false,
            Err(error) => {
                self.record_decode_error(None, &error);
                false
            }
        }
    }

    /// Route a canonical event to its instrument's lane.
    ///
    /// Events for instruments without a lane are dropped and counted in
    /// [`unrouted`](Self::unrouted).
    pub fn ingest_event(&self, event: RawEvent) -> bool {
        let sent = self
            .inner
            .lanes
            .read()
            .get(event.instrument())
            .map(|lane| lane.tx.clone());

        match sent {
            Some(tx) => tx.send(LaneCommand::Event(event)).is_ok(),
            None => {
                self.inner.unrouted.fetch_add(1, Ordering::Relaxed);
                trace!(instrument = %event.instrument(), kind = event.kind(), "event for unsubscribed instrument dropped");
                false
            }
        }
    }

    /// The venue's connection dropped: reset every book of that venue
    pub fn disconnect(&self, venue: Venue) {
        let count = self.broadcast(venue, || LaneCommand::Reset(ResyncReason::Disconnected));
        warn!(%venue, books = count, "venue disconnected");
    }

    /// The venue's connection is back and its channels were resubscribed
    pub fn resubscribed(&self, venue: Venue) {
        let count = self.broadcast(venue, || LaneCommand::Resubscribed);
        debug!(%venue, books = count, "venue resubscribed");
    }

    /// Take the resubscribe requests of a venue.
    ///
    /// The venue's connection task owns the receiver: each item is an
    /// instrument whose book desynchronized and needs its channel
    /// resubscribed. Calling this again replaces the previous receiver.
    pub fn resubscribe_requests(&self, venue: Venue) -> mpsc::UnboundedReceiver<Instrument> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.resubscribers.write().insert(venue, tx);
        rx
    }

    /// One instrument's channel was resubscribed
    ///
    /// Returns `false` if the instrument has no lane.
    pub fn instrument_resubscribed(&self, instrument: &Instrument) -> bool {
        let tx = self
            .inner
            .lanes
            .read()
            .get(instrument)
            .map(|lane| lane.tx.clone());
        match tx {
            Some(tx) => tx.send(LaneCommand::Resubscribed).is_ok(),
            None => false,
        }
    }

    /// Record a frame that could not be decoded
    pub fn record_decode_error(&self, venue: Option<Venue>, error: &Error) {
        self.inner.decode_errors.fetch_add(1, Ordering::Relaxed);
        match venue {
            Some(venue) => warn!(%venue, %error, "dropping malformed message"),
            None => warn!(%error, "dropping malformed message"),
        }
    }

    /// Messages dropped because they could not be decoded
    pub fn decode_errors(&self) -> u64 {
        self.inner.decode_errors.load(Ordering::Relaxed)
    }

    /// Events dropped because their instrument had no lane
    pub fn unrouted(&self) -> u64 {
        self.inner.unrouted.load(Ordering::Relaxed)
    }

    fn broadcast(&self, venue: Venue, command: impl Fn() -> LaneCommand) -> usize {
        let senders: Vec<mpsc::UnboundedSender<LaneCommand>> = self
            .inner
            .lanes
            .read()
            .iter()
            .filter(|(instrument, _)| instrument.venue == venue)
            .map(|(_, lane)| lane.tx.clone())
            .collect();

        senders
            .into_iter()
            .filter(|tx| tx.send(command()).is_ok())
            .count()
    }
}

/// State owned by one lane task
struct LaneWorker {
    engine: ReconciliationEngine,
    entry: SharedEntry,
    emitter: Emitter,
    snapshots: Option<Arc<dyn SnapshotSource>>,
    resubscribers: Resubscribers,
    tx: mpsc::UnboundedSender<LaneCommand>,
}

impl LaneWorker {
    /// Process one command, pushing outputs in order
    fn handle(&mut self, command: LaneCommand, queue: &LatestQueue<FeedOutput>) {
        let step = {
            let mut entry = self.entry.lock();
            match command {
                LaneCommand::Event(event) => {
                    let step = self.engine.apply(&mut entry, event);
                    if let Some(signal) = step.signal.clone() {
                        queue.push(FeedOutput::Resync(signal));
                    }
                    if step.emits_book() {
                        queue.push(FeedOutput::Book(self.emitter.emit_book(entry.ladder())));
                    }
                    step
                }
                LaneCommand::Reset(reason) => {
                    let signal = self.engine.reset(&mut entry, reason);
                    queue.push(FeedOutput::Resync(signal));
                    return;
                }
                LaneCommand::Resubscribed => {
                    self.engine.resubscribed(&mut entry);
                    return;
                }
                LaneCommand::SnapshotFailed => {
                    self.engine.snapshot_failed(&mut entry);
                    return;
                }
            }
        };

        if let Decision::Trade(trade) = step.decision {
            queue.push(FeedOutput::Tick(self.emitter.emit_trade(trade)));
        }

        if step.fetch_snapshot {
            let instrument = self.emitter.instrument().clone();
            match &self.snapshots {
                Some(source) => {
                    debug!(%instrument, "requesting snapshot");
                    let reply = SnapshotReply {
                        instrument: instrument.clone(),
                        tx: self.tx.clone(),
                    };
                    source.request(&instrument, reply);
                }
                None => warn!(%instrument, "book needs a snapshot but no snapshot source is configured"),
            }
        }

        if step.resubscribe {
            self.request_resubscribe();
        }
    }

    fn request_resubscribe(&self) {
        let instrument = self.emitter.instrument();
        let tx = self.resubscribers.read().get(&instrument.venue).cloned();
        match tx {
            Some(tx) if tx.send(instrument.clone()).is_ok() => {
                debug!(%instrument, "requesting resubscription");
            }
            _ => warn!(%instrument, "book needs a resubscription but no connection is listening"),
        }
    }
}

async fn run_lane(
    mut worker: LaneWorker,
    mut rx: mpsc::UnboundedReceiver<LaneCommand>,
    queue: Arc<LatestQueue<FeedOutput>>,
) {
    let instrument = worker.emitter.instrument().clone();
    debug!(%instrument, "lane started");

    while let Some(command) = rx.recv().await {
        worker.handle(command, &queue);
    }

    debug!(%instrument, "lane stopped");
}
