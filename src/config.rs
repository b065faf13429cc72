//! Configuration for the feed pipeline.
//!
//! This module provides the [`FeedConfig`] struct for the knobs that bound
//! memory use and decide when an instrument is resynchronized.

use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::types::{Venue, VenueProfile};

/// Configuration for a [`FeedSession`](crate::feed::FeedSession)
///
/// # Example
///
/// ```rust
/// use venue_feed::config::FeedConfig;
/// use venue_feed::types::Venue;
///
/// let config = FeedConfig::new()
///     .with_queue_capacity(16)
///     .with_gap_tolerance(Venue::Kucoin, 2);
///
/// assert_eq!(config.profile_for(Venue::Kucoin).gap_tolerance, 2);
/// ```
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Capacity of each instrument's output queue
    queue_capacity: usize,

    /// Deltas kept per instrument while waiting for a snapshot
    max_buffered_deltas: usize,

    /// Per-venue overrides of the registry's gap tolerance
    gap_tolerance: FxHashMap<Venue, u64>,

    /// Timeout for REST snapshot requests
    snapshot_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_buffered_deltas: 10_000,
            gap_tolerance: FxHashMap::default(),
            snapshot_timeout: Duration::from_secs(10),
        }
    }
}

impl FeedConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity of each instrument's output queue.
    ///
    /// When a consumer falls behind, the oldest queued items are dropped.
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set how many deltas are buffered per instrument while a snapshot is pending
    #[must_use]
    pub fn with_max_buffered_deltas(mut self, max: usize) -> Self {
        self.max_buffered_deltas = max;
        self
    }

    /// Override the gap tolerance for one venue
    #[must_use]
    pub fn with_gap_tolerance(mut self, venue: Venue, tolerance: u64) -> Self {
        self.gap_tolerance.insert(venue, tolerance);
        self
    }

    /// Set the REST snapshot request timeout
    #[must_use]
    pub fn with_snapshot_timeout(mut self, timeout: Duration) -> Self {
        self.snapshot_timeout = timeout;
        self
    }

    /// Get the output queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Get the delta buffer bound
    pub fn max_buffered_deltas(&self) -> usize {
        self.max_buffered_deltas
    }

    /// Get the effective gap tolerance for a venue
    pub fn gap_tolerance(&self, venue: Venue) -> u64 {
        self.gap_tolerance
            .get(&venue)
            .copied()
            .unwrap_or_else(|| venue.profile().gap_tolerance)
    }

    /// Get the REST snapshot timeout
    pub fn snapshot_timeout(&self) -> Duration {
        self.snapshot_timeout
    }

    /// Registry profile for a venue with this configuration's overrides applied
    pub fn profile_for(&self, venue: Venue) -> VenueProfile {
        venue.profile().with_gap_tolerance(self.gap_tolerance(venue))
    }
}
