//! Runtime plumbing around the reconciliation core.
//!
//! This module contains:
//!
//! - [`session`] - per-instrument lanes and routing
//! - [`queue`] - drop-oldest output queue
//! - [`snapshot`] - REST depth snapshots for delta-only venues
//! - [`transport`] - reconnecting WebSocket connection task

pub mod queue;
pub mod session;
pub mod snapshot;
pub mod transport;

pub use queue::LatestQueue;
pub use session::{FeedSession, InstrumentStream, SnapshotReply, SnapshotSource};
pub use snapshot::RestSnapshotSource;
pub use transport::{run_connection, ReconnectConfig, VenueConnection};
