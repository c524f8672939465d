//! In-memory caching primitives.
//!
//! - `CacheStore`: TTL-keyed values, lazily expired and periodically swept
//! - `PendingRequestTracker`: one in-flight fetch per key, joinable by others
//! - `StatsCollector`: hit/miss counters for diagnostics
//!
//! None of these do I/O. The orchestration that ties them to a transport
//! lives in [`crate::resource`].

pub mod pending;
pub mod stats;
pub mod store;

pub use pending::{
    Claim, JoinOutcome, JoinStatus, PendingJoin, PendingMarker, PendingRequestTracker,
    Registration, DEFAULT_PENDING_TIMEOUT,
};
pub use stats::{StatsCollector, StatsSnapshot};
pub use store::{CacheEntry, CacheStore, DEFAULT_SOFT_CAPACITY};
