//! Resource access: descriptors, the retrying fetch driver, and the shared
//! cache that coalesces concurrent requests.
//!
//! Callers obtain a [`ResourceHandle`] from a [`ResourceCache`] and call
//! `load`/`reload` on it. Each resource key has at most one fetch in flight;
//! everyone else asking for it in the meantime shares that fetch's outcome.

pub mod cache;
pub mod descriptor;
pub mod handle;
pub mod retry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{
    CacheSettings, CacheStats, Payload, ResourceCache, DEFAULT_JOIN_TIMEOUT, DEFAULT_SWEEP_INTERVAL,
};
pub use descriptor::{ResourceDescriptor, ResourceRegistry};
pub use handle::{ErrorCallback, LoadState, ResourceHandle, SuccessCallback};
pub use retry::{RetryDriver, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
pub use transport::{transport_fn, RawResult, TransportFn};
