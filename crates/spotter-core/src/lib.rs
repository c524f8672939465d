//! Spotter core - client-side resource cache for the gym API.
//!
//! Provides the TTL cache, single-flight request coalescing, retrying
//! transport driver, and hit/miss statistics used by every screen that
//! reads from the backend.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use spotter_core::{Config, ResourceCache};
//!
//! let config = Config::load()?;
//! let api = config.api_client()?;
//! let cache = ResourceCache::new(config.registry(&api), config.cache.settings());
//!
//! let plans = cache.fetch("plans").await?;
//! println!("{plans}");
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod resource;

pub use api::{ApiClient, ApiError, TransportMethod};
pub use cache::{CacheEntry, CacheStore, PendingRequestTracker, StatsCollector, StatsSnapshot};
pub use config::{CacheConfig, Config, ResourceConfig};
pub use error::{FetchError, TransportError};
pub use resource::{
    transport_fn, CacheSettings, CacheStats, LoadState, Payload, RawResult, ResourceCache,
    ResourceDescriptor, ResourceHandle, ResourceRegistry, RetryDriver, TransportFn,
};
