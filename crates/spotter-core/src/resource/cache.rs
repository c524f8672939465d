//! Process-wide resource cache.
//!
//! `ResourceCache` owns the shared state (store, in-flight tracker, stats)
//! and runs the access path for every [`ResourceHandle`]:
//!
//! 1. valid cache entry → hit
//! 2. fetch already in flight → join it and take its outcome
//! 3. otherwise become the fetcher: retry driver → store → publish
//!
//! It is shared by `Arc`; nothing here is a global.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{
    CacheStore, Claim, JoinOutcome, PendingRequestTracker, StatsCollector,
    DEFAULT_PENDING_TIMEOUT, DEFAULT_SOFT_CAPACITY,
};
use crate::error::FetchError;

use super::descriptor::{ResourceDescriptor, ResourceRegistry};
use super::handle::ResourceHandle;
use super::retry::{RetryDriver, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};

/// A cached payload. Shared, so joiners and hits never copy the JSON.
pub type Payload = Arc<Value>;

/// Outcome published from the fetcher to every joiner.
pub type Outcome = Result<Payload, FetchError>;

/// How often expired entries are swept.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How long a joiner waits for somebody else's fetch.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub soft_capacity: usize,
    pub sweep_interval: Duration,
    pub pending_timeout: Duration,
    pub join_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            soft_capacity: DEFAULT_SOFT_CAPACITY,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            pending_timeout: DEFAULT_PENDING_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Diagnostics read by the developer panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub requests: u64,
    pub hit_rate: f64,
    pub total_entries: usize,
    pub pending_requests: usize,
}

pub struct ResourceCache {
    registry: ResourceRegistry,
    store: CacheStore<Payload>,
    pending: PendingRequestTracker<Outcome>,
    stats: StatsCollector,
    retry: RetryDriver,
    settings: CacheSettings,
}

impl ResourceCache {
    pub fn new(registry: ResourceRegistry, settings: CacheSettings) -> Arc<Self> {
        info!(
            resources = registry.len(),
            sweep_interval_secs = settings.sweep_interval.as_secs(),
            "Resource cache created"
        );
        Arc::new(Self {
            registry,
            store: CacheStore::new(settings.soft_capacity),
            pending: PendingRequestTracker::new(settings.pending_timeout),
            stats: StatsCollector::new(),
            retry: RetryDriver::new(settings.max_retries, settings.retry_delay),
            settings,
        })
    }

    /// A caller-scoped handle for `key`. Dropping the handle cancels its work.
    pub fn resource(self: &Arc<Self>, key: &str) -> Result<ResourceHandle, FetchError> {
        let descriptor = self
            .registry
            .get(key)
            .ok_or_else(|| FetchError::UnknownResource(key.to_string()))?;
        Ok(ResourceHandle::new(Arc::clone(self), descriptor))
    }

    /// One-shot access through a temporary handle.
    pub async fn fetch(self: &Arc<Self>, key: &str) -> Result<Payload, FetchError> {
        self.resource(key)?.load().await
    }

    pub(crate) async fn access(
        &self,
        descriptor: &ResourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Payload, FetchError> {
        let key = descriptor.key();
        if let Some(value) = self.store.get(key) {
            self.stats.record_hit();
            debug!(key = %key, "Cache hit");
            return Ok(value);
        }

        // Misses are counted once the access settles so an aborted access
        // leaves the counters untouched.
        let result = self.resolve_miss(descriptor, cancel).await;
        if !result.as_ref().is_err_and(FetchError::is_aborted) {
            self.stats.record_miss();
        }
        result
    }

    async fn resolve_miss(
        &self,
        descriptor: &ResourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Payload, FetchError> {
        let key = descriptor.key();
        loop {
            let registration = match self.pending.join_or_register(key) {
                Claim::Registered(registration) => registration,
                Claim::Joined(join) => {
                    debug!(key = %key, "Joining in-flight fetch");
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(FetchError::Aborted),
                        outcome = join.wait(self.settings.join_timeout) => outcome,
                    };
                    match outcome {
                        JoinOutcome::Settled(result) => return result,
                        JoinOutcome::Abandoned => {
                            if let Some(value) = self.store.get(key) {
                                return Ok(value);
                            }
                            debug!(key = %key, "In-flight fetch was abandoned, retrying access");
                            continue;
                        }
                        JoinOutcome::TimedOut => {
                            return self
                                .store
                                .get(key)
                                .ok_or(FetchError::JoinTimeout(self.settings.join_timeout));
                        }
                    }
                }
            };

            // A fetch may have completed between the cache check and registration.
            if let Some(value) = self.store.get(key) {
                registration.settle(Ok(Arc::clone(&value)));
                return Ok(value);
            }

            let result = self.retry.fetch(descriptor, cancel).await.map(Arc::new);
            match &result {
                Ok(value) => {
                    // Only the fetcher that still owns the marker may write. One
                    // that outlived the pending timeout was replaced and only
                    // answers its own joiners.
                    let stored = registration
                        .commit(|| self.store.set(key, Arc::clone(value), descriptor.ttl()));
                    if stored {
                        debug!(key = %key, ttl_ms = descriptor.ttl().as_millis() as u64, "Cached fetched resource");
                    } else {
                        warn!(key = %key, "Fetch finished after its marker was replaced, result not cached");
                    }
                    registration.settle(result.clone());
                }
                // Joiners see the registration drop and retry on their own.
                Err(FetchError::Aborted) => {
                    debug!(key = %key, "Fetch aborted by caller");
                    drop(registration);
                }
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to fetch resource");
                    registration.settle(result.clone());
                }
            }
            return result;
        }
    }

    pub fn stats(&self) -> CacheStats {
        let snapshot = self.stats.snapshot();
        CacheStats {
            hits: snapshot.hits,
            misses: snapshot.misses,
            requests: snapshot.requests,
            hit_rate: snapshot.hit_rate,
            total_entries: self.store.len(),
            pending_requests: self.pending.len(),
        }
    }

    /// Drop every entry and reset the counters. In-flight fetches keep their
    /// markers and will still write their results.
    pub fn clear(&self) {
        self.store.clear();
        self.stats.reset();
        info!("Resource cache cleared");
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.store.invalidate(key)
    }

    pub fn sweep(&self) -> usize {
        self.store.sweep(Instant::now())
    }

    /// Sweep expired entries every `sweep_interval` until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let mut period = self.settings.sweep_interval;
        if period.is_zero() {
            warn!(
                default_secs = DEFAULT_SWEEP_INTERVAL.as_secs(),
                "Sweep interval must be non-zero, using the default"
            );
            period = DEFAULT_SWEEP_INTERVAL;
        }
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Cache sweeper stopping");
                        return;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        debug!(removed = removed, remaining = cache.store.len(), "Periodic sweep");
                    }
                }
            }
        })
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &CacheStore<Payload> {
        &self.store
    }

    pub fn pending(&self) -> &PendingRequestTracker<Outcome> {
        &self.pending
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }
}
