use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    hits: u64,
    misses: u64,
    requests: u64,
}

/// Hit/miss counters. All three move under one lock so a snapshot always
/// satisfies `hits + misses == requests`.
#[derive(Debug, Default)]
pub struct StatsCollector {
    counters: Mutex<Counters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub requests: u64,
    pub hit_rate: f64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_hit(&self) {
        let mut counters = self.lock();
        counters.hits += 1;
        counters.requests += 1;
    }

    pub fn record_miss(&self) {
        let mut counters = self.lock();
        counters.misses += 1;
        counters.requests += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = *self.lock();
        let hit_rate = if counters.requests == 0 {
            0.0
        } else {
            counters.hits as f64 / counters.requests as f64
        };
        StatsSnapshot {
            hits: counters.hits,
            misses: counters.misses,
            requests: counters.requests,
            hit_rate,
        }
    }

    /// Only called when the whole cache is cleared.
    pub fn reset(&self) {
        *self.lock() = Counters::default();
    }
}
