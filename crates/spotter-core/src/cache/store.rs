use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Soft upper bound on the number of entries.
/// Exceeding it is logged; nothing is evicted before its TTL runs out.
pub const DEFAULT_SOFT_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub stored_at: Instant,
    /// Wall-clock time of the write, for display only.
    pub cached_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn new(key: impl Into<String>, value: V, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value,
            stored_at: Instant::now(),
            cached_at: Utc::now(),
            ttl,
        }
    }

    pub fn expires_at(&self) -> Instant {
        self.stored_at + self.ttl
    }

    /// Valid iff `now - stored_at < ttl`.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }

    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.stored_at)
    }

    pub fn age_display(&self) -> String {
        let minutes = (self.age().as_secs() / 60) as i64;
        if minutes < 1 {
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        }
    }
}

/// TTL-keyed store of fetched values.
///
/// Reads are pure projections: a `get` never refreshes an entry's lifetime.
/// Expired entries are hidden from `get` immediately and physically removed
/// by [`CacheStore::sweep`].
pub struct CacheStore<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    soft_capacity: usize,
}

impl<V: Clone> CacheStore<V> {
    pub fn new(soft_capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            soft_capacity,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.read()
            .get(key)
            .filter(|entry| entry.is_valid_at(now))
            .map(|entry| entry.value.clone())
    }

    /// Full entry (including metadata) if still valid.
    pub fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let now = Instant::now();
        self.read()
            .get(key)
            .filter(|entry| entry.is_valid_at(now))
            .cloned()
    }

    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let mut entries = self.write();
        entries.insert(key.to_string(), CacheEntry::new(key, value, ttl));
        if entries.len() > self.soft_capacity {
            warn!(
                entries = entries.len(),
                soft_capacity = self.soft_capacity,
                "Cache is over its soft capacity"
            );
        }
    }

    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.write().remove(key).is_some();
        if removed {
            debug!(key = key, "Cache entry invalidated");
        }
        removed
    }

    /// Remove every entry with `stored_at + ttl <= now`. Returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid_at(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed = removed, remaining = entries.len(), "Swept expired cache entries");
        }
        removed
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of stored entries, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl<V: Clone> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new(DEFAULT_SOFT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_exactly_at_ttl() {
        let store = CacheStore::default();
        store.set("plans", 7, Duration::from_millis(500));

        advance(Duration::from_millis(499)).await;
        assert_eq!(store.get("plans"), Some(7));

        advance(Duration::from_millis(2)).await;
        assert_eq!(store.get("plans"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_does_not_extend_lifetime() {
        let store = CacheStore::default();
        store.set("config", "v1", Duration::from_secs(10));

        for _ in 0..9 {
            advance(Duration::from_secs(1)).await;
            assert_eq!(store.get("config"), Some("v1"));
        }
        advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("config"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_and_resets_age() {
        let store = CacheStore::default();
        store.set("products", 1, Duration::from_secs(10));
        advance(Duration::from_secs(8)).await;

        store.set("products", 2, Duration::from_secs(10));
        advance(Duration::from_secs(8)).await;

        assert_eq!(store.get("products"), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let store = CacheStore::default();
        store.set("a", "expired", Duration::from_secs(1));
        store.set("b", "valid", Duration::from_secs(60));

        advance(Duration::from_secs(2)).await;
        let removed = store.sweep(Instant::now());

        assert_eq!(removed, 1);
        assert_eq!(store.keys(), vec!["b".to_string()]);
        assert_eq!(store.get("b"), Some("valid"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_boundary_is_inclusive() {
        let store = CacheStore::default();
        store.set("stats", 1, Duration::from_secs(5));
        let entry = store.entry("stats").expect("entry should be present");

        assert_eq!(store.sweep(entry.expires_at() - Duration::from_millis(1)), 0);
        assert_eq!(store.sweep(entry.expires_at()), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalidate_missing_key_is_noop() {
        let store: CacheStore<u32> = CacheStore::default();
        assert!(!store.invalidate("nothing"));
        store.set("services", 3, Duration::from_secs(60));
        assert!(store.invalidate("services"));
        assert_eq!(store.get("services"), None);
    }

    #[test]
    fn test_soft_capacity_does_not_evict() {
        let store = CacheStore::new(2);
        for i in 0..5 {
            store.set(&format!("k{}", i), i, Duration::from_secs(60));
        }
        assert_eq!(store.len(), 5);
        assert_eq!(store.get("k0"), Some(0));
    }

    #[test]
    fn test_age_display_just_now() {
        let entry = CacheEntry::new("config", (), Duration::from_secs(60));
        assert_eq!(entry.age_display(), "just now");
    }
}
