use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Markers older than this are treated as abandoned.
pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMarker {
    pub key: String,
    pub started_at: Instant,
}

struct Slot<T> {
    marker: PendingMarker,
    generation: u64,
    outcome: watch::Receiver<Option<T>>,
}

struct Slots<T> {
    by_key: HashMap<String, Slot<T>>,
    next_generation: u64,
}

impl<T> Slots<T> {
    fn owned_by(&self, key: &str, generation: u64) -> bool {
        self.by_key
            .get(key)
            .is_some_and(|slot| slot.generation == generation)
    }
}

/// Tracks which keys have a fetch in flight.
///
/// Each registration owns a one-shot broadcast of its outcome. Joiners
/// subscribe to it instead of issuing their own transport call.
pub struct PendingRequestTracker<T> {
    slots: Mutex<Slots<T>>,
    timeout: Duration,
}

pub enum JoinStatus<T> {
    Joined(PendingJoin<T>),
    NotPending,
}

pub enum Claim<'a, T> {
    Joined(PendingJoin<T>),
    Registered(Registration<'a, T>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome<T> {
    /// The fetcher published this outcome.
    Settled(T),
    /// The fetcher went away without publishing (cancelled or dropped).
    Abandoned,
    TimedOut,
}

impl<T> PendingRequestTracker<T> {
    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, key: &str, generation: u64) {
        let mut slots = self.lock();
        if slots.owned_by(key, generation) {
            slots.by_key.remove(key);
        }
    }
}

impl<T: Clone> PendingRequestTracker<T> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(Slots {
                by_key: HashMap::new(),
                next_generation: 0,
            }),
            timeout,
        }
    }

    fn join_locked(&self, slots: &mut Slots<T>, key: &str) -> Option<PendingJoin<T>> {
        let slot = slots.by_key.get(key)?;
        if slot.marker.started_at.elapsed() >= self.timeout {
            debug!(key = key, "Dropping stale pending marker");
            slots.by_key.remove(key);
            return None;
        }
        Some(PendingJoin {
            key: key.to_string(),
            outcome: slot.outcome.clone(),
        })
    }

    fn register_locked(&self, slots: &mut Slots<T>, key: &str) -> Registration<'_, T> {
        let (tx, rx) = watch::channel(None);
        slots.next_generation += 1;
        let generation = slots.next_generation;
        slots.by_key.insert(
            key.to_string(),
            Slot {
                marker: PendingMarker {
                    key: key.to_string(),
                    started_at: Instant::now(),
                },
                generation,
                outcome: rx,
            },
        );
        Registration {
            tracker: self,
            key: key.to_string(),
            generation,
            outcome: tx,
        }
    }

    /// Join the in-flight fetch for `key`, if there is a fresh one.
    pub fn try_join(&self, key: &str) -> JoinStatus<T> {
        let mut slots = self.lock();
        match self.join_locked(&mut slots, key) {
            Some(join) => JoinStatus::Joined(join),
            None => JoinStatus::NotPending,
        }
    }

    /// Create a marker for `key`. Silently replaces an existing one, so
    /// callers should `try_join` first (or use [`Self::join_or_register`]).
    pub fn register(&self, key: &str) -> Registration<'_, T> {
        let mut slots = self.lock();
        self.register_locked(&mut slots, key)
    }

    /// Check and register under one lock so two callers cannot both
    /// become the fetcher for the same key.
    pub fn join_or_register(&self, key: &str) -> Claim<'_, T> {
        let mut slots = self.lock();
        match self.join_locked(&mut slots, key) {
            Some(join) => Claim::Joined(join),
            None => Claim::Registered(self.register_locked(&mut slots, key)),
        }
    }

    /// Remove the marker for `key` whoever owns it.
    pub fn clear(&self, key: &str) -> bool {
        self.lock().by_key.remove(key).is_some()
    }

    pub fn marker(&self, key: &str) -> Option<PendingMarker> {
        self.lock().by_key.get(key).map(|slot| slot.marker.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_key.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<T: Clone> Default for PendingRequestTracker<T> {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_TIMEOUT)
    }
}

/// A caller waiting on somebody else's fetch.
pub struct PendingJoin<T> {
    key: String,
    outcome: watch::Receiver<Option<T>>,
}

impl<T: Clone> PendingJoin<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn wait(mut self, timeout: Duration) -> JoinOutcome<T> {
        match tokio::time::timeout(timeout, self.outcome.wait_for(Option::is_some)).await {
            Ok(Ok(published)) => match published.clone() {
                Some(outcome) => JoinOutcome::Settled(outcome),
                None => JoinOutcome::Abandoned,
            },
            Ok(Err(_)) => JoinOutcome::Abandoned,
            Err(_) => JoinOutcome::TimedOut,
        }
    }
}

/// Ownership of a key's marker. Dropping it clears the marker, unless a
/// newer registration has replaced it in the meantime.
pub struct Registration<'a, T> {
    tracker: &'a PendingRequestTracker<T>,
    key: String,
    generation: u64,
    outcome: watch::Sender<Option<T>>,
}

impl<T> Registration<'_, T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Run `write` under the tracker lock if this registration still owns
    /// the key's marker. A registration whose marker went stale and was
    /// dropped or replaced gets `false` and `write` never runs.
    pub fn commit(&self, write: impl FnOnce()) -> bool {
        let slots = self.tracker.lock();
        if !slots.owned_by(&self.key, self.generation) {
            return false;
        }
        write();
        true
    }

    /// Publish the outcome to every joiner and clear the marker.
    pub fn settle(self, outcome: T) {
        self.outcome.send_replace(Some(outcome));
    }
}

impl<T> Drop for Registration<'_, T> {
    fn drop(&mut self) {
        self.tracker.release(&self.key, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[test]
    fn test_register_then_join() {
        let tracker: PendingRequestTracker<u32> = PendingRequestTracker::default();
        assert!(matches!(tracker.try_join("stats"), JoinStatus::NotPending));

        let _registration = tracker.register("stats");
        assert!(matches!(tracker.try_join("stats"), JoinStatus::Joined(_)));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_join_or_register_yields_one_fetcher() {
        let tracker: PendingRequestTracker<u32> = PendingRequestTracker::default();
        let first = tracker.join_or_register("plans");
        let second = tracker.join_or_register("plans");

        assert!(matches!(first, Claim::Registered(_)));
        assert!(matches!(second, Claim::Joined(_)));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_dropping_registration_clears_marker() {
        let tracker: PendingRequestTracker<u32> = PendingRequestTracker::default();
        {
            let _registration = tracker.register("config");
            assert!(tracker.marker("config").is_some());
        }
        assert!(tracker.marker("config").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_marker_is_ignored() {
        let tracker: PendingRequestTracker<u32> = PendingRequestTracker::default();
        let stale = tracker.register("services");

        advance(Duration::from_secs(29)).await;
        assert!(matches!(tracker.try_join("services"), JoinStatus::Joined(_)));

        advance(Duration::from_secs(1)).await;
        assert!(matches!(tracker.try_join("services"), JoinStatus::NotPending));

        // The old fetcher finishing late must not clear the replacement.
        let replacement = tracker.register("services");
        drop(stale);
        assert!(tracker.marker("services").is_some());
        drop(replacement);
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_only_while_marker_is_owned() {
        let tracker: PendingRequestTracker<u32> = PendingRequestTracker::default();
        let stale = tracker.register("stats");
        assert!(stale.commit(|| {}));

        advance(Duration::from_secs(31)).await;
        let replacement = match tracker.join_or_register("stats") {
            Claim::Registered(registration) => registration,
            Claim::Joined(_) => panic!("stale marker should have been replaced"),
        };

        let mut written = false;
        assert!(!stale.commit(|| written = true));
        assert!(!written);
        assert!(replacement.commit(|| written = true));
        assert!(written);
    }

    #[test]
    fn test_commit_fails_after_marker_cleared() {
        let tracker: PendingRequestTracker<u32> = PendingRequestTracker::default();
        let registration = tracker.register("plans");
        tracker.clear("plans");
        assert!(!registration.commit(|| {}));
    }

    #[tokio::test]
    async fn test_joiner_receives_settled_outcome() {
        let tracker: PendingRequestTracker<u32> = PendingRequestTracker::default();
        let registration = tracker.register("products");
        let join = match tracker.try_join("products") {
            JoinStatus::Joined(join) => join,
            JoinStatus::NotPending => panic!("expected a pending fetch"),
        };

        registration.settle(42);
        assert_eq!(join.wait(Duration::from_secs(1)).await, JoinOutcome::Settled(42));
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_joiner_sees_abandoned_fetch() {
        let tracker: PendingRequestTracker<u32> = PendingRequestTracker::default();
        let registration = tracker.register("products");
        let join = match tracker.try_join("products") {
            JoinStatus::Joined(join) => join,
            JoinStatus::NotPending => panic!("expected a pending fetch"),
        };

        drop(registration);
        assert_eq!(join.wait(Duration::from_secs(1)).await, JoinOutcome::Abandoned);
    }

    #[tokio::test(start_paused = true)]
    async fn test_joiner_times_out() {
        let tracker: PendingRequestTracker<u32> = PendingRequestTracker::default();
        let _registration = tracker.register("stats");
        let join = match tracker.try_join("stats") {
            JoinStatus::Joined(join) => join,
            JoinStatus::NotPending => panic!("expected a pending fetch"),
        };

        assert_eq!(join.wait(Duration::from_secs(10)).await, JoinOutcome::TimedOut);
    }

    #[test]
    fn test_clear_removes_regardless_of_owner() {
        let tracker: PendingRequestTracker<u32> = PendingRequestTracker::default();
        let _registration = tracker.register("stats");
        assert!(tracker.clear("stats"));
        assert!(!tracker.clear("stats"));
    }
}
