//! Injected TTL caches and the clock they run on.
//!
//! Nothing here is a module-level singleton: every cache is constructed with a
//! [`Clock`] and handed to its consumer, so tests can drive time explicitly
//! and isolate state between cases.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of monotonic time for caches and retention windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock used in production.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().expect("clock lock poisoned")
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    pinned: bool,
}

/// A TTL map with optional per-entry pinning.
///
/// Pinned entries live on an extended TTL while their key remains relevant
/// (a mint still held, for instance); unpinning drops them back to the base
/// TTL on the next insert. Expired entries are dropped lazily on read and in
/// bulk by [`Self::sweep`].
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
    pinned_ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_pinned_ttl(ttl, ttl)
    }

    pub fn with_pinned_ttl(ttl: Duration, pinned_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            pinned_ttl,
        }
    }

    pub fn get(&self, key: &K, clock: &dyn Clock) -> Option<V> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > clock.now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V, clock: &dyn Clock) {
        self.insert_inner(key, value, false, clock);
    }

    /// Insert with the extended pinned TTL.
    pub fn insert_pinned(&self, key: K, value: V, clock: &dyn Clock) {
        self.insert_inner(key, value, true, clock);
    }

    fn insert_inner(&self, key: K, value: V, pinned: bool, clock: &dyn Clock) {
        let ttl = if pinned { self.pinned_ttl } else { self.ttl };
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(
            key,
            Entry {
                value,
                expires_at: clock.now() + ttl,
                pinned,
            },
        );
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn sweep(&self, clock: &dyn Clock) -> usize {
        let now = clock.now();
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn is_pinned(&self, key: &K) -> bool {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .get(key)
            .map(|e| e.pinned)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_before_and_after_expiry() {
        let clock = ManualClock::new();
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_secs(10));

        cache.insert("a", 1, &clock);
        assert_eq!(cache.get(&"a", &clock), Some(1));

        clock.advance(Duration::from_secs(11));
        assert_eq!(cache.get(&"a", &clock), None);
    }

    #[test]
    fn test_pinned_entries_outlive_base_ttl() {
        let clock = ManualClock::new();
        let cache: TtlCache<&str, i32> =
            TtlCache::with_pinned_ttl(Duration::from_secs(10), Duration::from_secs(100));

        cache.insert("base", 1, &clock);
        cache.insert_pinned("held", 2, &clock);
        assert!(cache.is_pinned(&"held"));

        clock.advance(Duration::from_secs(50));
        assert_eq!(cache.get(&"base", &clock), None);
        assert_eq!(cache.get(&"held", &clock), Some(2));

        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get(&"held", &clock), None);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let clock = ManualClock::new();
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_secs(10));

        cache.insert("old", 1, &clock);
        clock.advance(Duration::from_secs(6));
        cache.insert("new", 2, &clock);
        clock.advance(Duration::from_secs(5));

        assert_eq!(cache.sweep(&clock), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"new", &clock), Some(2));
    }

    #[test]
    fn test_reinsert_refreshes_expiry() {
        let clock = ManualClock::new();
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_secs(10));

        cache.insert("a", 1, &clock);
        clock.advance(Duration::from_secs(8));
        cache.insert("a", 2, &clock);
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get(&"a", &clock), Some(2));
    }
}
