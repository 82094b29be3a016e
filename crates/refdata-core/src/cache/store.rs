//! Bounded in-memory store with TTL expiry and insertion-order eviction.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::CacheDefaults;

/// Configuration for cache behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL applied when the caller does not supply one.
    pub default_ttl: Duration,
    /// Maximum number of live entries.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: CacheDefaults::TTL,
            max_entries: CacheDefaults::MAX_ENTRIES,
        }
    }
}

/// A cached payload with its timing metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub payload: V,
    pub stored_at: Instant,
    pub ttl: Duration,
    /// Insertion sequence number, used for eviction order.
    seq: u64,
}

impl<V> CacheEntry<V> {
    /// An entry is valid while `now < stored_at + ttl`.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }

    /// Age of the entry at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }
}

/// Selects keys for invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationPattern {
    /// Exactly this key.
    Exact(String),
    /// Every key starting with this prefix.
    Prefix(String),
}

impl InvalidationPattern {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            InvalidationPattern::Exact(exact) => key == exact,
            InvalidationPattern::Prefix(prefix) => key.starts_with(prefix.as_str()),
        }
    }
}

/// Counters describing cache activity since construction (or the last `clear`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped on read because their TTL had elapsed.
    pub expirations: u64,
    /// Entries dropped to make room for a new key.
    pub evictions: u64,
    /// Entries dropped by explicit invalidation.
    pub invalidations: u64,
}

struct StoreState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Insertion order as `(seq, key)`. May hold stale pairs for keys that
    /// were replaced or removed; those are skipped on eviction.
    order: VecDeque<(u64, String)>,
    next_seq: u64,
    stats: CacheStats,
}

impl<V> StoreState<V> {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
            stats: CacheStats {
                max_entries,
                ..Default::default()
            },
        }
    }

    fn evict_oldest(&mut self) -> Option<String> {
        while let Some((seq, key)) = self.order.pop_front() {
            let live = self.entries.get(&key).is_some_and(|e| e.seq == seq);
            if live {
                self.entries.remove(&key);
                self.stats.evictions += 1;
                return Some(key);
            }
        }
        None
    }

    fn compact_order(&mut self, max_entries: usize) {
        if self.order.len() <= max_entries.saturating_mul(2).max(16) {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(seq, key)| entries.get(key).is_some_and(|e| e.seq == *seq));
    }
}

/// Keyed store of time-stamped entries.
///
/// Expired entries are treated as absent and purged lazily on access. When
/// the store is full, inserting a new key evicts the oldest entry by
/// insertion order. All mutations happen under one lock, so no partially
/// written entry is ever observable.
pub struct CacheStore<V> {
    config: CacheConfig,
    state: Mutex<StoreState<V>>,
}

impl<V: Clone> CacheStore<V> {
    /// Create a store with the given configuration.
    ///
    /// A `max_entries` of zero is raised to one.
    pub fn new(mut config: CacheConfig) -> Self {
        config.max_entries = config.max_entries.max(1);
        let state = StoreState::new(config.max_entries);
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a cached value.
    ///
    /// Returns `None` if the key doesn't exist or its TTL has elapsed; an
    /// expired entry is removed as a side effect.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_entry(key).map(|entry| entry.payload)
    }

    /// Get a cached value together with its metadata.
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let now = Instant::now();
        let mut state = self.lock();

        match state.entries.get(key).map(|entry| entry.is_valid_at(now)) {
            Some(true) => {
                state.stats.hits += 1;
                state.entries.get(key).cloned()
            }
            Some(false) => {
                state.entries.remove(key);
                state.stats.expirations += 1;
                state.stats.misses += 1;
                debug!("Cache entry {} expired", key);
                None
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Store a value under `key`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        let max_entries = self.config.max_entries;
        let mut state = self.lock();

        if !state.entries.contains_key(&key) {
            while state.entries.len() >= max_entries {
                match state.evict_oldest() {
                    Some(evicted) => debug!("Cache full, evicted {}", evicted),
                    None => break,
                }
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.order.push_back((seq, key.clone()));
        state.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                payload: value,
                stored_at: now,
                ttl,
                seq,
            },
        );
        state.compact_order(max_entries);
    }

    /// Store a value with the configured default TTL.
    pub fn set_default(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.config.default_ttl);
    }

    /// Remove every entry matching `pattern`. Returns the number removed.
    pub fn invalidate(&self, pattern: &InvalidationPattern) -> usize {
        let mut state = self.lock();
        let removed = match pattern {
            InvalidationPattern::Exact(key) => usize::from(state.entries.remove(key).is_some()),
            InvalidationPattern::Prefix(_) => {
                let before = state.entries.len();
                state.entries.retain(|key, _| !pattern.matches(key));
                before - state.entries.len()
            }
        };
        state.stats.invalidations += removed as u64;
        removed
    }

    /// Drop all entries and reset statistics.
    pub fn clear(&self) {
        let mut state = self.lock();
        *state = StoreState::new(self.config.max_entries);
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            ..state.stats.clone()
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_entries: usize) -> CacheStore<&'static str> {
        CacheStore::new(CacheConfig {
            default_ttl: Duration::from_secs(60),
            max_entries,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_boundary() {
        let cache = store(10);
        cache.set("k", "v", Duration::from_secs(5));

        tokio::time::advance(Duration::from_millis(4900)).await;
        assert_eq!(cache.get("k"), Some("v"));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_purged_on_read() {
        let cache = store(10);
        cache.set("k", "v", Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(1)).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_eviction_drops_first_inserted() {
        let cache = store(2);
        cache.set_default("a", "1");
        cache.set_default("b", "2");
        cache.set_default("c", "3");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some("2"));
        assert_eq!(cache.get("c"), Some("3"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_eviction_ignores_reads() {
        let cache = store(2);
        cache.set_default("a", "1");
        cache.set_default("b", "2");
        // Reading "a" does not protect it: eviction is by insertion order.
        assert_eq!(cache.get("a"), Some("1"));
        cache.set_default("c", "3");

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some("2"));
    }

    #[test]
    fn test_replace_moves_key_to_back() {
        let cache = store(2);
        cache.set_default("a", "1");
        cache.set_default("b", "2");
        cache.set_default("a", "1b");
        cache.set_default("c", "3");

        assert_eq!(cache.get("a"), Some("1b"));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_replace_does_not_evict() {
        let cache = store(2);
        cache.set_default("a", "1");
        cache.set_default("b", "2");
        cache.set_default("b", "2b");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_invalidated_key_is_skipped_by_eviction() {
        let cache = store(2);
        cache.set_default("a", "1");
        cache.set_default("b", "2");
        cache.invalidate(&InvalidationPattern::Exact("a".into()));
        cache.set_default("c", "3");

        // Room was freed by the invalidation, so nothing is evicted.
        assert_eq!(cache.get("b"), Some("2"));
        assert_eq!(cache.get("c"), Some("3"));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_many_replacements_stay_bounded() {
        let cache = store(3);
        for i in 0..1_000 {
            cache.set_default(["x", "y", "z", "w"][i % 4], "v");
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.lock().order.len() <= 16 + 1);
    }

    #[test]
    fn test_invalidate_prefix() {
        let cache = store(10);
        cache.set_default("produtores:all", "a");
        cache.set_default("produtores:search?termo=x", "s1");
        cache.set_default("produtores:search?termo=y", "s2");
        cache.set_default("fornecedores:search?termo=x", "f");

        let removed = cache.invalidate(&InvalidationPattern::Prefix("produtores:search".into()));

        assert_eq!(removed, 2);
        assert_eq!(cache.get("produtores:all"), Some("a"));
        assert_eq!(cache.get("fornecedores:search?termo=x"), Some("f"));
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_invalidate_missing_key() {
        let cache = store(10);
        assert_eq!(cache.invalidate(&InvalidationPattern::Exact("nope".into())), 0);
    }

    #[test]
    fn test_clear() {
        let cache = store(10);
        cache.set_default("a", "1");
        cache.set_default("b", "2");
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats { max_entries: 10, ..Default::default() });
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let cache = store(10);
        cache.set_default("a", "1");
        cache.get("a");
        cache.get("a");
        cache.get("b");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let cache = store(0);
        cache.set_default("a", "1");
        cache.set_default("b", "2");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_metadata() {
        let cache = store(10);
        cache.set("k", "v", Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(3)).await;

        let entry = cache.get_entry("k").unwrap();
        assert_eq!(entry.key, "k");
        assert_eq!(entry.ttl, Duration::from_secs(10));
        assert_eq!(entry.age(Instant::now()), Duration::from_secs(3));
    }
}
