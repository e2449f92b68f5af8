// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A bounded map with per-entry expiry and least-recently-accessed eviction.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::stats::{CacheStats, CacheStatsSnapshot};

/// A warning is logged each time the eviction count reaches a multiple of this.
const EVICTION_WARN_EVERY: u64 = 10;

type EvictCallback<V> = Box<dyn Fn(&str, &V) + Send + Sync>;

/// Lifetime and capacity of one cache domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 3600),
            max_entries: 100,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
    last_accessed: Instant,
    /// Access sequence number; breaks ties between equal instants.
    access_seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    seq: u64,
}

impl<V> Inner<V> {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// In-process cache for one named domain.
pub struct TtlCache<V> {
    name: String,
    policy: CachePolicy,
    inner: Mutex<Inner<V>>,
    stats: CacheStats,
    on_evict: Option<EvictCallback<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: impl Into<String>, policy: CachePolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                seq: 0,
            }),
            stats: CacheStats::default(),
            on_evict: None,
        }
    }

    /// Call `callback` with each entry evicted for capacity.
    pub fn with_eviction_callback(
        mut self,
        callback: impl Fn(&str, &V) + Send + Sync + 'static,
    ) -> Self {
        self.on_evict = Some(Box::new(callback));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// The live value for `key`. Absent and expired keys count as misses.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();
        let seq = inner.next_seq();
        let live = inner.entries.get(key).map(|e| !e.is_expired(now));
        let value = match live {
            Some(true) => inner.entries.get_mut(key).map(|entry| {
                entry.last_accessed = now;
                entry.access_seq = seq;
                entry.value.clone()
            }),
            Some(false) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        };
        drop(inner);

        match value {
            Some(v) => {
                self.stats.hit();
                luni_prometheus::record_cache_hit(&self.name);
                Some(v)
            }
            None => {
                self.stats.miss();
                luni_prometheus::record_cache_miss(&self.name);
                None
            }
        }
    }

    /// Store with the domain TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.policy.ttl);
    }

    /// Store with an explicit TTL, evicting the least recently accessed
    /// entry first when the domain is full.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        let mut evicted = Vec::new();
        {
            let mut inner = self.lock();
            inner.entries.retain(|_, e| !e.is_expired(now));
            while !inner.entries.contains_key(&key)
                && inner.entries.len() >= self.policy.max_entries
            {
                let Some(lru) = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| (e.last_accessed, e.access_seq))
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                if let Some(entry) = inner.entries.remove(&lru) {
                    evicted.push((lru, entry.value));
                }
            }
            let seq = inner.next_seq();
            inner.entries.insert(
                key,
                CacheEntry {
                    value,
                    created_at: now,
                    expires_at: now + ttl,
                    last_accessed: now,
                    access_seq: seq,
                },
            );
        }

        for (key, value) in evicted {
            let total = self.stats.evicted();
            luni_prometheus::record_cache_eviction(&self.name);
            if let Some(callback) = &self.on_evict {
                callback(&key, &value);
            }
            if total % EVICTION_WARN_EVERY == 0 {
                tracing::warn!(
                    domain = %self.name,
                    evictions = total,
                    max_entries = self.policy.max_entries,
                    "cache domain is evicting frequently, consider raising max_entries"
                );
            }
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    /// Whether a live entry exists. Does not touch stats or recency.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Time since a live entry was stored.
    pub fn age(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| now - e.created_at)
    }

    /// Remove every key starting with `prefix`.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|k, _| !k.starts_with(prefix));
        before - inner.entries.len()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.is_expired(now));
        before - inner.entries.len()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot(self.len())
    }

    /// The map stays consistent across a panicking holder, so poison is ignored.
    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn cache(max: usize) -> TtlCache<String> {
        TtlCache::new(
            "test",
            CachePolicy {
                ttl: Duration::from_secs(60),
                max_entries: max,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn get_returns_value_until_expiry() {
        let c = cache(10);
        c.set("a", "1".to_string());
        assert_eq!(c.get("a").as_deref(), Some("1"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(c.get("a").is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(c.get("a").is_none());
        assert_eq!(c.len(), 0);

        let stats = c.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_domain_evicts_least_recently_accessed() {
        let c = cache(2);
        c.set("a", "1".into());
        tokio::time::advance(Duration::from_millis(10)).await;
        c.set("b", "2".into());
        tokio::time::advance(Duration::from_millis(10)).await;
        c.get("a");
        c.set("c", "3".into());

        assert!(c.has("a"));
        assert!(!c.has("b"));
        assert!(c.has("c"));
        assert_eq!(c.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ties_broken_by_access_order() {
        let c = cache(2);
        c.set("a", "1".into());
        c.set("b", "2".into());
        c.get("a");
        c.set("c", "3".into());
        assert!(c.has("a"));
        assert!(!c.has("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_does_not_evict() {
        let c = cache(2);
        c.set("a", "1".into());
        c.set("b", "2".into());
        tokio::time::advance(Duration::from_secs(3)).await;
        c.set("a", "9".into());
        assert_eq!(c.age("a"), Some(Duration::ZERO));
        assert_eq!(c.age("b"), Some(Duration::from_secs(3)));
        assert_eq!(c.len(), 2);
        assert_eq!(c.stats().evictions, 0);
        assert_eq!(c.get("a").as_deref(), Some("9"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_make_room_before_eviction() {
        let c = cache(2);
        c.set_with_ttl("short", "x".into(), Duration::from_secs(1));
        c.set("keep", "y".into());
        tokio::time::advance(Duration::from_secs(2)).await;
        c.set("new", "z".into());
        assert!(c.has("keep"));
        assert_eq!(c.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_callback_receives_entry() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let c = cache(1).with_eviction_callback(move |key, value: &String| {
            assert_eq!(key, "a");
            assert_eq!(value, "1");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        c.set("a", "1".into());
        c.set("b", "2".into());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired() {
        let c = cache(10);
        c.set_with_ttl("a", "1".into(), Duration::from_secs(1));
        c.set("b", "2".into());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(c.sweep_expired(), 1);
        assert_eq!(c.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_prefix_and_clear() {
        let c = cache(10);
        c.set("acme:x", "1".into());
        c.set("acme:y", "2".into());
        c.set("other:x", "3".into());
        assert_eq!(c.delete_prefix("acme:"), 2);
        assert!(c.delete("other:x"));
        assert!(c.is_empty());
        c.set("z", "4".into());
        c.clear();
        assert!(c.is_empty());
    }

    #[test]
    fn stats_display() {
        let snapshot = CacheStatsSnapshot {
            hits: 3,
            misses: 1,
            evictions: 0,
            size: 2,
            hit_rate: 0.75,
        };
        assert_eq!(
            snapshot.to_string(),
            "size=2 hits=3 misses=1 evictions=0 hit_rate=75.0%"
        );
    }
}
