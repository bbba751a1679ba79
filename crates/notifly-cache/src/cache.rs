// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A bounded map with lazy TTL expiry and a pluggable eviction policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use notifly_config::EvictionPolicy;
use notifly_core::Clock;

/// One cached value and its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub inserted_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    // Tie-breakers for entries sharing a timestamp.
    insert_seq: u64,
    access_seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        now - self.inserted_at >= ttl
    }

    fn eviction_rank(&self, policy: EvictionPolicy) -> (i64, u64) {
        match policy {
            EvictionPolicy::Lru => (self.last_accessed_at.timestamp_micros(), self.access_seq),
            EvictionPolicy::Lfu => (
                i64::try_from(self.access_count).unwrap_or(i64::MAX),
                self.access_seq,
            ),
            EvictionPolicy::Fifo => (self.inserted_at.timestamp_micros(), self.insert_seq),
        }
    }
}

/// Bounded cache keyed by string.
///
/// Never holds more than `capacity` entries. Expired entries are dropped when
/// read or when room is needed; there is no background sweeper.
pub struct BoundedCache<V> {
    capacity: usize,
    ttl: TimeDelta,
    policy: EvictionPolicy,
    clock: Arc<dyn Clock>,
    entries: HashMap<String, CacheEntry<V>>,
    seq: u64,
}

impl<V: Clone> BoundedCache<V> {
    pub fn new(capacity: usize, ttl: Duration, policy: EvictionPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            policy,
            clock,
            entries: HashMap::new(),
            seq: 0,
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Look up `key`, counting the access. Expired entries read as absent.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let seq = self.next_seq();
        let expired = self.entries.get(key)?.is_expired(now, self.ttl);
        if expired {
            self.entries.remove(key);
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed_at = now;
        entry.access_count = entry.access_count.saturating_add(1);
        entry.access_seq = seq;
        Some(entry.value.clone())
    }

    /// Whether a live entry exists, without counting an access.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .is_some_and(|e| !e.is_expired(now, self.ttl))
    }

    /// Insert or replace `key`. Returns the keys evicted to make room.
    ///
    /// Replacing an existing key restarts its TTL but keeps its access count.
    pub fn insert(&mut self, key: &str, value: V) -> Vec<String> {
        let now = self.clock.now();
        let seq = self.next_seq();

        if let Some(entry) = self.entries.get_mut(key) {
            entry.value = value;
            entry.inserted_at = now;
            entry.last_accessed_at = now;
            entry.insert_seq = seq;
            entry.access_seq = seq;
            return Vec::new();
        }

        let mut evicted = Vec::new();
        if self.entries.len() >= self.capacity {
            self.purge_expired();
        }
        while self.entries.len() >= self.capacity {
            match self.victim() {
                Some(victim) => {
                    self.entries.remove(&victim);
                    evicted.push(victim);
                }
                None => break,
            }
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                inserted_at: now,
                last_accessed_at: now,
                access_count: 0,
                insert_seq: seq,
                access_seq: seq,
            },
        );
        evicted
    }

    fn victim(&self) -> Option<String> {
        self.entries
            .values()
            .min_by_key(|e| e.eviction_rank(self.policy))
            .map(|e| e.key.clone())
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now, ttl));
        before - self.entries.len()
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Bookkeeping for `key`, if present.
    pub fn entry(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use notifly_core::ManualClock;
    use proptest::prelude::*;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn cache(policy: EvictionPolicy, capacity: usize, clock: Arc<ManualClock>) -> BoundedCache<u32> {
        BoundedCache::new(capacity, Duration::from_secs(60), policy, clock)
    }

    #[test]
    fn lru_evicts_least_recently_accessed() {
        let clock = clock();
        let mut c = cache(EvictionPolicy::Lru, 3, clock.clone());
        c.insert("a", 1);
        c.insert("b", 2);
        c.insert("c", 3);
        clock.advance(Duration::from_secs(1));
        assert_eq!(c.get("a"), Some(1));
        assert_eq!(c.get("c"), Some(3));

        let evicted = c.insert("d", 4);
        assert_eq!(evicted, vec!["b".to_string()]);
        assert_eq!(c.len(), 3);
        assert!(!c.contains("b"));
    }

    #[test]
    fn lfu_evicts_least_frequently_accessed() {
        let mut c = cache(EvictionPolicy::Lfu, 2, clock());
        c.insert("hot", 1);
        c.insert("cold", 2);
        for _ in 0..3 {
            c.get("hot");
        }
        c.get("cold");
        assert_eq!(c.insert("new", 3), vec!["cold".to_string()]);
    }

    #[test]
    fn fifo_ignores_access() {
        let mut c = cache(EvictionPolicy::Fifo, 2, clock());
        c.insert("first", 1);
        c.insert("second", 2);
        c.get("first");
        c.get("first");
        assert_eq!(c.insert("third", 3), vec!["first".to_string()]);
    }

    #[test]
    fn ttl_expires_lazily() {
        let clock = clock();
        let mut c = cache(EvictionPolicy::Lru, 4, clock.clone());
        c.insert("k", 7);
        clock.advance(Duration::from_secs(59));
        assert_eq!(c.get("k"), Some(7));
        clock.advance(Duration::from_secs(1));
        assert_eq!(c.len(), 1);
        assert_eq!(c.get("k"), None);
        assert!(c.is_empty());
    }

    #[test]
    fn expired_entries_make_room_before_eviction() {
        let clock = clock();
        let mut c = cache(EvictionPolicy::Lru, 2, clock.clone());
        c.insert("old", 1);
        clock.advance(Duration::from_secs(30));
        c.insert("young", 2);
        clock.advance(Duration::from_secs(31));
        // `old` has expired; `young` survives although it is the LRU victim otherwise.
        assert_eq!(c.insert("new", 3), Vec::<String>::new());
        assert!(c.contains("young"));
        assert!(c.contains("new"));
    }

    #[test]
    fn overwrite_restarts_ttl_without_eviction() {
        let clock = clock();
        let mut c = cache(EvictionPolicy::Lru, 1, clock.clone());
        c.insert("k", 1);
        c.get("k");
        clock.advance(Duration::from_secs(50));
        assert!(c.insert("k", 2).is_empty());
        clock.advance(Duration::from_secs(50));
        assert_eq!(c.get("k"), Some(2));
        assert_eq!(c.entry("k").unwrap().access_count, 2);
    }

    proptest! {
        #[test]
        fn lru_overflow_evicts_exactly_the_untouched_oldest(
            capacity in 2usize..12,
            touched in proptest::collection::vec(any::<bool>(), 12),
        ) {
            let clock = clock();
            let mut c = cache(EvictionPolicy::Lru, capacity, clock.clone());
            for i in 0..capacity {
                c.insert(&format!("k{i}"), i as u32);
            }
            clock.advance(Duration::from_secs(1));
            for i in 0..capacity {
                if touched[i] {
                    c.get(&format!("k{i}"));
                }
            }

            // Least recent: the first untouched key, else the first key touched.
            let expected = (0..capacity)
                .find(|i| !touched[*i])
                .or_else(|| (0..capacity).find(|i| touched[*i]))
                .map(|i| format!("k{i}"))
                .unwrap();

            let evicted = c.insert("overflow", 0);
            prop_assert_eq!(evicted, vec![expected]);
            prop_assert_eq!(c.len(), capacity);
        }

        #[test]
        fn size_never_exceeds_capacity(
            capacity in 1usize..8,
            keys in proptest::collection::vec(0u8..20, 1..60),
        ) {
            let mut c = cache(EvictionPolicy::Lfu, capacity, clock());
            for k in keys {
                let key = k.to_string();
                if k % 3 == 0 {
                    c.get(&key);
                } else {
                    c.insert(&key, u32::from(k));
                }
                prop_assert!(c.len() <= capacity);
            }
        }
    }
}
