// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed cache buckets shared by the pipeline.
//!
//! Values are stored as JSON so one registry can hold settings, token lists
//! and query results. A value that fails to (de)serialize is logged and
//! treated as a miss; cache problems never reach callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use notifly_config::{CacheBucketConfig, CacheConfig};
use notifly_core::{Clock, RowQuery};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use strum::{Display, EnumString};
use tracing::{debug, warn};

use crate::cache::BoundedCache;

/// Which bucket a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CacheKind {
    Settings,
    Tokens,
    Query,
}

impl CacheKind {
    pub const ALL: [CacheKind; 3] = [CacheKind::Settings, CacheKind::Tokens, CacheKind::Query];
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Counters for one bucket at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Hits over lookups; 0.0 before the first lookup.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Bucket {
    cache: Mutex<BoundedCache<Value>>,
    counters: Counters,
}

impl Bucket {
    fn new(config: &CacheBucketConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: Mutex::new(BoundedCache::new(
                config.capacity,
                config.ttl(),
                config.policy,
                clock,
            )),
            counters: Counters::default(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoundedCache<Value>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The settings, tokens and query caches.
pub struct CacheRegistry {
    settings: Bucket,
    tokens: Bucket,
    query: Bucket,
}

impl CacheRegistry {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings: Bucket::new(&config.settings, clock.clone()),
            tokens: Bucket::new(&config.tokens, clock.clone()),
            query: Bucket::new(&config.query, clock),
        }
    }

    fn bucket(&self, kind: CacheKind) -> &Bucket {
        match kind {
            CacheKind::Settings => &self.settings,
            CacheKind::Tokens => &self.tokens,
            CacheKind::Query => &self.query,
        }
    }

    /// Cached value for `key`, or `None` on a miss, expiry, or a value that
    /// no longer deserializes as `T`.
    pub fn get<T: DeserializeOwned>(&self, kind: CacheKind, key: &str) -> Option<T> {
        let bucket = self.bucket(kind);
        let raw = bucket.lock().get(key);
        let Some(raw) = raw else {
            bucket.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        match serde_json::from_value(raw) {
            Ok(value) => {
                bucket.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) => {
                warn!(cache = %kind, key, error = %e, "dropping undecodable cache entry");
                bucket.lock().remove(key);
                bucket.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, kind: CacheKind, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(cache = %kind, key, error = %e, "value not cacheable");
                return;
            }
        };
        let bucket = self.bucket(kind);
        let evicted = bucket.lock().insert(key, value);
        if !evicted.is_empty() {
            debug!(cache = %kind, evicted = evicted.len(), "cache full, evicted entries");
            bucket
                .counters
                .evictions
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        }
    }

    /// Drop one key, or the whole bucket when `key` is `None`.
    pub fn invalidate(&self, kind: CacheKind, key: Option<&str>) {
        let mut cache = self.bucket(kind).lock();
        match key {
            Some(key) => {
                cache.remove(key);
            }
            None => cache.clear(),
        }
    }

    pub fn invalidate_all(&self) {
        for kind in CacheKind::ALL {
            self.invalidate(kind, None);
        }
    }

    pub fn stats(&self, kind: CacheKind) -> CacheStats {
        let bucket = self.bucket(kind);
        let cache = bucket.lock();
        CacheStats {
            hits: bucket.counters.hits.load(Ordering::Relaxed),
            misses: bucket.counters.misses.load(Ordering::Relaxed),
            evictions: bucket.counters.evictions.load(Ordering::Relaxed),
            entries: cache.len(),
            capacity: cache.capacity(),
        }
    }
}

/// A stable key for a row query, e.g.
/// `notifications?read=eq.false&user_id=eq."u1"&order=created_at.desc`.
///
/// Filters are sorted so equivalent queries share a key.
pub fn query_signature(query: &RowQuery) -> String {
    let mut parts: Vec<String> = query
        .filters
        .iter()
        .map(|f| format!("{}={}.{}", f.column, f.op, f.value))
        .collect();
    parts.sort();
    if !query.order.is_empty() {
        let order: Vec<String> = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
            .collect();
        parts.push(format!("order={}", order.join(",")));
    }
    if let Some((from, to)) = query.range {
        parts.push(format!("range={from}-{to}"));
    }
    format!("{}?{}", query.table, parts.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use notifly_config::EvictionPolicy;
    use notifly_core::{ManualClock, NotificationSettings};
    use std::time::Duration;

    fn registry(clock: Arc<ManualClock>) -> CacheRegistry {
        let bucket = |capacity| CacheBucketConfig {
            capacity,
            ttl_secs: 10,
            policy: EvictionPolicy::Lru,
        };
        CacheRegistry::new(
            &CacheConfig {
                settings: bucket(2),
                tokens: bucket(2),
                query: bucket(2),
            },
            clock,
        )
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()))
    }

    #[test]
    fn typed_round_trip_counts_hits_and_misses() {
        let cache = registry(clock());
        let settings = NotificationSettings::defaults_for("u1");
        assert!(cache.get::<NotificationSettings>(CacheKind::Settings, "u1").is_none());
        cache.set(CacheKind::Settings, "u1", &settings);
        assert_eq!(
            cache.get::<NotificationSettings>(CacheKind::Settings, "u1"),
            Some(settings)
        );
        let stats = cache.stats(CacheKind::Settings);
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn buckets_are_independent() {
        let cache = registry(clock());
        cache.set(CacheKind::Tokens, "u1", &vec!["tok"]);
        assert!(cache.get::<Vec<String>>(CacheKind::Query, "u1").is_none());
        cache.invalidate(CacheKind::Query, None);
        assert!(cache.get::<Vec<String>>(CacheKind::Tokens, "u1").is_some());
    }

    #[test]
    fn type_mismatch_is_a_miss_and_drops_entry() {
        let cache = registry(clock());
        cache.set(CacheKind::Query, "count", &"not a number");
        assert_eq!(cache.get::<u64>(CacheKind::Query, "count"), None);
        assert_eq!(cache.stats(CacheKind::Query).entries, 0);
    }

    #[test]
    fn evictions_and_expiry_are_tracked() {
        let clock = clock();
        let cache = registry(clock.clone());
        for key in ["a", "b", "c"] {
            cache.set(CacheKind::Query, key, &1);
        }
        assert_eq!(cache.stats(CacheKind::Query).evictions, 1);

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get::<i32>(CacheKind::Query, "c"), None);
    }

    #[test]
    fn single_key_invalidation() {
        let cache = registry(clock());
        cache.set(CacheKind::Settings, "u1", &1);
        cache.set(CacheKind::Settings, "u2", &2);
        cache.invalidate(CacheKind::Settings, Some("u1"));
        assert_eq!(cache.get::<i32>(CacheKind::Settings, "u1"), None);
        assert_eq!(cache.get::<i32>(CacheKind::Settings, "u2"), Some(2));
        cache.invalidate_all();
        assert_eq!(cache.stats(CacheKind::Settings).entries, 0);
    }

    #[test]
    fn signature_ignores_filter_order() {
        let a = RowQuery::table("notifications").eq("user_id", "u1").eq("read", false);
        let b = RowQuery::table("notifications").eq("read", false).eq("user_id", "u1");
        assert_eq!(query_signature(&a), query_signature(&b));
        assert_eq!(
            query_signature(&a.clone().order("created_at", false).limit(5)),
            "notifications?read=eq.false&user_id=eq.\"u1\"&order=created_at.desc&range=0-4"
        );
        assert_ne!(query_signature(&a), query_signature(&a.clone().gte("created_at", "x")));
    }
}
