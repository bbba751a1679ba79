// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caching and rate limiting for the Notifly pipeline.
//!
//! [`CacheRegistry`] keeps one bounded, TTL-expiring bucket per cached data
//! type with LRU, LFU or FIFO eviction. [`RateLimiter`] enforces fixed
//! request windows per operation and subject. [`CachedRowStore`] serves
//! repeated backend reads from the query bucket.

pub mod cache;
pub mod cached_rows;
pub mod rate_limit;
pub mod registry;

pub use cache::{BoundedCache, CacheEntry};
pub use cached_rows::CachedRowStore;
pub use rate_limit::{RateDecision, RateLimitedOperation, RateLimiter, RateWindow};
pub use registry::{CacheKind, CacheRegistry, CacheStats, query_signature};
