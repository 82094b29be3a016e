//! In-memory cache for reference data.
//!
//! Provides the pieces the reference client composes on its read and write paths:
//! - A bounded TTL store with insertion-order eviction
//! - Deterministic keys for list, item and search views
//! - Invalidation of every view a mutation may have made stale

mod invalidator;
mod key;
mod store;

pub use invalidator::CacheInvalidator;
pub use key::{canonical_query, CacheKey};
pub use store::{CacheConfig, CacheEntry, CacheStats, CacheStore, InvalidationPattern};
