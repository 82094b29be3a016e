//! Cache invalidation after successful mutations.

use super::key::CacheKey;
use super::store::{CacheStore, InvalidationPattern};
use tracing::debug;

/// Drops the cache views a mutation may have made stale.
///
/// Any write to a resource family invalidates the item itself (when its id is
/// known), the full list, the active list and every cached search page.
#[derive(Debug, Clone)]
pub struct CacheInvalidator {
    resource: String,
}

impl CacheInvalidator {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
        }
    }

    /// Patterns to invalidate after a write touching `id`.
    pub fn patterns_for(&self, id: Option<&str>) -> Vec<InvalidationPattern> {
        let mut patterns = Vec::with_capacity(4);
        if let Some(id) = id {
            patterns.push(InvalidationPattern::Exact(
                CacheKey::item(&self.resource, id).into(),
            ));
        }
        patterns.push(InvalidationPattern::Exact(CacheKey::all(&self.resource).into()));
        patterns.push(InvalidationPattern::Exact(
            CacheKey::active(&self.resource).into(),
        ));
        patterns.push(InvalidationPattern::Prefix(CacheKey::search_prefix(
            &self.resource,
        )));
        patterns
    }

    /// Invalidate every view affected by a write. Returns the number of entries removed.
    pub fn after_write<V: Clone>(&self, store: &CacheStore<V>, id: Option<&str>) -> usize {
        let removed: usize = self
            .patterns_for(id)
            .iter()
            .map(|pattern| store.invalidate(pattern))
            .sum();
        debug!(
            "Invalidated {} cache entries for {} (id: {:?})",
            removed, self.resource, id
        );
        removed
    }

    /// Invalidate the whole resource family.
    pub fn invalidate_family<V: Clone>(&self, store: &CacheStore<V>) -> usize {
        store.invalidate(&InvalidationPattern::Prefix(CacheKey::family_prefix(
            &self.resource,
        )))
    }
}
