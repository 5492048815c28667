//! Process-wide cache of faceted navigation results.
//!
//! Two independently sized LRU caches: matching document sets keyed by the query's string form,
//! and facet value counts keyed by a [`FacetCountKey`]. Nothing invalidates entries when content
//! changes; callers that need fresh results call [`FacetedEngineCache::clear`].

use parking_lot::Mutex;
use std::sync::Arc;

use super::{
    lru::{BoundedLru, CacheStats},
    query::{DocBitSet, FacetCountKey, FacetValueCounts},
};

/// Smallest capacity either cache is given, regardless of what was requested.
pub const MIN_CACHE_CAPACITY: usize = 100;

#[derive(Debug)]
pub struct FacetedEngineCache {
    bit_sets: Mutex<BoundedLru<String, Arc<DocBitSet>>>,
    facet_counts: Mutex<BoundedLru<FacetCountKey, Arc<FacetValueCounts>>>,
}

impl Default for FacetedEngineCache {
    fn default() -> Self {
        FacetedEngineCache::new(MIN_CACHE_CAPACITY, MIN_CACHE_CAPACITY)
    }
}

impl FacetedEngineCache {
    pub fn new(bitset_capacity: usize, facet_count_capacity: usize) -> Self {
        let bitset_capacity = bitset_capacity.max(MIN_CACHE_CAPACITY);
        let facet_count_capacity = facet_count_capacity.max(MIN_CACHE_CAPACITY);
        tracing::debug!(
            "[FacetedEngineCache::new] bitset capacity {bitset_capacity}, facet count capacity {facet_count_capacity}"
        );
        FacetedEngineCache {
            bit_sets: Mutex::new(BoundedLru::new(bitset_capacity)),
            facet_counts: Mutex::new(BoundedLru::new(facet_count_capacity)),
        }
    }

    pub fn get_bit_set(&self, key: &str) -> Option<Arc<DocBitSet>> {
        self.bit_sets.lock().get(key)
    }

    pub fn put_bit_set(&self, key: String, bit_set: Arc<DocBitSet>) {
        self.bit_sets.lock().insert(key, bit_set);
    }

    pub fn get_facet_value_count_map(&self, key: &FacetCountKey) -> Option<Arc<FacetValueCounts>> {
        self.facet_counts.lock().get(key)
    }

    pub fn put_facet_value_count_map(&self, key: FacetCountKey, counts: Arc<FacetValueCounts>) {
        self.facet_counts.lock().insert(key, counts);
    }

    pub fn clear(&self) {
        self.bit_sets.lock().clear();
        self.facet_counts.lock().clear();
    }

    pub fn bit_set_len(&self) -> usize {
        self.bit_sets.lock().len()
    }

    pub fn facet_count_len(&self) -> usize {
        self.facet_counts.lock().len()
    }

    pub fn bit_set_capacity(&self) -> usize {
        self.bit_sets.lock().capacity()
    }

    pub fn facet_count_capacity(&self) -> usize {
        self.facet_counts.lock().capacity()
    }

    pub fn bit_set_stats(&self) -> CacheStats {
        self.bit_sets.lock().stats()
    }

    pub fn facet_count_stats(&self) -> CacheStats {
        self.facet_counts.lock().stats()
    }
}
