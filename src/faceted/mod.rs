//! Faceted navigation: the engine boundary, a store-backed engine and the shared result cache.

pub mod cache;
pub mod engine;
pub mod lru;
pub mod query;

pub use cache::{FacetedEngineCache, MIN_CACHE_CAPACITY};
pub use engine::{satisfies, CachingFacetedEngine, FacetedNavigationEngine, StoreFacetedEngine};
pub use lru::{BoundedLru, CacheStats};
pub use query::{DocBitSet, FacetCountKey, FacetQuery, FacetValueCounts, KeyPart};
