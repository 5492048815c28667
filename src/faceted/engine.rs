use std::{collections::BTreeMap, sync::Arc};

use crate::{
    error::RepositoryError,
    properties::{Bid, NodeState},
    store::NodeStateStore,
    view::is_wildcard,
};

use super::{
    cache::FacetedEngineCache,
    query::{DocBitSet, FacetQuery, FacetValueCounts},
};

/// Answers facet membership and facet value count questions over the children of a scope node.
pub trait FacetedNavigationEngine: Send + Sync {
    /// Ordinals of the scope's children that satisfy the query.
    fn view(&self, query: &FacetQuery) -> Result<Arc<DocBitSet>, RepositoryError>;

    /// Value counts of `facet` among the scope's children that satisfy the query.
    fn count(&self, query: &FacetQuery, facet: &str)
        -> Result<Arc<FacetValueCounts>, RepositoryError>;
}

/// Whether `state` satisfies every `facet → value` constraint.
pub fn satisfies(state: &NodeState, constraints: &BTreeMap<String, String>, filter: bool) -> bool {
    constraints
        .iter()
        .all(|(facet, value)| match state.value_set(facet) {
            None => !filter,
            Some(_) if is_wildcard(value) => true,
            Some(values) => values.contains(value),
        })
}

/// Evaluates queries directly against a [`NodeStateStore`].
pub struct StoreFacetedEngine {
    store: Arc<dyn NodeStateStore>,
}

impl StoreFacetedEngine {
    pub fn new(store: Arc<dyn NodeStateStore>) -> Self {
        StoreFacetedEngine { store }
    }

    /// Child states of `scope` that satisfy the query, with their ordinals.
    fn matching(&self, query: &FacetQuery) -> Result<Vec<(usize, NodeState)>, RepositoryError> {
        let scope: Bid = query.scope;
        let parent = self.store.get_node_state(&scope)?;
        let mut matches = Vec::new();
        for (ordinal, entry) in parent.children.iter().enumerate() {
            let Some(child) = entry
                .id
                .canonical()
                .and_then(|bid| self.store.get_canonical_node_state(&bid))
            else {
                continue;
            };
            if satisfies(&child, &query.constraints, query.filter) {
                matches.push((ordinal, child));
            }
        }
        Ok(matches)
    }
}

impl FacetedNavigationEngine for StoreFacetedEngine {
    fn view(&self, query: &FacetQuery) -> Result<Arc<DocBitSet>, RepositoryError> {
        let matches = self.matching(query)?;
        Ok(Arc::new(matches.into_iter().map(|(ordinal, _)| ordinal).collect()))
    }

    fn count(
        &self,
        query: &FacetQuery,
        facet: &str,
    ) -> Result<Arc<FacetValueCounts>, RepositoryError> {
        let mut counts = FacetValueCounts::new();
        for (_, child) in self.matching(query)? {
            for value in child.value_set(facet).unwrap_or_default() {
                *counts.entry(value).or_default() += 1;
            }
        }
        Ok(Arc::new(counts))
    }
}

/// Read-through cache in front of another engine.
pub struct CachingFacetedEngine {
    inner: Arc<dyn FacetedNavigationEngine>,
    cache: Arc<FacetedEngineCache>,
}

impl CachingFacetedEngine {
    pub fn new(inner: Arc<dyn FacetedNavigationEngine>, cache: Arc<FacetedEngineCache>) -> Self {
        CachingFacetedEngine { inner, cache }
    }

    pub fn cache(&self) -> &Arc<FacetedEngineCache> {
        &self.cache
    }
}

impl FacetedNavigationEngine for CachingFacetedEngine {
    fn view(&self, query: &FacetQuery) -> Result<Arc<DocBitSet>, RepositoryError> {
        let key = query.cache_key()?;
        if let Some(hit) = self.cache.get_bit_set(&key) {
            return Ok(hit);
        }
        let bit_set = self.inner.view(query)?;
        self.cache.put_bit_set(key, bit_set.clone());
        Ok(bit_set)
    }

    fn count(
        &self,
        query: &FacetQuery,
        facet: &str,
    ) -> Result<Arc<FacetValueCounts>, RepositoryError> {
        let key = query.count_key(facet);
        if let Some(hit) = self.cache.get_facet_value_count_map(&key) {
            return Ok(hit);
        }
        let counts = self.inner.count(query, facet)?;
        self.cache.put_facet_value_count_map(key, counts.clone());
        Ok(counts)
    }
}
