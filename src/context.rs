//! Transaction-scoped state shared by the providers while a session resolves nodes.

use std::{collections::HashMap, sync::Arc};

use crate::{
    config::ViewConfig,
    faceted::FacetedNavigationEngine,
    names::{NameResolver, NodeTraits},
    properties::{Bid, NodeState},
    store::NodeStateStore,
    view::{ViewArena, ViewId, ViewRecord},
};

/// Everything a provider may consult while populating a node. Canonical states read through the
/// context are cached for its lifetime, so repeated reads of one node see the same state.
pub struct ProviderContext {
    store: Arc<dyn NodeStateStore>,
    facets: Arc<dyn FacetedNavigationEngine>,
    resolver: NameResolver,
    config: ViewConfig,
    arena: ViewArena,
    canonical: HashMap<Bid, NodeState>,
}

impl ProviderContext {
    pub fn new(
        store: Arc<dyn NodeStateStore>,
        facets: Arc<dyn FacetedNavigationEngine>,
        config: ViewConfig,
    ) -> Self {
        let resolver = store.resolver();
        ProviderContext {
            store,
            facets,
            resolver,
            config,
            arena: ViewArena::new(),
            canonical: HashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn NodeStateStore> {
        &self.store
    }

    pub fn facets(&self) -> &Arc<dyn FacetedNavigationEngine> {
        &self.facets
    }

    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn arena(&self) -> &ViewArena {
        &self.arena
    }

    pub fn intern(&mut self, record: ViewRecord) -> ViewId {
        self.arena.intern(record)
    }

    pub fn record(&self, id: &ViewId) -> Option<&ViewRecord> {
        self.arena.get(id)
    }

    /// The canonical state of `bid`, or `None` when it can no longer be resolved.
    pub fn canonical(&mut self, bid: &Bid) -> Option<NodeState> {
        if let Some(state) = self.canonical.get(bid) {
            return Some(state.clone());
        }
        let state = self.store.get_canonical_node_state(bid)?;
        self.canonical.insert(*bid, state.clone());
        Some(state)
    }

    pub fn traits(&self, state: &NodeState) -> NodeTraits {
        self.resolver
            .traits_with_mixins(state.node_type, &state.mixins)
    }

    /// Whether the primary type of `state` is exactly `qualified`.
    pub fn is_exactly(&self, state: &NodeState, qualified: &str) -> bool {
        self.resolver
            .lookup(qualified)
            .map(|name| name == state.node_type)
            .unwrap_or(false)
    }

    /// Forget cached canonical states and all minted view identities.
    pub fn reset(&mut self) {
        self.canonical.clear();
        self.arena = ViewArena::new();
    }
}
