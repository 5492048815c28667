//! Read access to the repository tree, with virtual nodes resolved transparently.

use std::{collections::HashMap, sync::Arc};

use crate::{
    config::RepositoryConfig,
    context::ProviderContext,
    error::RepositoryError,
    faceted::{FacetQuery, FacetValueCounts, FacetedNavigationEngine},
    properties::{Bid, NodeId, NodeState},
    provider::ProviderRegistry,
    store::{parse_segment, NodeStateStore},
};

/// A reader of the repository. Canonical and view node states are resolved on demand and kept
/// until [`Session::refresh`], so repeated reads within one session are consistent.
pub struct Session {
    registry: Arc<ProviderRegistry>,
    ctx: ProviderContext,
    resolved: HashMap<NodeId, NodeState>,
}

impl Session {
    pub fn new(
        store: Arc<dyn NodeStateStore>,
        registry: Arc<ProviderRegistry>,
        facets: Arc<dyn FacetedNavigationEngine>,
        config: &RepositoryConfig,
    ) -> Self {
        Session {
            registry,
            ctx: ProviderContext::new(store, facets, config.view.clone()),
            resolved: HashMap::new(),
        }
    }

    pub fn root(&mut self) -> Result<NodeState, RepositoryError> {
        let root = self.ctx.store().root();
        self.get_node(&NodeId::Canonical(root))
    }

    pub fn get_node(&mut self, id: &NodeId) -> Result<NodeState, RepositoryError> {
        if let Some(state) = self.resolved.get(id) {
            return Ok(state.clone());
        }
        let state = match id {
            NodeId::Canonical(bid) => self
                .ctx
                .canonical(bid)
                .ok_or_else(|| RepositoryError::NoSuchItemState(bid.to_string()))?,
            NodeId::View(view) => {
                let record = self
                    .ctx
                    .record(view)
                    .ok_or_else(|| RepositoryError::NoSuchItemState(view.to_string()))?;
                let provider = self.registry.by_id(record.provider).ok_or_else(|| {
                    RepositoryError::Configuration(format!(
                        "No provider registered for {}",
                        self.ctx.resolver().display(record.provider.0)
                    ))
                })?;
                provider.populate_view(&mut self.ctx, *view)?
            }
        };
        let state = self.virtualize(state)?;
        self.resolved.insert(*id, state.clone());
        Ok(state)
    }

    /// Run the provider registered for the state's type, if any.
    fn virtualize(&mut self, state: NodeState) -> Result<NodeState, RepositoryError> {
        match self.registry.lookup(&state.node_type) {
            Some(provider) => provider.populate(&mut self.ctx, state),
            None => Ok(state),
        }
    }

    pub fn children(&mut self, id: &NodeId) -> Result<Vec<NodeState>, RepositoryError> {
        let parent = self.get_node(id)?;
        parent
            .children
            .iter()
            .map(|entry| self.get_node(&entry.id))
            .collect()
    }

    /// Resolve an absolute path like `/content/mirror/doc[2]`, following view children.
    pub fn get_node_by_path(&mut self, path: &str) -> Result<NodeState, RepositoryError> {
        let mut current = self.root()?;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let (name, index) = parse_segment(segment)?;
            let child = current
                .children
                .get(name, index)
                .map(|entry| entry.id)
                .ok_or_else(|| {
                    RepositoryError::NotFound(format!("No child '{segment}' on the way to {path}"))
                })?;
            current = self.get_node(&child)?;
        }
        Ok(current)
    }

    /// Absolute path of a resolved node, as listed by its parents.
    pub fn path(&mut self, id: &NodeId) -> Result<String, RepositoryError> {
        let mut segments = Vec::new();
        let mut current = self.get_node(id)?;
        while let Some(parent_id) = current.parent {
            let parent = self.get_node(&parent_id)?;
            let entry = parent.children.by_id(&current.id).ok_or_else(|| {
                RepositoryError::NotFound(format!("{} is not listed by {parent_id}", current.id))
            })?;
            segments.push(entry.to_string());
            current = parent;
        }
        segments.reverse();
        Ok(format!("/{}", segments.join("/")))
    }

    /// The canonical node presented by `id`.
    pub fn upstream(&self, id: &NodeId) -> Option<Bid> {
        match id {
            NodeId::Canonical(bid) => Some(*bid),
            NodeId::View(view) => self.ctx.record(view).map(|record| record.upstream),
        }
    }

    /// Value counts of `facet` among the children of `scope`. For a view node the count is taken
    /// over its upstream node, restricted by the view's facet constraints.
    pub fn facet_value_counts(
        &self,
        scope: &NodeId,
        facet: &str,
    ) -> Result<Arc<FacetValueCounts>, RepositoryError> {
        let query = match scope {
            NodeId::Canonical(bid) => FacetQuery::new(*bid),
            NodeId::View(view) => {
                let record = self
                    .ctx
                    .record(view)
                    .ok_or_else(|| RepositoryError::NoSuchItemState(view.to_string()))?;
                FacetQuery::new(record.upstream)
                    .with_constraints(record.criteria.view())
                    .with_filter(record.criteria.filter())
            }
        };
        self.ctx.facets().count(&query, facet)
    }

    /// Drop every resolved state and view identity. View ids handed out before are invalid
    /// afterwards.
    pub fn refresh(&mut self) {
        tracing::debug!(
            "[Session::refresh] dropping {} resolved states and {} view identities",
            self.resolved.len(),
            self.ctx.arena().len()
        );
        self.resolved.clear();
        self.ctx.reset();
    }
}
