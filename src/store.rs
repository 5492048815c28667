//! The node state store boundary and an in-memory implementation of it.
//!
//! The view layer only ever reads from a [`NodeStateStore`]. The derived data engine
//! additionally writes through [`WritableStore`], which stages modified states and applies them
//! on [`WritableStore::flush`], detecting per-node write conflicts by version.

use parking_lot::{Mutex, RwLock};
use std::{
    collections::BTreeMap,
    sync::Arc,
};
use toml::Value;

use crate::{
    error::RepositoryError,
    names::{NameResolver, NT_UNSTRUCTURED},
    properties::{Bid, NodeId, NodeState},
};

pub trait NodeStateStore: Send + Sync {
    /// The persisted state of `id`, or [`RepositoryError::NoSuchItemState`].
    fn get_node_state(&self, id: &Bid) -> Result<NodeState, RepositoryError>;

    /// Like [`Self::get_node_state`], but `None` when the node can no longer be resolved.
    fn get_canonical_node_state(&self, id: &Bid) -> Option<NodeState> {
        self.get_node_state(id).ok()
    }

    fn root(&self) -> Bid {
        Bid::root()
    }

    /// Absolute path of a persisted node, e.g. `/content/news[2]`.
    fn path_of(&self, id: &Bid) -> Option<String>;

    fn resolve_path(&self, path: &str) -> Option<Bid>;

    /// Identifiers of every persisted node, in no particular order.
    fn node_ids(&self) -> Vec<Bid>;

    fn resolver(&self) -> NameResolver;
}

/// Outcome of applying staged states.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub written: Vec<Bid>,
    pub conflicts: Vec<RepositoryError>,
}

pub trait WritableStore: NodeStateStore {
    /// Stage a modified state. The state's `version` must be the version it was read at.
    fn stage(&self, state: NodeState) -> Result<(), RepositoryError>;

    /// Apply all staged states. States whose persisted version moved on since they were read are
    /// reported as conflicts and not written.
    fn flush(&self) -> Result<FlushReport, RepositoryError>;

    /// Drop all staged states.
    fn discard(&self);
}

/// Split a path segment like `name[2]` into its name and same-name-sibling index.
pub fn parse_segment(segment: &str) -> Result<(&str, u32), RepositoryError> {
    match segment.find('[') {
        Some(open) if segment.ends_with(']') => {
            let index = segment[open + 1..segment.len() - 1]
                .parse::<u32>()
                .map_err(|e| {
                    RepositoryError::Custom(format!("Invalid index in path segment '{segment}': {e}"))
                })?;
            if index == 0 {
                return Err(RepositoryError::Custom(format!(
                    "Path segment indices start at 1: '{segment}'"
                )));
            }
            Ok((&segment[..open], index))
        }
        Some(_) => Err(RepositoryError::Custom(format!(
            "Invalid path segment '{segment}'"
        ))),
        None => Ok((segment, 1)),
    }
}

/// Split an absolute path into its parent path and last segment.
fn split_path(path: &str) -> Result<(&str, &str), RepositoryError> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) if pos + 1 < trimmed.len() => {
            let parent = if pos == 0 { "/" } else { &trimmed[..pos] };
            Ok((parent, &trimmed[pos + 1..]))
        }
        _ => Err(RepositoryError::Custom(format!(
            "'{path}' does not name a child of another node"
        ))),
    }
}

#[derive(Debug, Default)]
struct StoreState {
    nodes: BTreeMap<Bid, NodeState>,
}

impl StoreState {
    fn resolve_path(&self, path: &str) -> Option<Bid> {
        let mut current = Bid::root();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let (name, index) = parse_segment(segment).ok()?;
            let node = self.nodes.get(&current)?;
            current = node.children.get(name, index)?.id.canonical()?;
        }
        Some(current)
    }
}

/// In-memory [`WritableStore`]. Cloning shares the underlying node map.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    resolver: NameResolver,
    state: Arc<RwLock<StoreState>>,
    pending: Arc<Mutex<BTreeMap<Bid, NodeState>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::with_resolver(NameResolver::create())
            .expect("NameResolver::create registers the nt namespace")
    }

    /// A store whose root node is typed `nt:unstructured` by `resolver`.
    pub fn with_resolver(resolver: NameResolver) -> Result<Self, RepositoryError> {
        let root_type = resolver.resolve(NT_UNSTRUCTURED)?;
        let mut nodes = BTreeMap::new();
        nodes.insert(
            Bid::root(),
            NodeState::new(NodeId::Canonical(Bid::root()), None, root_type),
        );
        Ok(MemoryStore {
            resolver,
            state: Arc::new(RwLock::new(StoreState { nodes })),
            pending: Arc::new(Mutex::new(BTreeMap::new())),
        })
    }

    /// Create a node at an absolute path whose parent already exists. The identifier is derived
    /// from the parent and the new sibling name, so identical trees get identical ids.
    pub fn add_node(&self, path: &str, node_type: &str) -> Result<Bid, RepositoryError> {
        let (parent_path, name) = split_path(path)?;
        let parent = self
            .resolve_path(parent_path)
            .ok_or_else(|| RepositoryError::NotFound(format!("No parent node at {parent_path}")))?;
        self.add_child(&parent, name, node_type)
    }

    /// Create a named child below `parent`.
    pub fn add_child(
        &self,
        parent: &Bid,
        name: &str,
        node_type: &str,
    ) -> Result<Bid, RepositoryError> {
        let ty = self.resolver.resolve(node_type)?;
        let mut writer = self.state.write();
        let parent_state = writer
            .nodes
            .get_mut(parent)
            .ok_or_else(|| RepositoryError::NoSuchItemState(parent.to_string()))?;
        let mut slot = parent_state
            .children
            .iter()
            .filter(|entry| entry.name == name)
            .count()
            + 1;
        let mut id = Bid::derive(parent, &format!("{name}[{slot}]"));
        // Siblings removed earlier may have left their derived ids to renumbered nodes
        while writer.nodes.contains_key(&id) {
            slot += 1;
            id = Bid::derive(parent, &format!("{name}[{slot}]"));
        }
        let parent_state = writer
            .nodes
            .get_mut(parent)
            .ok_or_else(|| RepositoryError::NoSuchItemState(parent.to_string()))?;
        parent_state.children.push(name, NodeId::Canonical(id));
        parent_state.version += 1;
        writer.nodes.insert(
            id,
            NodeState::new(NodeId::Canonical(id), Some(NodeId::Canonical(*parent)), ty),
        );
        Ok(id)
    }

    /// Write a property directly, bypassing staging. Bumps the node's version.
    pub fn set_property<V: Into<Value>>(
        &self,
        id: &Bid,
        name: &str,
        value: V,
    ) -> Result<(), RepositoryError> {
        let mut writer = self.state.write();
        let state = writer
            .nodes
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NoSuchItemState(id.to_string()))?;
        state.set_property(name, value);
        state.version += 1;
        Ok(())
    }

    pub fn add_mixin(&self, id: &Bid, mixin: &str) -> Result<(), RepositoryError> {
        let mixin = self.resolver.resolve(mixin)?;
        let mut writer = self.state.write();
        let state = writer
            .nodes
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NoSuchItemState(id.to_string()))?;
        if !state.mixins.contains(&mixin) {
            state.mixins.push(mixin);
            state.version += 1;
        }
        Ok(())
    }

    /// Remove a node and its whole subtree.
    pub fn remove_node(&self, id: &Bid) -> Result<(), RepositoryError> {
        if id.is_root() {
            return Err(RepositoryError::Custom(
                "The root node cannot be removed".to_string(),
            ));
        }
        let mut writer = self.state.write();
        let state = writer
            .nodes
            .remove(id)
            .ok_or_else(|| RepositoryError::NoSuchItemState(id.to_string()))?;
        if let Some(parent) = state.parent.and_then(|p| p.canonical()) {
            if let Some(parent_state) = writer.nodes.get_mut(&parent) {
                parent_state.children.remove(&NodeId::Canonical(*id));
                parent_state.version += 1;
            }
        }
        let mut stack = state.children.ids();
        while let Some(child) = stack.pop() {
            if let Some(removed) = child.canonical().and_then(|c| writer.nodes.remove(&c)) {
                stack.extend(removed.children.ids());
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn resolver(&self) -> NameResolver {
        self.resolver.clone()
    }
}

impl NodeStateStore for MemoryStore {
    fn get_node_state(&self, id: &Bid) -> Result<NodeState, RepositoryError> {
        self.state
            .read()
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NoSuchItemState(id.to_string()))
    }

    fn path_of(&self, id: &Bid) -> Option<String> {
        let reader = self.state.read();
        let mut segments = Vec::new();
        let mut current = reader.nodes.get(id)?;
        while let Some(parent_id) = current.parent.and_then(|p| p.canonical()) {
            let parent = reader.nodes.get(&parent_id)?;
            let entry = parent.children.by_id(&current.id)?;
            segments.push(entry.to_string());
            current = parent;
        }
        segments.reverse();
        Some(format!("/{}", segments.join("/")))
    }

    fn resolve_path(&self, path: &str) -> Option<Bid> {
        self.state.read().resolve_path(path)
    }

    fn node_ids(&self) -> Vec<Bid> {
        self.state.read().nodes.keys().copied().collect()
    }

    fn resolver(&self) -> NameResolver {
        self.resolver.clone()
    }
}

impl WritableStore for MemoryStore {
    fn stage(&self, state: NodeState) -> Result<(), RepositoryError> {
        let Some(bid) = state.id.canonical() else {
            return Err(RepositoryError::Custom(format!(
                "Cannot stage virtual node {}",
                state.id
            )));
        };
        self.pending.lock().insert(bid, state);
        Ok(())
    }

    fn flush(&self) -> Result<FlushReport, RepositoryError> {
        let staged = std::mem::take(&mut *self.pending.lock());
        let mut report = FlushReport::default();
        let mut writer = self.state.write();
        for (bid, mut state) in staged {
            let Some(current) = writer.nodes.get_mut(&bid) else {
                report
                    .conflicts
                    .push(RepositoryError::NoSuchItemState(bid.to_string()));
                continue;
            };
            if current.version != state.version {
                tracing::debug!(
                    "[MemoryStore::flush] Version conflict on {bid}: staged {} persisted {}",
                    state.version,
                    current.version
                );
                report.conflicts.push(RepositoryError::Conflict {
                    id: bid.to_string(),
                    expected: state.version,
                    found: current.version,
                });
                continue;
            }
            state.version += 1;
            *current = state;
            report.written.push(bid);
        }
        Ok(report)
    }

    fn discard(&self) {
        self.pending.lock().clear();
    }
}
