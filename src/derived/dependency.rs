use petgraph::{graphmap::DiGraphMap, Direction};
use std::collections::BTreeSet;

use crate::{
    names::HIPPO_RELATED,
    properties::{Bid, NodeState},
    store::NodeStateStore,
};

use super::function::related_bid;

/// Edges run from a node to the derived nodes that read it while computing their properties.
#[derive(Debug, Default, Clone)]
pub struct DependencyIndex(DiGraphMap<Bid, ()>);

impl DependencyIndex {
    pub fn new() -> Self {
        DependencyIndex(DiGraphMap::new())
    }

    /// Index the dependency lists of every node in the store.
    pub fn build(store: &dyn NodeStateStore) -> Self {
        let mut index = DependencyIndex::new();
        for bid in store.node_ids() {
            if let Some(state) = store.get_canonical_node_state(&bid) {
                index.update(&state);
            }
        }
        index
    }

    pub fn as_graph(&self) -> &DiGraphMap<Bid, ()> {
        &self.0
    }

    /// Replace the recorded dependencies of `state` with its current dependency list.
    pub fn update(&mut self, state: &NodeState) {
        let Some(dependent) = state.id.canonical() else {
            return;
        };
        self.set_dependencies(dependent, &related(state));
    }

    pub fn set_dependencies(&mut self, dependent: Bid, dependencies: &BTreeSet<Bid>) {
        let stale: Vec<Bid> = self
            .0
            .neighbors_directed(dependent, Direction::Incoming)
            .collect();
        for dependency in stale {
            self.0.remove_edge(dependency, dependent);
        }
        for dependency in dependencies {
            if *dependency != dependent {
                self.0.add_edge(*dependency, dependent, ());
            }
        }
    }

    /// Nodes whose dependency list references `changed`.
    pub fn dependents(&self, changed: &Bid) -> BTreeSet<Bid> {
        if !self.0.contains_node(*changed) {
            return BTreeSet::new();
        }
        self.0
            .neighbors_directed(*changed, Direction::Outgoing)
            .collect()
    }
}

/// The dependency list stored on a node.
pub fn related(state: &NodeState) -> BTreeSet<Bid> {
    match state.property(HIPPO_RELATED) {
        Some(toml::Value::Array(values)) => values.iter().filter_map(related_bid).collect(),
        Some(value) => related_bid(value).into_iter().collect(),
        None => BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_dependents_follow_updates() {
        let mut index = DependencyIndex::new();
        let (a, b, derived) = (Bid::new(), Bid::new(), Bid::new());
        index.set_dependencies(derived, &[a, b].into_iter().collect());
        assert!(index.dependents(&a).contains(&derived));
        assert!(index.dependents(&b).contains(&derived));

        index.set_dependencies(derived, &[b].into_iter().collect());
        assert!(index.dependents(&a).is_empty());
        assert_eq!(index.dependents(&b).len(), 1);
        assert!(index.dependents(&Bid::new()).is_empty());
    }
}
