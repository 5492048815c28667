use std::collections::{BTreeMap, BTreeSet};
use toml::Value;

use crate::{
    config::DerivedConfig,
    error::RepositoryError,
    names::HIPPO_RELATED,
    properties::{Bid, NodeState},
    store::{FlushReport, NodeStateStore, WritableStore},
};

use super::{
    definition::{load_definitions, DerivativeDefinition},
    dependency::DependencyIndex,
    function::{DerivedInput, FunctionRegistry, Parameters},
};

/// Outcome of a recompute pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DerivedReport {
    /// Paths of the recomputed nodes, in processing order
    pub processed: Vec<String>,
    pub written: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub flushes: usize,
}

impl DerivedReport {
    fn absorb(&mut self, flush: FlushReport) {
        self.flushes += 1;
        self.written += flush.written.len();
        for conflict in &flush.conflicts {
            tracing::warn!("[DerivedDataEngine] skipping node: {conflict}");
        }
        self.conflicts += flush.conflicts.len();
    }
}

/// Recomputes derived properties and their dependency lists after content changes.
pub struct DerivedDataEngine {
    definitions: Vec<DerivativeDefinition>,
    functions: FunctionRegistry,
    dependencies: DependencyIndex,
    config: DerivedConfig,
}

impl DerivedDataEngine {
    /// Load definitions from the store and index existing dependency lists. Fails if any
    /// definition is malformed or names an unknown function.
    pub fn load<S: NodeStateStore>(
        store: &S,
        functions: FunctionRegistry,
        config: DerivedConfig,
    ) -> Result<Self, RepositoryError> {
        let definitions = load_definitions(store, &config.derivatives_path, &functions)?;
        Ok(DerivedDataEngine {
            definitions,
            functions,
            dependencies: DependencyIndex::build(store),
            config,
        })
    }

    pub fn definitions(&self) -> &[DerivativeDefinition] {
        &self.definitions
    }

    pub fn dependencies(&self) -> &DependencyIndex {
        &self.dependencies
    }

    fn definition_for<S: NodeStateStore>(
        &self,
        store: &S,
        state: &NodeState,
    ) -> Option<&DerivativeDefinition> {
        let resolver = store.resolver();
        self.definitions
            .iter()
            .find(|definition| definition.applies_to(state, &resolver))
    }

    /// Derived nodes among `changed` plus the nodes depending on any of them, ordered by path
    /// depth and then path.
    pub fn recompute_set<S: NodeStateStore>(&self, store: &S, changed: &[Bid]) -> Vec<(String, Bid)> {
        let mut candidates = BTreeSet::new();
        for bid in changed {
            candidates.insert(*bid);
            candidates.extend(self.dependencies.dependents(bid));
        }
        let selected = candidates.into_iter().filter(|bid| {
            store
                .get_canonical_node_state(bid)
                .map(|state| self.definition_for(store, &state).is_some())
                .unwrap_or(false)
        });
        ordered(store, selected)
    }

    /// Recompute the nodes affected by `changed`, flushing after every node so later nodes read
    /// the values computed for earlier ones.
    pub fn compute<S: WritableStore>(
        &mut self,
        store: &S,
        changed: &[Bid],
    ) -> Result<DerivedReport, RepositoryError> {
        let mut report = DerivedReport::default();
        for (path, bid) in self.recompute_set(store, changed) {
            if let Err(e) = self.process(store, &path, &bid, &mut report) {
                return Err(abandon(store, e));
            }
            let flush = store.flush()?;
            self.reindex(store, &flush);
            report.absorb(flush);
        }
        Ok(report)
    }

    /// Recompute every derived node, flushing every `batch_threshold` nodes.
    pub fn validate<S: WritableStore>(&mut self, store: &S) -> Result<DerivedReport, RepositoryError> {
        let all = store.node_ids();
        let selected = all.into_iter().filter(|bid| {
            store
                .get_canonical_node_state(bid)
                .map(|state| self.definition_for(store, &state).is_some())
                .unwrap_or(false)
        });
        let work = ordered(store, selected);
        tracing::info!("[DerivedDataEngine::validate] recomputing {} nodes", work.len());

        let threshold = self.config.batch_threshold.max(1);
        let mut report = DerivedReport::default();
        let mut pending = 0;
        for (path, bid) in work {
            if let Err(e) = self.process(store, &path, &bid, &mut report) {
                return Err(abandon(store, e));
            }
            pending += 1;
            if pending >= threshold {
                let flush = store.flush()?;
                self.reindex(store, &flush);
                report.absorb(flush);
                pending = 0;
            }
        }
        if pending > 0 {
            let flush = store.flush()?;
            self.reindex(store, &flush);
            report.absorb(flush);
        }
        Ok(report)
    }

    fn reindex<S: NodeStateStore>(&mut self, store: &S, flush: &FlushReport) {
        for bid in &flush.written {
            if let Some(state) = store.get_canonical_node_state(bid) {
                self.dependencies.update(&state);
            }
        }
    }

    /// Compute one node and stage the result if anything changed.
    fn process<S: WritableStore>(
        &self,
        store: &S,
        path: &str,
        bid: &Bid,
        report: &mut DerivedReport,
    ) -> Result<(), RepositoryError> {
        let Some(state) = store.get_canonical_node_state(bid) else {
            return Ok(());
        };
        let Some(definition) = self.definition_for(store, &state) else {
            return Ok(());
        };
        let function = self.functions.get(&definition.function)?;
        report.processed.push(path.to_string());

        let mut parameters = Parameters::new();
        let mut related = BTreeSet::new();
        for accessor in &definition.accessed {
            let Some(source) = accessor.source_node(&state, store) else {
                continue;
            };
            if let Some(source_bid) = source.id.canonical().filter(|b| b != bid) {
                related.insert(source_bid);
            }
            if let Some(value) = source.property(&accessor.property) {
                parameters.insert(accessor.parameter.clone(), value.clone());
            }
        }

        let input = DerivedInput {
            node: &state,
            store,
            parameters,
        };
        let output = function.compute(&input).map_err(|e| {
            RepositoryError::Configuration(format!(
                "Derived function '{}' failed on {path} ({}): {e}",
                definition.function, definition.source
            ))
        })?;

        let mut next = state.clone();
        apply_outputs(&mut next, definition, &output);
        next.set_property(
            HIPPO_RELATED,
            Value::Array(
                related
                    .iter()
                    .map(|bid| Value::String(bid.to_string()))
                    .collect(),
            ),
        );
        if next == state {
            report.unchanged += 1;
            return Ok(());
        }
        tracing::debug!("[DerivedDataEngine::process] staging {path}");
        store.stage(next)
    }
}

/// Drop whatever the failed pass has staged so a later flush cannot commit part of it.
fn abandon<S: WritableStore>(store: &S, error: RepositoryError) -> RepositoryError {
    tracing::warn!("[DerivedDataEngine] discarding staged states: {error}");
    store.discard();
    error
}

fn apply_outputs(state: &mut NodeState, definition: &DerivativeDefinition, output: &Parameters) {
    for out in &definition.derived {
        match output.get(&out.parameter) {
            Some(value) => state.set_property(&out.property, value.clone()),
            None => {
                state.properties.remove(&out.property);
            }
        }
    }
}

/// Pair each node with its path and sort shallow first, then by path.
fn ordered<S: NodeStateStore>(store: &S, bids: impl Iterator<Item = Bid>) -> Vec<(String, Bid)> {
    let mut keyed: BTreeMap<(usize, String), Bid> = BTreeMap::new();
    for bid in bids {
        let Some(path) = store.path_of(&bid) else {
            continue;
        };
        let depth = path.split('/').filter(|s| !s.is_empty()).count();
        keyed.insert((depth, path), bid);
    }
    keyed
        .into_iter()
        .map(|((_, path), bid)| (path, bid))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        derived::{
            definition::{HIPPOSYS_ACCESSED, HIPPOSYS_CLASSNAME, HIPPOSYS_DERIVED, HIPPOSYS_NODETYPE},
            function::DerivedFunction,
        },
        names::NameResolver,
        store::MemoryStore,
    };
    use std::sync::Arc;
    use test_log::test;

    const DERIVATIVES: &str = "/config/derivatives";

    fn config() -> DerivedConfig {
        DerivedConfig {
            batch_threshold: 2,
            derivatives_path: DERIVATIVES.to_string(),
        }
    }

    /// `hippo:document` nodes copy their parent's title into `parentTitle`.
    fn store_with_definition() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_node("/config", "nt:unstructured").unwrap();
        store
            .add_node(DERIVATIVES, "hipposys:derivativesfolder")
            .unwrap();
        let def = store
            .add_node("/config/derivatives/parent", "hipposys:deriveddefinition")
            .unwrap();
        store.set_property(&def, HIPPOSYS_NODETYPE, "hippo:document").unwrap();
        store.set_property(&def, HIPPOSYS_CLASSNAME, "copy").unwrap();
        store
            .set_property(&def, HIPPOSYS_ACCESSED, Value::Array(vec!["title=../title".into()]))
            .unwrap();
        store
            .set_property(&def, HIPPOSYS_DERIVED, Value::Array(vec!["title=parentTitle".into()]))
            .unwrap();
        store
    }

    #[test]
    fn test_ancestors_are_recomputed_before_descendants() {
        let store = store_with_definition();
        let a = store.add_node("/a", "hippo:document").unwrap();
        let b = store.add_node("/a/b", "hippo:document").unwrap();
        let mut engine = DerivedDataEngine::load(&store, FunctionRegistry::default(), config()).unwrap();

        let report = engine.compute(&store, &[b, a]).unwrap();
        assert_eq!(report.processed, vec!["/a".to_string(), "/a/b".to_string()]);
        assert_eq!(report.conflicts, 0);
    }

    #[test]
    fn test_dependents_are_recomputed_when_their_source_changes() {
        let store = store_with_definition();
        let folder = store.add_node("/folder", "nt:unstructured").unwrap();
        store.set_property(&folder, "title", "Folder").unwrap();
        let doc = store.add_node("/folder/doc", "hippo:document").unwrap();
        let mut engine = DerivedDataEngine::load(&store, FunctionRegistry::default(), config()).unwrap();

        engine.compute(&store, &[doc]).unwrap();
        let state = store.get_node_state(&doc).unwrap();
        assert_eq!(state.string("parentTitle"), Some("Folder"));
        assert_eq!(state.strings(HIPPO_RELATED), Some(vec![folder.to_string()]));

        // The folder is not derived itself, but the document depends on it
        store.set_property(&folder, "title", "Renamed").unwrap();
        let report = engine.compute(&store, &[folder]).unwrap();
        assert_eq!(report.processed, vec!["/folder/doc".to_string()]);
        assert_eq!(
            store.get_node_state(&doc).unwrap().string("parentTitle"),
            Some("Renamed")
        );

        // Nothing changed, nothing is written
        let again = engine.compute(&store, &[folder]).unwrap();
        assert_eq!(again.unchanged, 1);
        assert_eq!(again.written, 0);
    }

    struct Failing;

    impl DerivedFunction for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn compute(&self, _input: &DerivedInput) -> Result<Parameters, RepositoryError> {
            Err(RepositoryError::Custom("no result".to_string()))
        }
    }

    #[test]
    fn test_failed_validate_leaves_nothing_staged() {
        let store = store_with_definition();
        let def = store
            .add_node("/config/derivatives/broken", "hipposys:deriveddefinition")
            .unwrap();
        store.set_property(&def, HIPPOSYS_NODETYPE, "hippo:request").unwrap();
        store.set_property(&def, HIPPOSYS_CLASSNAME, "failing").unwrap();
        store.add_node("/z", "nt:unstructured").unwrap();
        store.add_node("/z/a", "hippo:document").unwrap();
        store.add_node("/z/b", "hippo:request").unwrap();

        let mut functions = FunctionRegistry::default();
        functions.register(Arc::new(Failing));
        let mut engine = DerivedDataEngine::load(
            &store,
            functions,
            DerivedConfig {
                batch_threshold: 100,
                ..config()
            },
        )
        .unwrap();

        let result = engine.validate(&store);
        assert!(matches!(result, Err(RepositoryError::Configuration(_))));
        assert_eq!(store.pending(), 0);
        let a = store.resolve_path("/z/a").unwrap();
        assert!(store.get_node_state(&a).unwrap().property(HIPPO_RELATED).is_none());
    }

    #[test]
    fn test_validate_flushes_in_batches() {
        let store = store_with_definition();
        store.add_node("/docs", "nt:unstructured").unwrap();
        for i in 0..5 {
            store
                .add_node(&format!("/docs/doc{i}"), "hippo:document")
                .unwrap();
        }
        let mut engine = DerivedDataEngine::load(&store, FunctionRegistry::default(), config()).unwrap();
        let report = engine.validate(&store).unwrap();
        assert_eq!(report.processed.len(), 5);
        assert_eq!(report.written, 5);
        assert_eq!(report.flushes, 3);
    }

    /// Simulates a concurrent writer touching every node as soon as it is staged.
    struct ContendedStore(MemoryStore);

    impl NodeStateStore for ContendedStore {
        fn get_node_state(&self, id: &Bid) -> Result<NodeState, RepositoryError> {
            self.0.get_node_state(id)
        }
        fn path_of(&self, id: &Bid) -> Option<String> {
            self.0.path_of(id)
        }
        fn resolve_path(&self, path: &str) -> Option<Bid> {
            self.0.resolve_path(path)
        }
        fn node_ids(&self) -> Vec<Bid> {
            self.0.node_ids()
        }
        fn resolver(&self) -> NameResolver {
            self.0.resolver()
        }
    }

    impl WritableStore for ContendedStore {
        fn stage(&self, state: NodeState) -> Result<(), RepositoryError> {
            if let Some(bid) = state.id.canonical() {
                self.0.set_property(&bid, "touched", true)?;
            }
            self.0.stage(state)
        }
        fn flush(&self) -> Result<FlushReport, RepositoryError> {
            self.0.flush()
        }
        fn discard(&self) {
            self.0.discard()
        }
    }

    #[test]
    fn test_conflicts_are_counted_and_skipped() {
        let store = ContendedStore(store_with_definition());
        let a = store.0.add_node("/a", "hippo:document").unwrap();
        let b = store.0.add_node("/b", "hippo:document").unwrap();
        let mut engine = DerivedDataEngine::load(&store, FunctionRegistry::default(), config()).unwrap();

        let report = engine.compute(&store, &[a, b]).unwrap();
        assert_eq!(report.processed.len(), 2);
        assert_eq!(report.conflicts, 2);
        assert_eq!(report.written, 0);
        assert!(!store.get_node_state(&a).unwrap().has_property(HIPPO_RELATED));
    }
}
