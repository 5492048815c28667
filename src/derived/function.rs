//! Computation functions for derived properties, resolved by name from a startup-built registry.

use std::{collections::BTreeMap, sync::Arc};
use toml::Value;

use crate::{
    error::RepositoryError,
    properties::{Bid, NodeState},
    store::NodeStateStore,
};

/// Named values passed into and returned from a [`DerivedFunction`].
pub type Parameters = BTreeMap<String, Value>;

pub struct DerivedInput<'a> {
    pub node: &'a NodeState,
    pub store: &'a dyn NodeStateStore,
    pub parameters: Parameters,
}

pub trait DerivedFunction: Send + Sync {
    /// Name by which definitions refer to the function.
    fn name(&self) -> &'static str;

    fn compute(&self, input: &DerivedInput) -> Result<Parameters, RepositoryError>;
}

/// Returns every input parameter unchanged.
pub struct CopyFunction;

impl DerivedFunction for CopyFunction {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn compute(&self, input: &DerivedInput) -> Result<Parameters, RepositoryError> {
        Ok(input.parameters.clone())
    }
}

/// Returns `ancestors`: identifiers of every canonical ancestor of the node, nearest first.
pub struct AncestorsFunction;

impl DerivedFunction for AncestorsFunction {
    fn name(&self) -> &'static str {
        "ancestors"
    }

    fn compute(&self, input: &DerivedInput) -> Result<Parameters, RepositoryError> {
        let mut ancestors = Vec::new();
        let mut current = input.node.parent.and_then(|p| p.canonical());
        while let Some(bid) = current {
            ancestors.push(Value::String(bid.to_string()));
            current = input
                .store
                .get_canonical_node_state(&bid)
                .and_then(|state| state.parent)
                .and_then(|p| p.canonical());
        }
        let mut output = Parameters::new();
        output.insert("ancestors".to_string(), Value::Array(ancestors));
        Ok(output)
    }
}

/// Returns `count`: the total number of values across all input parameters.
pub struct CountFunction;

impl DerivedFunction for CountFunction {
    fn name(&self) -> &'static str {
        "count"
    }

    fn compute(&self, input: &DerivedInput) -> Result<Parameters, RepositoryError> {
        let count: usize = input
            .parameters
            .values()
            .map(|value| match value {
                Value::Array(values) => values.len(),
                _ => 1,
            })
            .sum();
        let mut output = Parameters::new();
        output.insert("count".to_string(), Value::Integer(count as i64));
        Ok(output)
    }
}

#[derive(Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<&'static str, Arc<dyn DerivedFunction>>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        FunctionRegistry::with_builtins()
    }
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        FunctionRegistry {
            functions: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = FunctionRegistry::empty();
        registry.register(Arc::new(CopyFunction));
        registry.register(Arc::new(AncestorsFunction));
        registry.register(Arc::new(CountFunction));
        registry
    }

    pub fn register(&mut self, function: Arc<dyn DerivedFunction>) {
        if self.functions.insert(function.name(), function.clone()).is_some() {
            tracing::info!(
                "[FunctionRegistry::register] replacing derived function '{}'",
                function.name()
            );
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn DerivedFunction>, RepositoryError> {
        self.functions.get(name).cloned().ok_or_else(|| {
            RepositoryError::Configuration(format!("No derived function registered as '{name}'"))
        })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.functions.keys().copied().collect()
    }
}

/// Parse a dependency list entry.
pub fn related_bid(value: &Value) -> Option<Bid> {
    value.as_str().and_then(|s| Bid::try_from(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use test_log::test;

    #[test]
    fn test_builtins_are_registered_and_missing_names_fail_closed() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["ancestors", "copy", "count"]);
        assert!(matches!(
            registry.get("com.example.Missing"),
            Err(RepositoryError::Configuration(_))
        ));
    }

    #[test]
    fn test_ancestors_and_count() {
        let store = MemoryStore::new();
        let a = store.add_node("/a", "nt:unstructured").unwrap();
        let b = store.add_node("/a/b", "nt:unstructured").unwrap();
        let state = store.get_node_state(&b).unwrap();

        let mut parameters = Parameters::new();
        parameters.insert(
            "tags".to_string(),
            Value::Array(vec!["x".into(), "y".into()]),
        );
        parameters.insert("title".to_string(), "t".into());
        let input = DerivedInput {
            node: &state,
            store: &store,
            parameters,
        };

        let ancestors = AncestorsFunction.compute(&input).unwrap();
        assert_eq!(
            ancestors.get("ancestors"),
            Some(&Value::Array(vec![
                Value::String(a.to_string()),
                Value::String(Bid::root().to_string())
            ]))
        );
        let count = CountFunction.compute(&input).unwrap();
        assert_eq!(count.get("count"), Some(&Value::Integer(3)));
        assert_eq!(CopyFunction.compute(&input).unwrap(), input.parameters);
    }
}
