//! Derivative definitions read from configuration nodes.
//!
//! A definition binds a node type to a function. `hipposys:accessed` lists the function's input
//! parameters as `parameter=source`, where the source is a property of the node itself or, with
//! a relative path such as `../title` or `meta/title`, of another node. `hipposys:derived` lists
//! the outputs as `parameter=property`.

use crate::{
    error::RepositoryError,
    names::{Name, NameResolver, HIPPOSYS_DERIVATIVE},
    properties::{Bid, NodeState},
    store::{parse_segment, NodeStateStore},
};

use super::function::FunctionRegistry;

pub const HIPPOSYS_NODETYPE: &str = "hipposys:nodetype";
pub const HIPPOSYS_CLASSNAME: &str = "hipposys:classname";
pub const HIPPOSYS_ACCESSED: &str = "hipposys:accessed";
pub const HIPPOSYS_DERIVED: &str = "hipposys:derived";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Accessor {
    pub parameter: String,
    /// Relative path segments to the node holding the property; empty for the node itself
    pub path: Vec<String>,
    pub property: String,
}

impl Accessor {
    fn parse(entry: &str, definition: &str) -> Result<Accessor, RepositoryError> {
        let (parameter, source) = split_assignment(entry, definition)?;
        let mut segments: Vec<String> = source.split('/').map(String::from).collect();
        let property = segments.pop().unwrap_or_default();
        if property.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(RepositoryError::Configuration(format!(
                "Malformed source '{source}' in derivative definition {definition}"
            )));
        }
        Ok(Accessor {
            parameter,
            path: segments,
            property,
        })
    }

    /// The node the source property lives on, if it exists.
    pub fn source_node(
        &self,
        node: &NodeState,
        store: &dyn NodeStateStore,
    ) -> Option<NodeState> {
        let mut current = node.clone();
        for segment in &self.path {
            current = match segment.as_str() {
                "." => current,
                ".." => store.get_canonical_node_state(&current.parent?.canonical()?)?,
                name => {
                    let (name, index) = parse_segment(name).ok()?;
                    let child: Bid = current.children.get(name, index)?.id.canonical()?;
                    store.get_canonical_node_state(&child)?
                }
            };
        }
        Some(current)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output {
    pub parameter: String,
    pub property: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivativeDefinition {
    /// Path of the configuration node, for diagnostics
    pub source: String,
    pub node_type: Name,
    pub function: String,
    pub accessed: Vec<Accessor>,
    pub derived: Vec<Output>,
}

impl DerivativeDefinition {
    pub fn from_state(
        state: &NodeState,
        source: &str,
        resolver: &NameResolver,
        functions: &FunctionRegistry,
    ) -> Result<DerivativeDefinition, RepositoryError> {
        let required = |property: &str| {
            state.string(property).map(String::from).ok_or_else(|| {
                RepositoryError::Configuration(format!(
                    "Derivative definition {source} lacks {property}"
                ))
            })
        };
        let node_type = resolver.resolve(&required(HIPPOSYS_NODETYPE)?).map_err(|e| {
            RepositoryError::Configuration(format!("Derivative definition {source}: {e}"))
        })?;
        let function = required(HIPPOSYS_CLASSNAME)?;
        functions.get(&function)?;

        let accessed = state
            .strings(HIPPOSYS_ACCESSED)
            .unwrap_or_default()
            .iter()
            .map(|entry| Accessor::parse(entry, source))
            .collect::<Result<Vec<_>, _>>()?;
        let derived = state
            .strings(HIPPOSYS_DERIVED)
            .unwrap_or_default()
            .iter()
            .map(|entry| {
                split_assignment(entry, source)
                    .map(|(parameter, property)| Output { parameter, property })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DerivativeDefinition {
            source: source.to_string(),
            node_type,
            function,
            accessed,
            derived,
        })
    }

    /// Whether this definition applies to `state`, by primary type or mixin.
    pub fn applies_to(&self, state: &NodeState, resolver: &NameResolver) -> bool {
        std::iter::once(&state.node_type)
            .chain(state.mixins.iter())
            .any(|ty| resolver.is_node_type(*ty, self.node_type))
    }
}

fn split_assignment(entry: &str, definition: &str) -> Result<(String, String), RepositoryError> {
    match entry.split_once('=') {
        Some((left, right)) if !left.trim().is_empty() && !right.trim().is_empty() => {
            Ok((left.trim().to_string(), right.trim().to_string()))
        }
        _ => Err(RepositoryError::Configuration(format!(
            "Malformed entry '{entry}' in derivative definition {definition}; expected name=value"
        ))),
    }
}

/// Read every definition below `path`. A missing folder means no definitions.
pub fn load_definitions(
    store: &dyn NodeStateStore,
    path: &str,
    functions: &FunctionRegistry,
) -> Result<Vec<DerivativeDefinition>, RepositoryError> {
    let Some(folder) = store.resolve_path(path) else {
        tracing::debug!("[load_definitions] no derivatives folder at {path}");
        return Ok(Vec::new());
    };
    let resolver = store.resolver();
    let folder = store.get_node_state(&folder)?;
    let mut definitions = Vec::new();
    for entry in folder.children.iter() {
        let Some(state) = entry
            .id
            .canonical()
            .and_then(|bid| store.get_canonical_node_state(&bid))
        else {
            continue;
        };
        if resolver.qualified(state.node_type).as_deref() != Some(HIPPOSYS_DERIVATIVE) {
            continue;
        }
        let source = format!("{}/{entry}", path.trim_end_matches('/'));
        definitions.push(DerivativeDefinition::from_state(
            &state, &source, &resolver, functions,
        )?);
    }
    tracing::debug!(
        "[load_definitions] loaded {} derivative definitions from {path}",
        definitions.len()
    );
    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use test_log::test;

    fn definition_store(entries: &[(&str, toml::Value)]) -> MemoryStore {
        let store = MemoryStore::new();
        store.add_node("/config", "nt:unstructured").unwrap();
        store
            .add_node("/config/derivatives", "hipposys:derivativesfolder")
            .unwrap();
        let def = store
            .add_node("/config/derivatives/news", "hipposys:deriveddefinition")
            .unwrap();
        for (k, v) in entries {
            store.set_property(&def, k, v.clone()).unwrap();
        }
        store
    }

    #[test]
    fn test_load_definition() {
        let store = definition_store(&[
            (HIPPOSYS_NODETYPE, "hippo:document".into()),
            (HIPPOSYS_CLASSNAME, "copy".into()),
            (
                HIPPOSYS_ACCESSED,
                toml::Value::Array(vec!["title=../title".into(), "own=summary".into()]),
            ),
            (HIPPOSYS_DERIVED, toml::Value::Array(vec!["title=derivedTitle".into()])),
        ]);
        let defs =
            load_definitions(&store, "/config/derivatives", &FunctionRegistry::default()).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].function, "copy");
        assert_eq!(defs[0].accessed[0].path, vec!["..".to_string()]);
        assert_eq!(defs[0].accessed[1].property, "summary");
        assert_eq!(defs[0].derived[0].property, "derivedTitle");
        assert_eq!(defs[0].source, "/config/derivatives/news");
    }

    #[test]
    fn test_broken_definitions_fail_closed() {
        let unknown_function = definition_store(&[
            (HIPPOSYS_NODETYPE, "hippo:document".into()),
            (HIPPOSYS_CLASSNAME, "org.example.Gone".into()),
        ]);
        assert!(matches!(
            load_definitions(&unknown_function, "/config/derivatives", &FunctionRegistry::default()),
            Err(RepositoryError::Configuration(_))
        ));

        let malformed = definition_store(&[
            (HIPPOSYS_NODETYPE, "hippo:document".into()),
            (HIPPOSYS_CLASSNAME, "copy".into()),
            (HIPPOSYS_ACCESSED, toml::Value::Array(vec!["no-assignment".into()])),
        ]);
        assert!(matches!(
            load_definitions(&malformed, "/config/derivatives", &FunctionRegistry::default()),
            Err(RepositoryError::Configuration(_))
        ));

        let missing_type = definition_store(&[(HIPPOSYS_CLASSNAME, "copy".into())]);
        assert!(load_definitions(&missing_type, "/config/derivatives", &FunctionRegistry::default())
            .is_err());

        assert!(load_definitions(&MemoryStore::new(), "/nowhere", &FunctionRegistry::default())
            .unwrap()
            .is_empty());
    }
}
