//! Name resolution: namespace prefixes, interned qualified names and the node type hierarchy.
//!
//! Every other component addresses node types by [`Name`], a small interned handle produced by a
//! [`NameResolver`]. The resolver also records the supertype graph of node types so that
//! providers can ask "is this a handle?" without string comparisons, via the [`NodeTrait`] set
//! each type carries.

use enumset::{EnumSet, EnumSetType};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::{Display, Formatter},
    sync::Arc,
};

use crate::error::RepositoryError;

pub const NS_JCR: (&str, &str) = ("jcr", "http://www.jcp.org/jcr/1.0");
pub const NS_NT: (&str, &str) = ("nt", "http://www.jcp.org/jcr/nt/1.0");
pub const NS_MIX: (&str, &str) = ("mix", "http://www.jcp.org/jcr/mix/1.0");
pub const NS_HIPPO: (&str, &str) = ("hippo", "http://www.onehippo.org/jcr/hippo/nt/2.0.4");
pub const NS_HIPPOSYS: (&str, &str) = ("hipposys", "http://www.onehippo.org/jcr/hipposys/nt/1.0");

pub const NT_BASE: &str = "nt:base";
pub const NT_UNSTRUCTURED: &str = "nt:unstructured";
pub const MIX_REFERENCEABLE: &str = "mix:referenceable";
pub const HIPPO_DOCUMENT: &str = "hippo:document";
pub const HIPPO_HANDLE: &str = "hippo:handle";
pub const HIPPO_REQUEST: &str = "hippo:request";
pub const HIPPO_TRANSLATION: &str = "hippo:translation";
pub const HIPPO_MIRROR: &str = "hippo:mirror";
pub const HIPPO_FACETSELECT: &str = "hippo:facetselect";
pub const HIPPO_DERIVED: &str = "hippo:derived";
pub const HIPPOSYS_FACETRULE: &str = "hipposys:facetrule";
pub const HIPPOSYS_DERIVATIVES: &str = "hipposys:derivativesfolder";
pub const HIPPOSYS_DERIVATIVE: &str = "hipposys:deriveddefinition";

pub const HIPPO_DOCBASE: &str = "hippo:docbase";
pub const HIPPO_FACETS: &str = "hippo:facets";
pub const HIPPO_VALUES: &str = "hippo:values";
pub const HIPPO_MODES: &str = "hippo:modes";
pub const HIPPO_FILTERED: &str = "hippo:filtered";
pub const HIPPO_RELATED: &str = "hippo:related";

/// Qualified names are either `prefix:local` or a bare local name in the default namespace.
static QNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:([A-Za-z_][A-Za-z0-9_.\-]*):)?([A-Za-z_][A-Za-z0-9_.\-]*)$")
        .expect("static regex")
});

/// Structural roles a node type can play. A type carries the union of the roles of all of its
/// supertypes.
#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, Hash, EnumSetType)]
#[enumset(repr = "u32")]
pub enum NodeTrait {
    /// Container whose children are variants of one logical document
    Handle,
    Document,
    /// Workflow request stored below a handle; never part of a singled view
    Request,
    /// Translation link stored below a handle; exempt from view filtering
    Translation,
    /// Carries a docbase and is virtualized by a provider
    Mirror,
    FacetRule,
    Referenceable,
    /// Carries derived properties maintained by the derived data engine
    Derived,
}

pub type NodeTraits = EnumSet<NodeTrait>;

/// An interned qualified name. Only meaningful together with the [`NameResolver`] that minted it.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name(u32);

impl Name {
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct TypeDefinition {
    supertypes: BTreeSet<Name>,
    traits: NodeTraits,
}

#[derive(Debug, Default)]
struct ResolverState {
    namespaces: BTreeMap<String, String>,
    names: Vec<Arc<str>>,
    lookup: HashMap<Arc<str>, Name>,
    types: BTreeMap<Name, TypeDefinition>,
}

impl ResolverState {
    fn intern(&mut self, qualified: &str) -> Name {
        if let Some(name) = self.lookup.get(qualified) {
            return *name;
        }
        let name = Name(self.names.len() as u32);
        let key: Arc<str> = Arc::from(qualified);
        self.names.push(key.clone());
        self.lookup.insert(key, name);
        name
    }

    fn validate(&self, qualified: &str) -> Result<(), RepositoryError> {
        let Some(captures) = QNAME_RE.captures(qualified) else {
            return Err(RepositoryError::Namespace(format!(
                "'{qualified}' is not a valid qualified name"
            )));
        };
        if let Some(prefix) = captures.get(1) {
            if !self.namespaces.contains_key(prefix.as_str()) {
                return Err(RepositoryError::Namespace(format!(
                    "Unknown namespace prefix '{}' in '{qualified}'",
                    prefix.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Union of the declared traits of `name` and every transitive supertype.
    fn closure_traits(&self, name: Name) -> NodeTraits {
        let mut traits = NodeTraits::new();
        let mut stack = vec![name];
        let mut visited = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(def) = self.types.get(&current) {
                traits |= def.traits;
                stack.extend(def.supertypes.iter().copied());
            }
        }
        traits
    }
}

/// Resolves symbolic names to interned [`Name`]s and tracks node type definitions.
///
/// Cloning is cheap; clones share the same tables.
#[derive(Debug, Clone)]
pub struct NameResolver(Arc<RwLock<ResolverState>>);

impl Default for NameResolver {
    fn default() -> Self {
        NameResolver::create()
    }
}

impl NameResolver {
    /// Create a resolver with the built-in namespaces and node types registered.
    pub fn create() -> Self {
        let resolver = NameResolver(Arc::new(RwLock::new(ResolverState::default())));
        for (prefix, uri) in [NS_JCR, NS_NT, NS_MIX, NS_HIPPO, NS_HIPPOSYS] {
            resolver.register_namespace(prefix, uri);
        }

        let builtin: &[(&str, &[&str], NodeTraits)] = &[
            (NT_BASE, &[], NodeTraits::new()),
            (NT_UNSTRUCTURED, &[NT_BASE], NodeTraits::new()),
            (MIX_REFERENCEABLE, &[], NodeTrait::Referenceable.into()),
            (HIPPO_DOCUMENT, &[NT_BASE, MIX_REFERENCEABLE], NodeTrait::Document.into()),
            (HIPPO_HANDLE, &[NT_BASE, MIX_REFERENCEABLE], NodeTrait::Handle.into()),
            (HIPPO_REQUEST, &[NT_BASE], NodeTrait::Request.into()),
            (HIPPO_TRANSLATION, &[NT_BASE], NodeTrait::Translation.into()),
            (HIPPO_MIRROR, &[NT_BASE], NodeTrait::Mirror.into()),
            (HIPPO_FACETSELECT, &[HIPPO_MIRROR], NodeTraits::new()),
            (HIPPO_DERIVED, &[], NodeTrait::Derived.into()),
            (HIPPOSYS_FACETRULE, &[NT_BASE], NodeTrait::FacetRule.into()),
            (HIPPOSYS_DERIVATIVES, &[NT_BASE], NodeTraits::new()),
            (HIPPOSYS_DERIVATIVE, &[NT_BASE], NodeTraits::new()),
        ];
        for (name, supertypes, traits) in builtin {
            resolver
                .define_type(name, supertypes, *traits)
                .expect("Built-in node types use registered prefixes");
        }
        resolver
    }

    /// Register (or remap) a namespace prefix.
    pub fn register_namespace(&self, prefix: &str, uri: &str) {
        let mut writer = self.0.write();
        if let Some(previous) = writer.namespaces.insert(prefix.to_string(), uri.to_string()) {
            if previous != uri {
                tracing::info!(
                    "[NameResolver::register_namespace] Remapping prefix '{prefix}' from {previous} to {uri}"
                );
            }
        }
    }

    pub fn namespace_uri(&self, prefix: &str) -> Option<String> {
        self.0.read().namespaces.get(prefix).cloned()
    }

    /// Resolve a qualified name, interning it on first use.
    pub fn resolve(&self, qualified: &str) -> Result<Name, RepositoryError> {
        if let Some(name) = self.0.read().lookup.get(qualified) {
            return Ok(*name);
        }
        let mut writer = self.0.write();
        writer.validate(qualified)?;
        Ok(writer.intern(qualified))
    }

    /// Look up an already interned name without interning it.
    pub fn lookup(&self, qualified: &str) -> Option<Name> {
        self.0.read().lookup.get(qualified).copied()
    }

    pub fn qualified(&self, name: Name) -> Option<Arc<str>> {
        self.0.read().names.get(name.0 as usize).cloned()
    }

    /// Qualified form of `name` for log output; never fails.
    pub fn display(&self, name: Name) -> String {
        self.qualified(name)
            .map(|q| q.to_string())
            .unwrap_or_else(|| name.to_string())
    }

    /// Define a node type with its direct supertypes and additional traits. Redefining a type
    /// replaces its previous definition.
    pub fn define_type(
        &self,
        qualified: &str,
        supertypes: &[&str],
        traits: NodeTraits,
    ) -> Result<Name, RepositoryError> {
        let mut writer = self.0.write();
        writer.validate(qualified)?;
        let mut supers = BTreeSet::new();
        for supertype in supertypes {
            writer.validate(supertype)?;
            supers.insert(writer.intern(supertype));
        }
        let name = writer.intern(qualified);
        writer.types.insert(
            name,
            TypeDefinition {
                supertypes: supers,
                traits,
            },
        );
        Ok(name)
    }

    pub fn is_defined(&self, name: Name) -> bool {
        self.0.read().types.contains_key(&name)
    }

    /// Whether `ty` is `expected` or (transitively) derives from it.
    pub fn is_node_type(&self, ty: Name, expected: Name) -> bool {
        if ty == expected {
            return true;
        }
        let reader = self.0.read();
        let mut stack = vec![ty];
        let mut visited = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == expected {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(def) = reader.types.get(&current) {
                stack.extend(def.supertypes.iter().copied());
            }
        }
        false
    }

    pub fn traits(&self, ty: Name) -> NodeTraits {
        self.0.read().closure_traits(ty)
    }

    /// Traits of a node with primary type `ty` and the given mixins.
    pub fn traits_with_mixins(&self, ty: Name, mixins: &[Name]) -> NodeTraits {
        let reader = self.0.read();
        mixins
            .iter()
            .fold(reader.closure_traits(ty), |acc, mixin| {
                acc | reader.closure_traits(*mixin)
            })
    }
}
