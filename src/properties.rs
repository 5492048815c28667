/// [crate::properties] contains the basic building blocks shared by the store, the providers and
/// the derived data engine: identifiers, node states and their child entry lists.
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
    ops::Deref,
};
use toml::{value::Table, Value};

pub use uuid::Uuid;

use crate::{error::RepositoryError, names::Name, view::ViewId};

/// Identifier of the repository root node. Docbases pointing here are never virtualized.
pub const ROOT_NODE_UUID: Uuid = Uuid::from_bytes([
    0xca, 0xfe, 0xba, 0xbe, 0xca, 0xfe, 0xba, 0xbe, 0xca, 0xfe, 0xba, 0xbe, 0xca, 0xfe, 0xba, 0xbe,
]);

/// Namespace UUID used to derive stable child identifiers from their parent and name.
pub const UUID_NAMESPACE_NODES: Uuid = Uuid::from_bytes([
    0x6b, 0x3d, 0x21, 0x54, 0xc0, 0xa9, 0x43, 0x7b, 0x93, 0x24, 0x5f, 0x62, 0xad, 0xeb, 0x9a, 0x44,
]);

/// Stable identifier of a persisted (canonical) node.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Bid(Uuid);

impl Bid {
    /// A fresh random identifier.
    pub fn new() -> Self {
        Bid(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Bid(Uuid::nil())
    }

    pub fn root() -> Self {
        Bid(ROOT_NODE_UUID)
    }

    /// Deterministically derive an identifier for the child `name` of `parent`. Used by stores
    /// that want reproducible identifiers across runs.
    pub fn derive(parent: &Bid, name: &str) -> Self {
        let mut seed = parent.0.as_bytes().to_vec();
        seed.extend_from_slice(name.as_bytes());
        Bid(Uuid::new_v5(&UUID_NAMESPACE_NODES, &seed))
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_NODE_UUID
    }
}

impl Default for Bid {
    fn default() -> Self {
        Bid::new()
    }
}

impl AsRef<Uuid> for Bid {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for Bid {
    fn from(id: Uuid) -> Self {
        Bid(id)
    }
}

impl TryFrom<&str> for Bid {
    type Error = RepositoryError;

    fn try_from(string: &str) -> Result<Self, Self::Error> {
        Ok(Bid(Uuid::parse_str(string.trim())?))
    }
}

impl Display for Bid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.0.hyphenated().encode_lower(&mut Uuid::encode_buffer())
        )
    }
}

impl From<Bid> for String {
    fn from(val: Bid) -> Self {
        format!("{val}")
    }
}

/// Identifier of any node a session can read: a persisted node, or a view node minted by a
/// virtual provider.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeId {
    Canonical(Bid),
    View(ViewId),
}

impl NodeId {
    pub fn canonical(&self) -> Option<Bid> {
        match self {
            NodeId::Canonical(bid) => Some(*bid),
            NodeId::View(_) => None,
        }
    }

    pub fn view(&self) -> Option<ViewId> {
        match self {
            NodeId::View(view) => Some(*view),
            NodeId::Canonical(_) => None,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, NodeId::View(_))
    }
}

impl From<Bid> for NodeId {
    fn from(bid: Bid) -> Self {
        NodeId::Canonical(bid)
    }
}

impl From<ViewId> for NodeId {
    fn from(view: ViewId) -> Self {
        NodeId::View(view)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeId::Canonical(bid) => write!(f, "{bid}"),
            NodeId::View(view) => write!(f, "{view}"),
        }
    }
}

/// One named, indexed child reference. Same-name siblings are indexed from 1.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChildEntry {
    pub name: String,
    pub index: u32,
    pub id: NodeId,
}

impl Display for ChildEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.index > 1 {
            write!(f, "{}[{}]", self.name, self.index)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Ordered child entry list of a node state.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChildEntries(Vec<ChildEntry>);

impl ChildEntries {
    pub fn new() -> Self {
        ChildEntries(Vec::new())
    }

    /// Append a child, assigning the next same-name-sibling index for `name`.
    pub fn push(&mut self, name: &str, id: NodeId) -> &ChildEntry {
        let index = self.0.iter().filter(|entry| entry.name == name).count() as u32 + 1;
        self.0.push(ChildEntry {
            name: name.to_string(),
            index,
            id,
        });
        &self.0[self.0.len() - 1]
    }

    pub fn get(&self, name: &str, index: u32) -> Option<&ChildEntry> {
        self.0
            .iter()
            .find(|entry| entry.name == name && entry.index == index)
    }

    pub fn by_id(&self, id: &NodeId) -> Option<&ChildEntry> {
        self.0.iter().find(|entry| &entry.id == id)
    }

    pub fn remove(&mut self, id: &NodeId) -> Option<ChildEntry> {
        let position = self.0.iter().position(|entry| &entry.id == id)?;
        let removed = self.0.remove(position);
        // Renumber remaining same-name siblings
        let mut index = 0;
        for entry in self.0.iter_mut().filter(|entry| entry.name == removed.name) {
            index += 1;
            entry.index = index;
        }
        Some(removed)
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.0.iter().map(|entry| entry.id).collect()
    }
}

impl Deref for ChildEntries {
    type Target = [ChildEntry];
    fn deref(&self) -> &[ChildEntry] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a ChildEntries {
    type Item = &'a ChildEntry;
    type IntoIter = std::slice::Iter<'a, ChildEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The state of one node as handed to readers. Canonical states come straight from the store;
/// virtual states are produced by providers and carry a [`NodeId::View`] id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeState {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub node_type: Name,
    #[serde(default)]
    pub mixins: Vec<Name>,
    #[serde(default)]
    pub properties: Table,
    #[serde(default)]
    pub children: ChildEntries,
    /// Modification counter maintained by the write path.
    #[serde(default)]
    pub version: u64,
}

impl NodeState {
    pub fn new(id: NodeId, parent: Option<NodeId>, node_type: Name) -> Self {
        NodeState {
            id,
            parent,
            node_type,
            mixins: Vec::new(),
            properties: Table::new(),
            children: ChildEntries::new(),
            version: 0,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn set_property<V: Into<Value>>(&mut self, name: &str, value: V) {
        self.properties.insert(name.to_string(), value.into());
    }

    /// Single string value of a property. Multi-valued properties yield their first value.
    pub fn string(&self, name: &str) -> Option<&str> {
        match self.property(name)? {
            Value::String(s) => Some(s.as_str()),
            Value::Array(values) => values.first().and_then(|v| v.as_str()),
            _ => None,
        }
    }

    /// All string values of a multi-valued property. A single value yields a one element list.
    /// Returns `None` when the property is absent or holds non-string values.
    pub fn strings(&self, name: &str) -> Option<Vec<String>> {
        match self.property(name)? {
            Value::String(s) => Some(vec![s.clone()]),
            Value::Array(values) => values
                .iter()
                .map(|v| v.as_str().map(|s| s.to_string()))
                .collect(),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.property(name)? {
            Value::Boolean(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// The set of values a facet property holds, rendered as strings. Used for facet matching.
    pub fn value_set(&self, name: &str) -> Option<BTreeSet<String>> {
        let value = self.property(name)?;
        let mut set = BTreeSet::new();
        match value {
            Value::Array(values) => {
                for v in values {
                    set.insert(render_value(v));
                }
            }
            other => {
                set.insert(render_value(other));
            }
        }
        Some(set)
    }
}

/// String form of a scalar property value.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::NameResolver;
    use test_log::test;

    #[test]
    fn test_bid_derive_is_deterministic() {
        let parent = Bid::root();
        assert_eq!(Bid::derive(&parent, "content"), Bid::derive(&parent, "content"));
        assert_ne!(Bid::derive(&parent, "content"), Bid::derive(&parent, "other"));
        let parsed = Bid::try_from("cafebabe-cafe-babe-cafe-babecafebabe").unwrap();
        assert!(parsed.is_root());
        assert!(Bid::try_from("not-a-uuid").is_err());
    }

    #[test]
    fn test_child_entries_same_name_siblings() {
        let mut entries = ChildEntries::new();
        let a = NodeId::Canonical(Bid::new());
        let b = NodeId::Canonical(Bid::new());
        let c = NodeId::Canonical(Bid::new());
        entries.push("doc", a);
        entries.push("other", b);
        entries.push("doc", c);

        assert_eq!(entries.get("doc", 1).unwrap().id, a);
        assert_eq!(entries.get("doc", 2).unwrap().id, c);
        assert_eq!(format!("{}", entries.get("doc", 2).unwrap()), "doc[2]");

        entries.remove(&a);
        assert_eq!(entries.get("doc", 1).unwrap().id, c);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_value_set_renders_scalars_and_arrays() {
        let resolver = NameResolver::create();
        let ty = resolver.resolve("hippo:document").unwrap();
        let mut state = NodeState::new(Bid::new().into(), None, ty);
        state.set_property(
            "color",
            Value::Array(vec![Value::String("red".into()), Value::String("blue".into())]),
        );
        state.set_property("rank", 3i64);

        let colors = state.value_set("color").unwrap();
        assert!(colors.contains("red") && colors.contains("blue"));
        assert_eq!(
            state.value_set("rank").unwrap().into_iter().collect::<Vec<_>>(),
            vec!["3".to_string()]
        );
        assert_eq!(state.string("color"), Some("red"));
        assert!(state.value_set("missing").is_none());
    }
}
