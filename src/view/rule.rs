//! Persisted facet rules (`hipposys:facetrule`).
//!
//! A rule is a single property test configured on a node: the facet property, the expected
//! value (or a wildcard), whether the test is an equality or an inequality, and whether absence
//! of the property excludes a candidate. Values are resolved once when the rule is read, based
//! on the declared rule type.

use serde::{Deserialize, Serialize};

use crate::{
    error::RepositoryError,
    names::NameResolver,
    properties::{Bid, NodeState},
    store::NodeStateStore,
};

use super::criteria::is_wildcard;

pub const HIPPOSYS_FACET: &str = "hipposys:facet";
pub const HIPPOSYS_VALUE: &str = "hipposys:value";
pub const HIPPOSYS_TYPE: &str = "hipposys:type";
pub const HIPPOSYS_EQUALS: &str = "hipposys:equals";
pub const HIPPOSYS_FILTER: &str = "hipposys:filter";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FacetRuleType {
    String,
    Name,
    /// The configured value is a path or identifier, dereferenced to the target's UUID
    Reference,
}

impl TryFrom<&str> for FacetRuleType {
    type Error = RepositoryError;

    fn try_from(src: &str) -> Result<FacetRuleType, RepositoryError> {
        match &src.trim().to_lowercase()[..] {
            "string" => Ok(FacetRuleType::String),
            "name" => Ok(FacetRuleType::Name),
            "reference" => Ok(FacetRuleType::Reference),
            _ => Err(RepositoryError::Custom(format!(
                "Invalid facet rule type '{src}'. Valid options: String, Name, Reference"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FacetRule {
    pub facet: String,
    /// Resolved expected value; `None` accepts any value
    pub value: Option<String>,
    pub rule_type: FacetRuleType,
    pub equals: bool,
    pub filter: bool,
}

impl FacetRule {
    /// Read and resolve a rule from its configuration node.
    pub fn from_state(
        state: &NodeState,
        resolver: &NameResolver,
        store: &dyn NodeStateStore,
    ) -> Result<FacetRule, RepositoryError> {
        let facet = state.string(HIPPOSYS_FACET).ok_or_else(|| {
            RepositoryError::Custom(format!("Facet rule {} has no {HIPPOSYS_FACET}", state.id))
        })?;
        // Facet names are property names and must use a known prefix
        resolver.resolve(facet)?;

        let rule_type = match state.string(HIPPOSYS_TYPE) {
            Some(ty) => FacetRuleType::try_from(ty)?,
            None => FacetRuleType::String,
        };
        let raw = state.string(HIPPOSYS_VALUE).unwrap_or_default();
        let value = match is_wildcard(raw) {
            true => None,
            false => Some(resolve_value(raw, rule_type, resolver, store)?),
        };

        Ok(FacetRule {
            facet: facet.to_string(),
            value,
            rule_type,
            equals: state.bool(HIPPOSYS_EQUALS).unwrap_or(true),
            filter: state.bool(HIPPOSYS_FILTER).unwrap_or(false),
        })
    }

    /// Whether `candidate` passes this rule.
    pub fn matches(&self, candidate: &NodeState) -> bool {
        let Some(values) = candidate.value_set(&self.facet) else {
            return !self.filter;
        };
        let present = match &self.value {
            None => true,
            Some(expected) => values.contains(expected),
        };
        present == self.equals
    }
}

fn resolve_value(
    raw: &str,
    rule_type: FacetRuleType,
    resolver: &NameResolver,
    store: &dyn NodeStateStore,
) -> Result<String, RepositoryError> {
    match rule_type {
        FacetRuleType::String => Ok(raw.to_string()),
        FacetRuleType::Name => {
            resolver.resolve(raw)?;
            Ok(raw.to_string())
        }
        FacetRuleType::Reference => {
            let target = match raw.starts_with('/') {
                true => store.resolve_path(raw),
                false => Bid::try_from(raw)
                    .ok()
                    .filter(|bid| store.get_canonical_node_state(bid).is_some()),
            };
            target.map(|bid| bid.to_string()).ok_or_else(|| {
                RepositoryError::NotFound(format!("Facet rule reference '{raw}' does not resolve"))
            })
        }
    }
}
