use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{error::RepositoryError, properties::Bid};

/// Facet value → number of matching documents.
pub type FacetValueCounts = BTreeMap<String, u64>;

/// A faceted navigation request: the children of `scope` that satisfy every constraint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FacetQuery {
    pub scope: Bid,
    pub constraints: BTreeMap<String, String>,
    /// Exclude documents lacking a constrained facet
    pub filter: bool,
}

impl FacetQuery {
    pub fn new(scope: Bid) -> Self {
        FacetQuery {
            scope,
            constraints: BTreeMap::new(),
            filter: true,
        }
    }

    pub fn with_constraints(mut self, constraints: &BTreeMap<String, String>) -> Self {
        self.constraints = constraints.clone();
        self
    }

    pub fn with_filter(mut self, filter: bool) -> Self {
        self.filter = filter;
        self
    }

    /// Canonical string form, used to key cached bitsets.
    pub fn cache_key(&self) -> Result<String, RepositoryError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn count_key(&self, facet: &str) -> FacetCountKey {
        let mut parts = vec![KeyPart::Scope(self.scope), KeyPart::Facet(facet.to_string())];
        parts.extend(
            self.constraints
                .iter()
                .map(|(k, v)| KeyPart::Constraint(k.clone(), v.clone())),
        );
        parts.push(KeyPart::Filter(self.filter));
        FacetCountKey(parts)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Scope(Bid),
    Facet(String),
    Constraint(String, String),
    Filter(bool),
}

/// Structural key of a cached facet value count map.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FacetCountKey(pub Vec<KeyPart>);

/// Set of matching documents, addressed by their ordinal among the scope's children.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocBitSet(RoaringBitmap);

impl DocBitSet {
    pub fn new() -> Self {
        DocBitSet::default()
    }

    /// Ordinals beyond `u32::MAX` cannot be addressed and are dropped.
    pub fn insert(&mut self, ordinal: usize) {
        match u32::try_from(ordinal) {
            Ok(ordinal) => {
                self.0.insert(ordinal);
            }
            Err(_) => {
                tracing::warn!("[DocBitSet::insert] ordinal {ordinal} out of range");
            }
        }
    }

    pub fn contains(&self, ordinal: usize) -> bool {
        u32::try_from(ordinal)
            .map(|ordinal| self.0.contains(ordinal))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.0.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().map(|ordinal| ordinal as usize)
    }
}

impl FromIterator<usize> for DocBitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = DocBitSet::new();
        for ordinal in iter {
            set.insert(ordinal);
        }
        set
    }
}
