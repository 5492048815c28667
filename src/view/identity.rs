//! View node identities and the arena that interns them.
//!
//! A [`ViewRecord`] names "this canonical node, as seen through this chain of view criteria".
//! Records are interned in a [`ViewArena`]: structurally equal records always map to the same
//! [`ViewId`], so ids can be compared and hashed directly. Parent links are ids into the same
//! arena, which keeps nested views flat and lets chain walks detect cycles with a visited set.

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    fmt::{Display, Formatter},
    sync::atomic::{AtomicU32, Ordering},
};

use crate::{
    names::Name,
    properties::{Bid, NodeId},
};

use super::criteria::ViewCriteria;

static NEXT_ARENA: AtomicU32 = AtomicU32::new(1);

/// Identifies the provider that minted a view node: the node type it is registered against.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(pub Name);

/// Handle of an interned [`ViewRecord`]. Only valid within the arena (and thus the transaction
/// scoped context) that produced it.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId {
    arena: u32,
    slot: u32,
}

impl ViewId {
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

impl Display for ViewId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "view:{}.{}", self.arena, self.slot)
    }
}

/// The structural identity of one view node.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewRecord {
    pub provider: ProviderId,
    /// The (possibly virtual) node this view node is listed under
    pub parent: NodeId,
    /// The canonical node whose content this view node presents
    pub upstream: Bid,
    /// The mirror node whose docbase opened this view
    pub context: Bid,
    pub name: String,
    pub criteria: ViewCriteria,
}

#[derive(Debug)]
pub struct ViewArena {
    id: u32,
    records: Vec<ViewRecord>,
    index: HashMap<ViewRecord, ViewId>,
}

impl Default for ViewArena {
    fn default() -> Self {
        ViewArena::new()
    }
}

impl ViewArena {
    pub fn new() -> Self {
        ViewArena {
            id: NEXT_ARENA.fetch_add(1, Ordering::Relaxed),
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Return the id of `record`, allocating a slot the first time it is seen.
    pub fn intern(&mut self, record: ViewRecord) -> ViewId {
        if let Some(id) = self.index.get(&record) {
            return *id;
        }
        let id = ViewId {
            arena: self.id,
            slot: self.records.len() as u32,
        };
        self.records.push(record.clone());
        self.index.insert(record, id);
        id
    }

    pub fn get(&self, id: &ViewId) -> Option<&ViewRecord> {
        if id.arena != self.id {
            return None;
        }
        self.records.get(id.slot as usize)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `id` followed by every view ancestor reachable through parent links, nearest first. The
    /// walk stops at the first canonical parent, at an unknown id, or when a record repeats.
    pub fn ancestors(&self, id: &ViewId) -> Vec<ViewId> {
        let mut chain = Vec::new();
        let mut visited = BTreeSet::new();
        let mut current = Some(*id);
        while let Some(view) = current {
            if !visited.insert(view) {
                tracing::warn!("[ViewArena::ancestors] Parent chain of {id} loops at {view}");
                break;
            }
            let Some(record) = self.get(&view) else {
                break;
            };
            chain.push(view);
            current = record.parent.view();
        }
        chain
    }

    /// Whether `bid` is presented (as upstream) or opened a view (as context) anywhere along the
    /// chain starting at `id`.
    pub fn chain_contains(&self, id: &ViewId, bid: &Bid) -> bool {
        self.ancestors(id).iter().any(|view| {
            self.get(view)
                .map(|record| &record.upstream == bid || &record.context == bid)
                .unwrap_or(false)
        })
    }

    /// Criteria of the nearest view identity among `id` and `parent`.
    pub fn nearest_criteria(&self, id: &NodeId, parent: Option<&NodeId>) -> Option<&ViewCriteria> {
        [Some(id), parent]
            .into_iter()
            .flatten()
            .filter_map(|node| node.view())
            .find_map(|view| self.get(&view).map(|record| &record.criteria))
    }
}
