//! Preferred ordering of view children.

use std::cmp::Ordering;

use crate::properties::NodeState;

use super::{criteria::is_wildcard, filter::Candidate};

/// Whether `state` holds `value` for `facet`. A wildcard preference only asks for the property.
pub fn prefers(state: &NodeState, facet: &str, value: &str) -> bool {
    match state.value_set(facet) {
        None => false,
        Some(_) if is_wildcard(value) => true,
        Some(values) => values.contains(value),
    }
}

/// Compare two candidates by the preference list. Earlier preferences dominate; candidates that
/// tie on every preference keep their original child order.
pub fn compare(a: &Candidate, b: &Candidate, order: &[(String, String)]) -> Ordering {
    for (facet, value) in order {
        match (prefers(&a.state, facet, value), prefers(&b.state, facet, value)) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
    }
    a.ordinal.cmp(&b.ordinal)
}

pub fn sort_by_preference(candidates: &mut [Candidate], order: &[(String, String)]) {
    if order.is_empty() {
        return;
    }
    candidates.sort_by(|a, b| compare(a, b, order));
}
