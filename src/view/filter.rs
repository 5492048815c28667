//! Selection of the handle children that satisfy a view's criteria.

use crate::{
    context::ProviderContext,
    error::RepositoryError,
    faceted::{satisfies, FacetQuery},
    properties::{Bid, ChildEntry, NodeState},
};

use super::criteria::ViewCriteria;

/// A regular child of a handle that is still in the running for the view.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Position among all children of the handle
    pub ordinal: usize,
    pub entry: ChildEntry,
    pub state: NodeState,
}

/// Keep the candidates matching the criteria's view map, as answered by the faceted engine, and
/// every facet rule carried by the criteria. Order is preserved.
///
/// Engine answers may come from a shared cache computed against an older child list, so every
/// member is checked against its current state as well.
pub fn retain_matching(
    ctx: &ProviderContext,
    scope: Bid,
    criteria: &ViewCriteria,
    candidates: Vec<Candidate>,
) -> Result<Vec<Candidate>, RepositoryError> {
    let members = match criteria.view().is_empty() {
        true => None,
        false => {
            let query = FacetQuery::new(scope)
                .with_constraints(criteria.view())
                .with_filter(criteria.filter());
            Some(ctx.facets().view(&query)?)
        }
    };

    Ok(candidates
        .into_iter()
        .filter(|candidate| {
            let Some(bits) = members.as_ref() else {
                return true;
            };
            if !bits.contains(candidate.ordinal) {
                return false;
            }
            let current = satisfies(&candidate.state, criteria.view(), criteria.filter());
            if !current {
                tracing::debug!(
                    "[retain_matching] stale member {} of {scope} no longer matches",
                    candidate.entry
                );
            }
            current
        })
        .filter(|candidate| {
            criteria
                .rules()
                .iter()
                .all(|rule| rule.matches(&candidate.state))
        })
        .collect())
}
