//! The mirror and facetselect providers.
//!
//! A mirror node carries a docbase referencing another node and presents that node's children
//! as its own. A facetselect additionally narrows and orders the variants below document handles
//! by facet criteria, which are inherited by every view node minted below it.

use std::collections::BTreeSet;

use crate::{
    context::ProviderContext,
    error::RepositoryError,
    names::{
        NameResolver, NodeTrait, HIPPO_DOCBASE, HIPPO_FACETS, HIPPO_FACETSELECT, HIPPO_FILTERED,
        HIPPO_MODES, HIPPO_VALUES,
    },
    properties::{Bid, ChildEntries, NodeId, NodeState},
    provider::VirtualProvider,
};

use super::{
    criteria::{zip_triples, ViewCriteria},
    filter::{retain_matching, Candidate},
    identity::{ProviderId, ViewId, ViewRecord},
    order::sort_by_preference,
    rule::FacetRule,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MirrorKind {
    /// Presents the docbase target's children with the inherited criteria
    Mirror,
    /// Extends the inherited criteria with its own facet selection
    FacetSelect,
}

pub struct MirrorProvider {
    kind: MirrorKind,
    id: Option<ProviderId>,
}

impl MirrorProvider {
    pub const MODULE: &'static str = "facetview_core::view::mirror";

    pub fn new(kind: MirrorKind) -> Self {
        MirrorProvider { kind, id: None }
    }

    pub fn kind(&self) -> MirrorKind {
        self.kind
    }

    fn provider_id(&self) -> Result<ProviderId, RepositoryError> {
        self.id.ok_or_else(|| {
            RepositoryError::Configuration(format!(
                "{:?} provider used before it was registered",
                self.kind
            ))
        })
    }

    /// Criteria for the view opened by `state`, or `None` when the facet selection is malformed.
    fn criteria(
        &self,
        ctx: &mut ProviderContext,
        state: &NodeState,
        source: Bid,
    ) -> Option<ViewCriteria> {
        let inherited = ctx
            .arena()
            .nearest_criteria(&state.id, state.parent.as_ref())
            .cloned()
            .unwrap_or_default();
        if self.kind == MirrorKind::Mirror {
            return Some(inherited);
        }

        let (Some(facets), Some(values), Some(modes)) = (
            state.strings(HIPPO_FACETS),
            state.strings(HIPPO_VALUES),
            state.strings(HIPPO_MODES),
        ) else {
            tracing::warn!(
                "[MirrorProvider::populate] {} lacks one of {HIPPO_FACETS}, {HIPPO_VALUES} or {HIPPO_MODES}",
                state.id
            );
            return None;
        };
        let triples = match zip_triples(&facets, &values, &modes) {
            Ok(triples) => triples,
            Err(e) => {
                tracing::warn!("[MirrorProvider::populate] {}: {e}", state.id);
                return None;
            }
        };

        let rules = read_rules(ctx, source);
        let mut criteria = inherited.extend(&triples).with_rules(&rules);
        if let Some(filter) = state.bool(HIPPO_FILTERED) {
            criteria = criteria.with_filter(filter);
        }
        Some(criteria)
    }

    /// Whether opening a view on `target` from `state` would revisit a node already presented
    /// higher up in the same view chain.
    fn revisits(&self, ctx: &mut ProviderContext, state: &NodeState, source: Bid, target: Bid) -> bool {
        if target == source {
            return true;
        }
        let Some(view) = state.id.view().or_else(|| state.parent.and_then(|p| p.view())) else {
            return false;
        };
        if ctx.arena().chain_contains(&view, &target) {
            return true;
        }
        let contexts: BTreeSet<Bid> = ctx
            .arena()
            .ancestors(&view)
            .iter()
            .filter_map(|ancestor| ctx.record(ancestor).map(|record| record.context))
            .collect();
        contexts.into_iter().any(|context| {
            ctx.canonical(&context)
                .and_then(|mirror| mirror.string(HIPPO_DOCBASE).map(str::trim).map(String::from))
                .and_then(|docbase| Bid::try_from(docbase.as_str()).ok())
                .map(|opened| opened == target)
                .unwrap_or(false)
        })
    }
}

/// The canonical node a (possibly virtual) state presents.
fn canonical_source(ctx: &ProviderContext, state: &NodeState) -> Option<Bid> {
    match state.id {
        NodeId::Canonical(bid) => Some(bid),
        NodeId::View(view) => ctx.record(&view).map(|record| record.upstream),
    }
}

/// Facet rules configured as children of the facetselect node `source`. Rules that cannot be
/// resolved are logged and skipped.
fn read_rules(ctx: &mut ProviderContext, source: Bid) -> Vec<FacetRule> {
    let Some(facetselect) = ctx.canonical(&source) else {
        return Vec::new();
    };
    let mut rules = Vec::new();
    for child in facetselect.children.ids() {
        let Some(state) = child.canonical().and_then(|bid| ctx.canonical(&bid)) else {
            continue;
        };
        if !ctx.traits(&state).contains(NodeTrait::FacetRule) {
            continue;
        }
        match FacetRule::from_state(&state, ctx.resolver(), ctx.store().as_ref()) {
            Ok(rule) => rules.push(rule),
            Err(e) => tracing::warn!("[MirrorProvider::read_rules] Skipping rule {}: {e}", state.id),
        }
    }
    rules
}

/// Child entries of the view of `target` listed under `parent`.
///
/// Children of a document handle are narrowed to the variants satisfying `criteria` and ordered
/// by its preferences. Translations are exempt from both, and are only listed when at least one
/// variant is. Any other node lists all of its children in their natural order.
pub fn derive_children(
    ctx: &mut ProviderContext,
    provider: ProviderId,
    parent: NodeId,
    target: &NodeState,
    context: Bid,
    criteria: &ViewCriteria,
) -> Result<ChildEntries, RepositoryError> {
    let mut children = ChildEntries::new();
    let Some(scope) = target.id.canonical() else {
        return Err(RepositoryError::Custom(format!(
            "Views can only be opened on canonical nodes, not {}",
            target.id
        )));
    };
    let mint = |ctx: &mut ProviderContext, children: &mut ChildEntries, name: &str, upstream: Bid| {
        let id = ctx.intern(ViewRecord {
            provider,
            parent,
            upstream,
            context,
            name: name.to_string(),
            criteria: criteria.clone(),
        });
        children.push(name, NodeId::View(id));
    };

    if !ctx.traits(target).contains(NodeTrait::Handle) {
        for entry in target.children.iter() {
            if let Some(upstream) = entry.id.canonical() {
                mint(ctx, &mut children, &entry.name, upstream);
            }
        }
        return Ok(children);
    }

    let mut translations = Vec::new();
    let mut candidates = Vec::new();
    for (ordinal, entry) in target.children.iter().enumerate() {
        let Some(state) = entry.id.canonical().and_then(|bid| ctx.canonical(&bid)) else {
            continue;
        };
        let traits = ctx.traits(&state);
        if traits.contains(NodeTrait::Translation) {
            translations.push(entry.clone());
            continue;
        }
        if traits.contains(NodeTrait::Request) && criteria.is_singled() {
            continue;
        }
        candidates.push(Candidate {
            ordinal,
            entry: entry.clone(),
            state,
        });
    }

    let mut survivors = retain_matching(ctx, scope, criteria, candidates)?;
    sort_by_preference(&mut survivors, criteria.order());
    if criteria.is_singled() {
        survivors.truncate(1);
    }

    let listed_variant = !survivors.is_empty();
    for candidate in survivors {
        if let Some(upstream) = candidate.entry.id.canonical() {
            mint(ctx, &mut children, &candidate.entry.name, upstream);
        }
    }
    if listed_variant {
        for entry in translations {
            if let Some(upstream) = entry.id.canonical() {
                mint(ctx, &mut children, &entry.name, upstream);
            }
        }
    }
    Ok(children)
}

impl VirtualProvider for MirrorProvider {
    fn module_name(&self) -> &'static str {
        MirrorProvider::MODULE
    }

    fn initialize(&mut self, resolver: &NameResolver, id: ProviderId) -> Result<(), RepositoryError> {
        resolver.resolve(HIPPO_DOCBASE)?;
        if self.kind == MirrorKind::FacetSelect {
            for name in [HIPPO_FACETS, HIPPO_VALUES, HIPPO_MODES, HIPPO_FILTERED] {
                resolver.resolve(name)?;
            }
        }
        self.id = Some(id);
        Ok(())
    }

    fn populate(
        &self,
        ctx: &mut ProviderContext,
        mut state: NodeState,
    ) -> Result<NodeState, RepositoryError> {
        let provider = self.provider_id()?;
        let Some(docbase) = state.string(HIPPO_DOCBASE).map(str::trim) else {
            return Ok(state);
        };
        if docbase.is_empty() || ctx.config().is_ignored(docbase) {
            return Ok(state);
        }
        let target_bid = match Bid::try_from(docbase) {
            Ok(bid) => bid,
            Err(e) => {
                tracing::warn!(
                    "[MirrorProvider::populate] {} has malformed docbase '{docbase}': {e}",
                    state.id
                );
                return Ok(state);
            }
        };
        if target_bid.is_root() {
            return Ok(state);
        }
        let Some(target) = ctx.canonical(&target_bid) else {
            tracing::debug!(
                "[MirrorProvider::populate] docbase {target_bid} of {} does not resolve",
                state.id
            );
            return Ok(state);
        };
        let Some(source) = canonical_source(ctx, &state) else {
            return Ok(state);
        };

        let Some(criteria) = self.criteria(ctx, &state, source) else {
            return Ok(state);
        };
        if self.kind == MirrorKind::FacetSelect && ctx.is_exactly(&target, HIPPO_FACETSELECT) {
            tracing::warn!(
                "[MirrorProvider::populate] {} refers to facetselect {target_bid}; not virtualizing",
                state.id
            );
            return Ok(state);
        }
        if ctx.config().cycle_detection && self.revisits(ctx, &state, source, target_bid) {
            tracing::warn!(
                "[MirrorProvider::populate] {} would reopen {target_bid} inside its own view",
                state.id
            );
            return Ok(state);
        }

        tracing::debug!(
            "[MirrorProvider::populate] {} -> {target_bid} ({} children)",
            state.id,
            target.children.len()
        );
        state.children = derive_children(ctx, provider, state.id, &target, source, &criteria)?;
        Ok(state)
    }

    fn populate_view(
        &self,
        ctx: &mut ProviderContext,
        view: ViewId,
    ) -> Result<NodeState, RepositoryError> {
        let record = ctx
            .record(&view)
            .cloned()
            .ok_or_else(|| RepositoryError::NoSuchItemState(view.to_string()))?;
        let upstream = ctx
            .canonical(&record.upstream)
            .ok_or_else(|| RepositoryError::NoSuchItemState(record.upstream.to_string()))?;

        let mut state = upstream.clone();
        state.id = NodeId::View(view);
        state.parent = Some(record.parent);
        state.children = derive_children(
            ctx,
            record.provider,
            state.id,
            &upstream,
            record.context,
            &record.criteria,
        )?;
        Ok(state)
    }
}
