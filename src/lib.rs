//! # facetview-core
//!
//! A content repository layer that synthesizes virtual ("view") node hierarchies on top of a
//! persisted node tree, and presents them to readers as an ordinary navigable tree.
//!
//! ## Overview
//!
//! A **mirror** node carries a docbase: a reference to another node whose children it presents as
//! its own. A **facetselect** is a mirror that also narrows and orders the variants below each
//! document handle by facet criteria (`hippo:facets`, `hippo:values`, `hippo:modes`). Criteria are
//! inherited by every view node minted below the facetselect, so views compose: a facetselect
//! reached through another facetselect's view applies both selections.
//!
//! View nodes are identified by [`view::ViewId`]s interned in a per-session arena. Structurally
//! equal identities always intern to the same id, so repeated reads of one virtual position are
//! consistent without persisting anything.
//!
//! ## Architecture
//!
//! - **[`names`]**: interned qualified names, namespaces and the node type hierarchy
//! - **[`properties`]**: identifiers (`Bid`, `NodeId`) and node states
//! - **[`store`]**: the node state store boundary and an in-memory store
//! - **[`faceted`]**: faceted navigation engine, bounded result cache
//! - **[`provider`]**: virtual providers and the type → provider registry
//! - **[`view`]**: view identities, criteria, facet rules and the mirror providers
//! - **[`session`]**: read access with virtual nodes resolved transparently
//! - **[`derived`]**: recomputation of derived properties and dependency lists
//! - **[`config`]**: TOML backed repository configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use facetview_core::{
//!     config::RepositoryConfig,
//!     faceted::{CachingFacetedEngine, FacetedEngineCache, StoreFacetedEngine},
//!     provider::ProviderRegistryBuilder,
//!     session::Session,
//!     store::MemoryStore,
//!     view::{MirrorKind, MirrorProvider},
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new();
//!     let content = store.add_node("/content", "nt:unstructured")?;
//!     store.add_node("/content/news", "hippo:handle")?;
//!     let mirror = store.add_node("/mirror", "hippo:mirror")?;
//!     store.set_property(&mirror, "hippo:docbase", content.to_string())?;
//!
//!     let config = RepositoryConfig::default();
//!     let registry = ProviderRegistryBuilder::new(store.resolver())
//!         .register("hippo:mirror", Box::new(MirrorProvider::new(MirrorKind::Mirror)))?
//!         .register("hippo:facetselect", Box::new(MirrorProvider::new(MirrorKind::FacetSelect)))?
//!         .build();
//!     let store = Arc::new(store);
//!     let (bitsets, counts) = config.effective_cache_capacities();
//!     let facets = Arc::new(CachingFacetedEngine::new(
//!         Arc::new(StoreFacetedEngine::new(store.clone())),
//!         Arc::new(FacetedEngineCache::new(bitsets, counts)),
//!     ));
//!
//!     let mut session = Session::new(store, registry, facets, &config);
//!     let news = session.get_node_by_path("/mirror/news")?;
//!     assert!(news.id.is_virtual());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod derived;
pub mod error;
pub mod faceted;
pub mod names;
pub mod properties;
pub mod provider;
pub mod session;
pub mod store;
#[cfg(test)]
mod tests;
pub mod view;

pub use error::*;
