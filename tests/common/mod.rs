//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use facetview_core::{
    config::RepositoryConfig,
    faceted::{CachingFacetedEngine, FacetedEngineCache, StoreFacetedEngine},
    properties::Bid,
    provider::ProviderRegistryBuilder,
    session::Session,
    store::MemoryStore,
    view::{MirrorKind, MirrorProvider},
};
use std::sync::Arc;
use toml::Value;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Build the same small repository every time: a `/content/news` handle with a red, a blue and
/// an uncolored document plus a request and a translation, and a facetselect at
/// `/views/<name>` for each given `(name, facet, value, mode)`.
#[allow(dead_code)]
pub fn create_test_repository(selects: &[(&str, &str, &str, &str)]) -> MemoryStore {
    init_logging();
    let store = MemoryStore::new();
    let content = store.add_node("/content", "nt:unstructured").unwrap();
    store.add_node("/content/news", "hippo:handle").unwrap();
    for (color, lang) in [(Some("red"), "en"), (Some("blue"), "nl"), (None, "de")] {
        let doc = store.add_node("/content/news/news", "hippo:document").unwrap();
        store.set_property(&doc, "lang", lang).unwrap();
        if let Some(color) = color {
            store.set_property(&doc, "color", color).unwrap();
        }
    }
    store.add_node("/content/news/request", "hippo:request").unwrap();
    store
        .add_node("/content/news/translation", "hippo:translation")
        .unwrap();
    store.add_node("/views", "nt:unstructured").unwrap();
    for (name, facet, value, mode) in selects {
        add_facetselect(&store, &format!("/views/{name}"), &content, facet, value, mode);
    }
    store
}

#[allow(dead_code)]
pub fn add_facetselect(
    store: &MemoryStore,
    path: &str,
    docbase: &Bid,
    facet: &str,
    value: &str,
    mode: &str,
) -> Bid {
    let select = store.add_node(path, "hippo:facetselect").unwrap();
    let one = |s: &str| Value::Array(vec![Value::String(s.to_string())]);
    store
        .set_property(&select, "hippo:docbase", docbase.to_string())
        .unwrap();
    store.set_property(&select, "hippo:facets", one(facet)).unwrap();
    store.set_property(&select, "hippo:values", one(value)).unwrap();
    store.set_property(&select, "hippo:modes", one(mode)).unwrap();
    select
}

#[allow(dead_code)]
pub fn open_session(store: &MemoryStore, config: &RepositoryConfig) -> Session {
    let registry = ProviderRegistryBuilder::new(store.resolver())
        .register("hippo:mirror", Box::new(MirrorProvider::new(MirrorKind::Mirror)))
        .unwrap()
        .register(
            "hippo:facetselect",
            Box::new(MirrorProvider::new(MirrorKind::FacetSelect)),
        )
        .unwrap()
        .build();
    let (bitsets, counts) = config.effective_cache_capacities();
    let shared = Arc::new(store.clone());
    let facets = Arc::new(CachingFacetedEngine::new(
        Arc::new(StoreFacetedEngine::new(shared.clone())),
        Arc::new(FacetedEngineCache::new(bitsets, counts)),
    ));
    Session::new(shared, registry, facets, config)
}
