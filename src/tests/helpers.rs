//! Shared fixtures for view resolution tests

use crate::{
    config::RepositoryConfig,
    faceted::{CachingFacetedEngine, FacetedEngineCache, StoreFacetedEngine},
    names::{HIPPO_DOCBASE, HIPPO_FACETS, HIPPO_MODES, HIPPO_VALUES},
    properties::Bid,
    provider::{ProviderRegistry, ProviderRegistryBuilder},
    session::Session,
    store::MemoryStore,
    view::{MirrorKind, MirrorProvider},
};
use std::sync::Arc;
use toml::Value;

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub struct Fixture {
    pub store: MemoryStore,
    pub content: Bid,
    pub handle: Bid,
}

/// `/content/news` is a handle holding, in order: a red document, a blue document, a document
/// without color, a request and a translation. `/views` is an empty folder for mirrors.
pub fn content_fixture() -> Fixture {
    init_logging();
    let store = MemoryStore::new();
    let content = store.add_node("/content", "nt:unstructured").unwrap();
    let handle = store.add_node("/content/news", "hippo:handle").unwrap();
    for (color, lang) in [(Some("red"), "en"), (Some("blue"), "nl"), (None, "de")] {
        let doc = store.add_node("/content/news/news", "hippo:document").unwrap();
        store.set_property(&doc, "lang", lang).unwrap();
        if let Some(color) = color {
            store.set_property(&doc, "color", color).unwrap();
        }
    }
    store
        .add_node("/content/news/request", "hippo:request")
        .unwrap();
    store
        .add_node("/content/news/translation", "hippo:translation")
        .unwrap();
    store.add_node("/views", "nt:unstructured").unwrap();
    Fixture {
        store,
        content,
        handle,
    }
}

pub fn strings(values: &[&str]) -> Value {
    Value::Array(values.iter().map(|v| Value::String(v.to_string())).collect())
}

pub fn add_mirror(store: &MemoryStore, path: &str, docbase: &Bid) -> Bid {
    let mirror = store.add_node(path, "hippo:mirror").unwrap();
    store
        .set_property(&mirror, HIPPO_DOCBASE, docbase.to_string())
        .unwrap();
    mirror
}

/// Facetselect with one `(facet, value, mode)` triple per entry.
pub fn add_facetselect(
    store: &MemoryStore,
    path: &str,
    docbase: &Bid,
    triples: &[(&str, &str, &str)],
) -> Bid {
    let select = store.add_node(path, "hippo:facetselect").unwrap();
    store
        .set_property(&select, HIPPO_DOCBASE, docbase.to_string())
        .unwrap();
    let column = |i: usize| {
        strings(
            &triples
                .iter()
                .map(|t| [t.0, t.1, t.2][i])
                .collect::<Vec<_>>(),
        )
    };
    store.set_property(&select, HIPPO_FACETS, column(0)).unwrap();
    store.set_property(&select, HIPPO_VALUES, column(1)).unwrap();
    store.set_property(&select, HIPPO_MODES, column(2)).unwrap();
    select
}

pub fn registry(store: &MemoryStore) -> Arc<ProviderRegistry> {
    ProviderRegistryBuilder::new(store.resolver())
        .register("hippo:mirror", Box::new(MirrorProvider::new(MirrorKind::Mirror)))
        .unwrap()
        .register(
            "hippo:facetselect",
            Box::new(MirrorProvider::new(MirrorKind::FacetSelect)),
        )
        .unwrap()
        .build()
}

/// A caching engine over `store`, for sessions that should share one cache.
pub fn caching_facets(store: &MemoryStore, config: &RepositoryConfig) -> Arc<CachingFacetedEngine> {
    let (bitsets, counts) = config.effective_cache_capacities();
    Arc::new(CachingFacetedEngine::new(
        Arc::new(StoreFacetedEngine::new(Arc::new(store.clone()))),
        Arc::new(FacetedEngineCache::new(bitsets, counts)),
    ))
}

pub fn session_on(
    store: &MemoryStore,
    facets: Arc<CachingFacetedEngine>,
    config: &RepositoryConfig,
) -> Session {
    Session::new(Arc::new(store.clone()), registry(store), facets, config)
}

pub fn session_with(store: &MemoryStore, config: &RepositoryConfig) -> Session {
    session_on(store, caching_facets(store, config), config)
}

pub fn session(store: &MemoryStore) -> Session {
    session_with(store, &RepositoryConfig::default())
}
