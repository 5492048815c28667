//! Performance benchmarks for view population
//!
//! Measures resolving facetselect views over a folder of large document handles:
//! - Cold reads, where every session starts with an empty identity arena
//! - Warm reads against a shared faceted engine cache
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use facetview_core::{
    config::RepositoryConfig,
    faceted::{CachingFacetedEngine, FacetedEngineCache, StoreFacetedEngine},
    provider::{ProviderRegistry, ProviderRegistryBuilder},
    session::Session,
    store::MemoryStore,
    view::{MirrorKind, MirrorProvider},
};
use std::sync::Arc;
use toml::Value;

const LANGUAGES: [&str; 4] = ["en", "nl", "de", "fr"];

// `handles` handles of `variants` documents each, plus a singled facetselect over the folder
fn setup_repository(handles: usize, variants: usize) -> MemoryStore {
    let store = MemoryStore::new();
    let content = store.add_node("/content", "nt:unstructured").unwrap();
    for h in 0..handles {
        let handle_path = format!("/content/doc{h}");
        store.add_node(&handle_path, "hippo:handle").unwrap();
        for v in 0..variants {
            let doc = store
                .add_node(&format!("{handle_path}/doc{h}"), "hippo:document")
                .unwrap();
            store
                .set_property(&doc, "lang", LANGUAGES[v % LANGUAGES.len()])
                .unwrap();
            if v % 2 == 0 {
                store.set_property(&doc, "state", "live").unwrap();
            }
        }
    }
    let select = store.add_node("/live", "hippo:facetselect").unwrap();
    let array = |values: &[&str]| Value::Array(values.iter().map(|v| Value::from(*v)).collect());
    store
        .set_property(&select, "hippo:docbase", content.to_string())
        .unwrap();
    store
        .set_property(&select, "hippo:facets", array(&["state", "lang"]))
        .unwrap();
    store
        .set_property(&select, "hippo:values", array(&["live", "de"]))
        .unwrap();
    store
        .set_property(&select, "hippo:modes", array(&["select", "prefer-single"]))
        .unwrap();
    store
}

fn registry(store: &MemoryStore) -> Arc<ProviderRegistry> {
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

fn read_all(session: &mut Session) -> usize {
    let root = session.get_node_by_path("/live").unwrap();
    let mut count = 0;
    for handle in session.children(&root.id).unwrap() {
        count += session.children(&handle.id).unwrap().len();
    }
    count
}

fn bench_view_population(c: &mut Criterion) {
    let config = RepositoryConfig::default();
    let mut group = c.benchmark_group("view_population");

    for handles in [10usize, 100] {
        let store = setup_repository(handles, 8);
        let shared = Arc::new(store.clone());
        let registry = registry(&store);
        let cache = Arc::new(FacetedEngineCache::new(
            config.cache.bitset_capacity,
            config.cache.facet_count_capacity,
        ));

        group.bench_with_input(BenchmarkId::new("cold", handles), &handles, |b, _| {
            b.iter(|| {
                let facets = Arc::new(CachingFacetedEngine::new(
                    Arc::new(StoreFacetedEngine::new(shared.clone())),
                    Arc::new(FacetedEngineCache::default()),
                ));
                let mut session = Session::new(shared.clone(), registry.clone(), facets, &config);
                read_all(&mut session)
            })
        });

        group.bench_with_input(BenchmarkId::new("warm_cache", handles), &handles, |b, _| {
            b.iter(|| {
                let facets = Arc::new(CachingFacetedEngine::new(
                    Arc::new(StoreFacetedEngine::new(shared.clone())),
                    cache.clone(),
                ));
                let mut session = Session::new(shared.clone(), registry.clone(), facets, &config);
                read_all(&mut session)
            })
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_view_population
}
criterion_main!(benches);
