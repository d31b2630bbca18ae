use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use quadgate::action::RequestDescriptor;
use quadgate::config::Settings;
use quadgate::dispatch::{Dispatcher, Services};
use quadgate::engine::UnavailableEngine;
use quadgate::mediatype::negotiate;
use quadgate::memory::MemoryStore;
use quadgate::registry::{Dataset, DatasetRegistry};
use quadgate::response::BufferedResponse;
use quadgate::store::{GraphName, Quad, Term, Triple};

fn build_dispatcher(store: Arc<MemoryStore>) -> Dispatcher {
    let dataset = Dataset::new("/ds", store).with_standard_endpoints();
    let services = Services::new(
        Settings::default(),
        DatasetRegistry::new().with_dataset(dataset),
        Arc::new(UnavailableEngine),
    );
    Dispatcher::new(services)
}

fn ntriples(n: usize) -> String {
    (0..n)
        .map(|i| format!("<http://example/s{i}> <http://example/p> \"value {i}\" .\n"))
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let store = Arc::new(MemoryStore::new());
    store
        .load((0..1000).map(|i| {
            Quad::new(
                GraphName::Named("http://example/g".into()),
                Triple::new(
                    Term::iri(format!("http://example/s{i}")),
                    Term::iri("http://example/p"),
                    Term::literal(format!("{i}")),
                ),
            )
        }))
        .unwrap();
    let dispatcher = build_dispatcher(Arc::clone(&store));

    // Rejected before any transaction: classification and validation only.
    c.bench_function("dispatch unknown parameter", |b| {
        b.iter(|| {
            let mut res = BufferedResponse::new();
            dispatcher.dispatch(black_box(RequestDescriptor::get("/ds?foo=bar")), &mut res)
        })
    });
    c.bench_function("dispatch graph get 1k", |b| {
        b.iter(|| {
            let mut res = BufferedResponse::new();
            dispatcher.dispatch(
                black_box(RequestDescriptor::get("/ds/get?graph=http://example/g")),
                &mut res,
            )
        })
    });

    let body = ntriples(1000);
    c.bench_function("put graph 1k direct", |b| {
        b.iter(|| {
            let mut res = BufferedResponse::new();
            let put = RequestDescriptor::put("/ds/data?graph=http://example/put")
                .with_content_type("application/n-triples")
                .with_body_bytes(body.clone());
            dispatcher.dispatch(black_box(put), &mut res)
        })
    });
    let buffered = build_dispatcher(Arc::new(MemoryStore::without_abort()));
    c.bench_function("put graph 1k buffered", |b| {
        b.iter(|| {
            let mut res = BufferedResponse::new();
            let put = RequestDescriptor::put("/ds/data?graph=http://example/put")
                .with_content_type("application/n-triples")
                .with_body_bytes(body.clone());
            buffered.dispatch(black_box(put), &mut res)
        })
    });

    let offers = ["application/n-triples", "application/n-quads"];
    c.bench_function("negotiate accept", |b| {
        b.iter(|| {
            negotiate(
                black_box(Some("text/html, application/n-quads;q=0.9, */*;q=0.1")),
                &offers,
            )
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
