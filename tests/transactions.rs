mod common;

use std::sync::Arc;
use std::thread;

use http::Method;

use common::{fixture, fixture_with, ntriples, quad, NT};
use quadgate::action::{Action, RequestDescriptor};
use quadgate::config::{Settings, UploadSettings};
use quadgate::counters::CounterName;
use quadgate::dispatch::{Dispatcher, Services};
use quadgate::engine::UnavailableEngine;
use quadgate::lifecycle::{ActionTxn, TransactionPolicy, TxnState};
use quadgate::memory::{Capability, MemoryStore};
use quadgate::operation::{HandlerSet, Operation, OperationRegistry};
use quadgate::registry::{Dataset, DatasetRegistry};
use quadgate::response::{BufferedResponse, ResponseSink, TRUNCATION_MARKER};
use quadgate::store::TxnMode;

const G: &str = "http://example/g";
const BROKEN: &str = "<http://example/s> <http://example/p> \"ok\" .\n<http://example/s> <http://example/p> broken .\n";

const ALL: [Capability; 3] = [Capability::Full, Capability::NoAbort, Capability::NonTransactional];

#[test]
fn policy_follows_store_capabilities() {
    let cases = [
        (Capability::Full, TransactionPolicy::Full),
        (Capability::NoAbort, TransactionPolicy::Buffered),
        (Capability::NonTransactional, TransactionPolicy::Mutex),
    ];
    for (capability, policy) in cases {
        let dataset = Dataset::new("/x", Arc::new(MemoryStore::with_capability(capability)));
        assert_eq!(dataset.policy(), policy);
    }
}

#[test]
fn invalid_upload_leaves_data_unchanged() {
    for capability in ALL {
        let fx = fixture(capability);
        fx.store.load([quad(Some(G), "http://example/s", "before")]).unwrap();
        let before = fx.store.contents();
        for method in [Method::PUT, Method::POST] {
            let request = RequestDescriptor::new(method.clone(), &format!("/ds/data?graph={G}"))
                .with_content_type(NT)
                .with_body_bytes(BROKEN);
            let res = fx.send(request);
            assert_eq!(res.status().as_u16(), 400, "{capability:?} {method}");
            assert!(res.body_text().contains("line: 2"), "{}", res.body_text());
            assert_eq!(fx.store.contents(), before, "{capability:?} {method}");
        }
    }
}

#[test]
fn invalid_upload_leaves_data_unchanged_when_always_buffering() {
    let settings = Settings { upload: UploadSettings { always_buffer: true }, ..Settings::default() };
    let fx = fixture_with(Capability::Full, settings);
    fx.store.load([quad(Some(G), "http://example/s", "before")]).unwrap();
    let res = fx.send(
        RequestDescriptor::put(&format!("/ds/data?graph={G}"))
            .with_content_type(NT)
            .with_body_bytes(BROKEN),
    );
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(fx.graph(G).len(), 1);
}

#[test]
fn valid_upload_works_under_every_policy() {
    for capability in ALL {
        let fx = fixture(capability);
        let res = fx.send(
            RequestDescriptor::put(&format!("/ds/data?graph={G}"))
                .with_content_type(NT)
                .with_body_bytes(ntriples("http://example/s", 5, "v")),
        );
        assert_eq!(res.status().as_u16(), 201, "{capability:?}");
        assert_eq!(fx.graph(G).len(), 5, "{capability:?}");
    }
}

#[test]
fn failed_update_rolls_back_when_possible() {
    let fx = fixture(Capability::Full);
    let res = fx.send(RequestDescriptor::post("/ds/update?update=FAIL"));
    assert_eq!(res.status().as_u16(), 500);
    assert_eq!(fx.quad_count(), 0);
}

#[test]
fn unparsable_update_never_touches_the_store() {
    for capability in ALL {
        let fx = fixture(capability);
        fx.store.load([quad(None, "http://example/s", "before")]).unwrap();
        let res = fx.send(
            RequestDescriptor::post("/ds/update")
                .with_content_type("application/sparql-update")
                .with_body_bytes("DELETE everything"),
        );
        assert_eq!(res.status().as_u16(), 400, "{capability:?}");
        assert_eq!(fx.quad_count(), 1, "{capability:?}");
        let endpoint = fx.dataset().endpoints_named("update")[0];
        assert_eq!(endpoint.counters().value(CounterName::UpdateExecErrors), Some(1));
    }
}

#[test]
fn update_with_both_parameter_and_body_is_rejected() {
    let fx = fixture(Capability::Full);
    let res = fx.send(
        RequestDescriptor::post("/ds/update?update=FAIL")
            .with_content_type("application/sparql-update")
            .with_body_bytes("FAIL"),
    );
    assert_eq!(res.status().as_u16(), 400);
}

#[test]
fn cancelled_query_after_flush_keeps_status_and_marks_output() {
    let fx = fixture(Capability::Full);
    let res = fx.send(RequestDescriptor::get("/ds/sparql?query=SLOW"));
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.body_text(), format!("row 1\n{TRUNCATION_MARKER}"));
    let endpoint = fx.dataset().endpoints_named("sparql")[0];
    assert_eq!(endpoint.counters().value(CounterName::QueryTimeouts), Some(1));
    assert_eq!(endpoint.counters().value(CounterName::RequestsBad), Some(1));
}

#[test]
fn cancelled_query_before_flush_is_unavailable() {
    let fx = fixture(Capability::Full);
    let res = fx.send(RequestDescriptor::get("/ds/sparql?query=EARLY"));
    assert_eq!(res.status().as_u16(), 503);
    assert!(res.body_text().ends_with(TRUNCATION_MARKER));
}

#[test]
fn upstream_failure_is_bad_gateway() {
    let fx = fixture(Capability::Full);
    let res = fx.send(RequestDescriptor::get("/ds/sparql?query=SERVICE"));
    assert_eq!(res.status().as_u16(), 502);
}

#[test]
fn panicking_handler_is_contained() {
    for capability in ALL {
        let fx = fixture(capability);
        let res = fx.send(RequestDescriptor::get("/ds/sparql?query=PANIC"));
        assert_eq!(res.status().as_u16(), 500, "{capability:?}");
        // The transaction and any lock were released.
        let res = fx.send(
            RequestDescriptor::post("/ds/update?update=INSERT+<http://example/s>+<http://example/p>+<http://example/o>"),
        );
        assert_eq!(res.status().as_u16(), 204, "{capability:?}");
    }
}

#[test]
fn query_timeout_parameter_is_validated() {
    let fx = fixture(Capability::Full);
    let res = fx.send(RequestDescriptor::get("/ds/sparql?query=COUNT&timeout=abc"));
    assert_eq!(res.status().as_u16(), 400);
    let res = fx.send(RequestDescriptor::get("/ds/sparql?query=COUNT&timeout=1.5"));
    assert_eq!(res.status().as_u16(), 200);
}

#[test]
fn action_transaction_is_begun_once_and_ended_once() {
    let dataset = Dataset::new("/x", Arc::new(MemoryStore::new()));
    let mut txn = ActionTxn::new();
    assert_eq!(txn.state(), TxnState::Idle);
    txn.begin(&dataset, TxnMode::Read).unwrap();
    assert!(txn.is_active());
    assert!(txn.begin(&dataset, TxnMode::Read).is_err());
    txn.commit().unwrap();
    assert_eq!(txn.state(), TxnState::Committed);
    txn.end();
    txn.end();
    assert_eq!(txn.state(), TxnState::Ended);
    assert!(txn.handle().is_err());
}

#[test]
fn ending_an_active_write_discards_it() {
    let store = Arc::new(MemoryStore::new());
    let dataset = Dataset::new("/x", Arc::clone(&store) as Arc<dyn quadgate::store::Store>);
    let mut txn = ActionTxn::new();
    txn.begin(&dataset, TxnMode::Write).unwrap();
    txn.handle_mut().unwrap().insert(quad(None, "http://example/s", "lost")).unwrap();
    txn.end();
    assert_eq!(txn.state(), TxnState::Ended);
    assert!(store.contents().is_empty());
}

#[test]
fn readers_never_see_a_half_written_graph() {
    const N: usize = 20;
    // A store without rollback isolates nothing; only these two promise it.
    for capability in [Capability::Full, Capability::NonTransactional] {
        let fx = fixture(capability);
        fx.send(
            RequestDescriptor::put(&format!("/ds/data?graph={G}"))
                .with_content_type(NT)
                .with_body_bytes(ntriples("http://example/s", N, "initial")),
        );
        thread::scope(|scope| {
            let writer = scope.spawn(|| {
                for round in 0..25 {
                    let res = fx.send(
                        RequestDescriptor::put(&format!("/ds/data?graph={G}"))
                            .with_content_type(NT)
                            .with_body_bytes(ntriples("http://example/s", N, &format!("r{round}"))),
                    );
                    assert_eq!(res.status().as_u16(), 200);
                }
            });
            for _ in 0..3 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        let res = fx.send(RequestDescriptor::get(&format!("/ds/get?graph={G}")));
                        assert_eq!(res.status().as_u16(), 200, "{capability:?}");
                        let lines: Vec<String> = res.body_text().lines().map(str::to_string).collect();
                        assert_eq!(lines.len(), N, "{capability:?}");
                        // Every line comes from the same PUT.
                        let tag = |l: &str| l.split('"').nth(1).and_then(|v| v.split('-').next()).map(str::to_string);
                        let first = tag(&lines[0]);
                        assert!(lines.iter().all(|l| tag(l) == first), "{capability:?}");
                    }
                });
            }
            writer.join().unwrap();
        });
    }
}

#[test]
fn oversized_timeout_is_a_bad_request() {
    let fx = fixture(Capability::Full);
    for timeout in ["1e20", "-1", "inf", "NaN"] {
        let res = fx.send(RequestDescriptor::get(&format!("/ds/sparql?query=COUNT&timeout={timeout}")));
        assert_eq!(res.status().as_u16(), 400, "{timeout}");
    }
    let counters = fx.dataset().endpoints_named("sparql")[0].counters();
    assert_eq!(counters.value(CounterName::Requests), Some(4));
    assert_eq!(counters.value(CounterName::RequestsBad), Some(4));
    assert_eq!(counters.value(CounterName::RequestsGood), Some(0));
}

fn exploding_validation(_: &mut Action<'_>) -> quadgate::Result<()> {
    panic!("validation blew up")
}

fn no_op(_: &mut Action<'_>) -> quadgate::Result<()> {
    Ok(())
}

#[test]
fn panicking_validation_is_contained() {
    let mut operations = OperationRegistry::with_defaults();
    let mut query = HandlerSet::new(exploding_validation);
    query.get = Some(no_op);
    operations.register(Operation::Query, None, query);
    let store = Arc::new(MemoryStore::new());
    let dataset = Dataset::new("/ds", store).with_standard_endpoints();
    let services = Services::new(
        Settings::default(),
        DatasetRegistry::new().with_dataset(dataset),
        Arc::new(UnavailableEngine),
    )
    .with_operations(operations);
    let dispatcher = Dispatcher::new(services);

    let mut res = BufferedResponse::new();
    assert!(dispatcher.dispatch(RequestDescriptor::get("/ds/sparql?query=x"), &mut res));
    assert_eq!(res.status().as_u16(), 500);

    let dataset = dispatcher.services().datasets.get("/ds").unwrap();
    let counters = dataset.endpoints_named("sparql")[0].counters();
    assert_eq!(counters.value(CounterName::Requests), Some(1));
    assert_eq!(counters.value(CounterName::RequestsBad), Some(1));
}

#[test]
fn undecodable_upload_is_a_syntax_error() {
    let mut body = b"<http://example/s> <http://example/p> \"ok\" .\n".to_vec();
    body.extend_from_slice(b"<http://example/s> <http://example/p> \"\xFF\xFE\" .\n");
    for capability in ALL {
        let fx = fixture(capability);
        fx.store.load([quad(Some(G), "http://example/s", "before")]).unwrap();
        let before = fx.store.contents();
        let res = fx.send(
            RequestDescriptor::put(&format!("/ds/data?graph={G}"))
                .with_content_type(NT)
                .with_body_bytes(body.clone()),
        );
        assert_eq!(res.status().as_u16(), 400, "{capability:?}");
        assert!(res.body_text().contains("line: 2"), "{}", res.body_text());
        assert_eq!(fx.store.contents(), before, "{capability:?}");
    }
}
