#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use quadgate::action::RequestDescriptor;
use quadgate::config::Settings;
use quadgate::dispatch::{Dispatcher, Services};
use quadgate::engine::{
    EngineError, ExecContext, PreparedQuery, PreparedUpdate, QueryEngine, QueryResults,
};
use quadgate::memory::{Capability, MemoryStore};
use quadgate::registry::{Dataset, DatasetRegistry};
use quadgate::response::BufferedResponse;
use quadgate::store::{GraphName, Quad, Store, StoreTxn, Term, Triple};

pub const NT: &str = "application/n-triples";
pub const NQ: &str = "application/n-quads";

/// A stand-in engine driven by keywords in the query text.
///
/// Queries: `COUNT` reports the number of quads, `SLOW` writes a line,
/// flushes and is then cancelled, `EARLY` is cancelled before flushing,
/// `SERVICE` fails upstream, `PANIC` panics. Anything else fails to parse.
///
/// Updates: `INSERT <s> <p> <o>` adds a triple to the default graph, `FAIL`
/// adds one and then fails. Anything else fails to parse.
pub struct FakeEngine;

struct FakeQuery(String);
struct FakeUpdate(String);

struct CountResults(usize);
struct CancelledResults {
    flush_first: bool,
}

impl QueryEngine for FakeEngine {
    fn parse_query(&self, text: &str, _base: &str) -> Result<Box<dyn PreparedQuery>, EngineError> {
        let known = ["COUNT", "SLOW", "EARLY", "SERVICE", "PANIC"];
        if known.iter().any(|k| text.contains(k)) {
            Ok(Box::new(FakeQuery(text.to_string())))
        } else {
            Err(EngineError::Parse { message: format!("Unknown query: {text}"), line: 1, col: 1 })
        }
    }
    fn parse_update(&self, text: &str, _base: &str) -> Result<Box<dyn PreparedUpdate>, EngineError> {
        if text.starts_with("INSERT") && text.split_whitespace().count() == 4 || text.starts_with("FAIL") {
            Ok(Box::new(FakeUpdate(text.to_string())))
        } else {
            Err(EngineError::Parse { message: format!("Unknown update: {text}"), line: 1, col: 1 })
        }
    }
}

impl PreparedQuery for FakeQuery {
    fn execute(&self, txn: &dyn StoreTxn, _ctx: &ExecContext) -> Result<Box<dyn QueryResults>, EngineError> {
        if self.0.contains("PANIC") {
            panic!("engine blew up");
        }
        if self.0.contains("SERVICE") {
            return Err(EngineError::Upstream { status: None, message: "remote endpoint down".into() });
        }
        if self.0.contains("SLOW") {
            return Ok(Box::new(CancelledResults { flush_first: true }));
        }
        if self.0.contains("EARLY") {
            return Ok(Box::new(CancelledResults { flush_first: false }));
        }
        Ok(Box::new(CountResults(txn.quads().len())))
    }
}

impl QueryResults for CountResults {
    fn content_type(&self) -> String {
        "text/plain".to_string()
    }
    fn write_to(&mut self, out: &mut dyn Write) -> Result<(), EngineError> {
        writeln!(out, "count={}", self.0)?;
        Ok(())
    }
}

impl QueryResults for CancelledResults {
    fn content_type(&self) -> String {
        "text/plain".to_string()
    }
    fn write_to(&mut self, out: &mut dyn Write) -> Result<(), EngineError> {
        writeln!(out, "row 1")?;
        if self.flush_first {
            out.flush()?;
        }
        Err(EngineError::Cancelled("timeout".into()))
    }
}

fn iri_token(token: &str) -> Term {
    Term::iri(token.trim_start_matches('<').trim_end_matches('>'))
}

impl PreparedUpdate for FakeUpdate {
    fn execute(&self, txn: &mut dyn StoreTxn, _ctx: &ExecContext) -> Result<(), EngineError> {
        if self.0.starts_with("FAIL") {
            txn.insert(quad(None, "http://example/fail", "partial"))?;
            return Err(EngineError::Execution("update failed half way".into()));
        }
        let tokens: Vec<&str> = self.0.split_whitespace().skip(1).collect();
        let triple = Triple::new(iri_token(tokens[0]), iri_token(tokens[1]), iri_token(tokens[2]));
        txn.insert(Quad::new(GraphName::Default, triple))?;
        Ok(())
    }
}

pub fn quad(graph: Option<&str>, subject: &str, value: &str) -> Quad {
    let graph = match graph {
        Some(g) => GraphName::Named(g.to_string()),
        None => GraphName::Default,
    };
    Quad::new(
        graph,
        Triple::new(Term::iri(subject), Term::iri("http://example/p"), Term::literal(value)),
    )
}

/// N-Triples with `n` statements about `subject`, each tagged with `tag`.
pub fn ntriples(subject: &str, n: usize, tag: &str) -> String {
    (0..n)
        .map(|i| format!("<{subject}> <http://example/p> \"{tag}-{i}\" .\n"))
        .collect()
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub dispatcher: Dispatcher,
}

impl Fixture {
    pub fn dataset(&self) -> &Dataset {
        self.dispatcher.services().datasets.get("/ds").expect("dataset registered")
    }

    pub fn send(&self, request: RequestDescriptor) -> BufferedResponse {
        let mut response = BufferedResponse::new();
        assert!(self.dispatcher.dispatch(request, &mut response), "no dataset for request");
        response
    }

    pub fn quad_count(&self) -> usize {
        self.store.contents().len()
    }

    pub fn graph(&self, iri: &str) -> Vec<Triple> {
        self.store.contents().named_graph(iri)
    }
}

pub fn fixture_with(capability: Capability, settings: Settings) -> Fixture {
    let store = Arc::new(MemoryStore::with_capability(capability));
    let dataset = Dataset::new("/ds", Arc::clone(&store) as Arc<dyn Store>).with_standard_endpoints();
    let services = Services::new(
        settings,
        DatasetRegistry::new().with_dataset(dataset),
        Arc::new(FakeEngine),
    );
    Fixture { store, dispatcher: Dispatcher::new(services) }
}

pub fn fixture(capability: Capability) -> Fixture {
    fixture_with(capability, Settings::default())
}
