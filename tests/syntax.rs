use std::io::Cursor;

use quadgate::config::Settings;
use quadgate::mediatype::{negotiate, MediaType};
use quadgate::nquads::{LineParser, LineWriter};
use quadgate::operation::{Operation, OperationRegistry};
use quadgate::rdf::{ParseError, RdfParser, RdfWriter, StatementSink, SyntaxRegistry};
use quadgate::store::{GraphName, Quad, StoreError, Term, Triple};

#[derive(Default)]
struct Collect {
    triples: Vec<Triple>,
    quads: Vec<Quad>,
}

impl StatementSink for Collect {
    fn triple(&mut self, triple: Triple) -> Result<(), StoreError> {
        self.triples.push(triple);
        Ok(())
    }
    fn quad(&mut self, quad: Quad) -> Result<(), StoreError> {
        self.quads.push(quad);
        Ok(())
    }
}

fn parse(parser: LineParser, text: &str, base: &str) -> Result<Collect, ParseError> {
    let mut sink = Collect::default();
    parser.parse(&mut Cursor::new(text.as_bytes()), base, &mut sink)?;
    Ok(sink)
}

#[test]
fn media_type_parameters() {
    let ct = MediaType::parse("Multipart/Form-Data; boundary=\"a b\"; charset=UTF-8").unwrap();
    assert_eq!(ct.essence(), "multipart/form-data");
    assert!(ct.is_multipart());
    assert_eq!(ct.boundary(), Some("a b"));
    assert_eq!(ct.charset(), Some("UTF-8"));
    assert!(MediaType::parse("text").is_err());
    assert!(MediaType::parse("").is_err());
}

#[test]
fn negotiation_prefers_quality_then_order() {
    let offers = ["application/n-triples", "application/n-quads"];
    assert_eq!(negotiate(None, &offers), Some("application/n-triples"));
    assert_eq!(
        negotiate(Some("application/n-quads, application/n-triples;q=0.5"), &offers),
        Some("application/n-quads")
    );
    assert_eq!(negotiate(Some("application/*;q=0.2, text/html"), &offers), Some("application/n-triples"));
    assert_eq!(negotiate(Some("*/*"), &offers), Some("application/n-triples"));
    assert_eq!(negotiate(Some("application/n-quads;q=0"), &["application/n-quads"]), None);
    assert_eq!(negotiate(Some("text/html"), &offers), None);
}

#[test]
fn ntriples_terms_and_escapes() {
    let text = "# a comment\n\
                <http://example/s> <http://example/p> \"tab\\there \\u00E9\"@EN .\n\
                \n\
                _:b0 <http://example/p> \"5\"^^<http://www.w3.org/2001/XMLSchema#integer> .\n";
    let out = parse(LineParser::triples(), text, "http://base/").unwrap();
    assert_eq!(out.triples.len(), 2);
    assert_eq!(
        out.triples[0].object,
        Term::Literal { value: "tab\there é".into(), datatype: None, language: Some("en".into()) }
    );
    assert_eq!(out.triples[1].subject, Term::BlankNode("b0".into()));
}

#[test]
fn relative_iris_resolve_against_the_base() {
    let out = parse(LineParser::triples(), "<s> <p> <../o> .\n", "http://example/a/b").unwrap();
    assert_eq!(out.triples[0].subject, Term::iri("http://example/a/s"));
    assert_eq!(out.triples[0].object, Term::iri("http://example/o"));
}

#[test]
fn syntax_errors_carry_positions() {
    let err = parse(LineParser::triples(), "<http://example/s> <http://example/p> <http://example/o> .\n\"lit\" <http://example/p> <http://example/o> .\n", "http://b/")
        .err()
        .unwrap();
    match err {
        ParseError::Syntax { line, col, .. } => assert_eq!((line, col), (2, 1)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(parse(LineParser::triples(), "<http://e/s> <http://e/p> <http://e/o> <http://e/g> .\n", "http://b/").is_err());
    assert!(parse(LineParser::triples(), "<http://e/s> <http://e/p> <http://e/o>\n", "http://b/").is_err());
}

#[test]
fn nquads_graph_terms() {
    let text = "<http://e/s> <http://e/p> <http://e/o> <http://e/g> .\n<http://e/s> <http://e/p> <http://e/o> .\n";
    let out = parse(LineParser::quads(), text, "http://b/").unwrap();
    assert_eq!(out.quads.len(), 1);
    assert_eq!(out.quads[0].graph, GraphName::Named("http://e/g".into()));
    assert_eq!(out.triples.len(), 1);
    assert!(parse(LineParser::quads(), "<http://e/s> <http://e/p> <http://e/o> \"g\" .\n", "http://b/").is_err());
}

#[test]
fn written_output_parses_back() {
    let quads = vec![
        Quad::new(
            GraphName::Named("http://e/g".into()),
            Triple::new(Term::iri("http://e/s"), Term::iri("http://e/p"), Term::literal("line\n\"two\"")),
        ),
        Quad::new(
            GraphName::Default,
            Triple::new(Term::BlankNode("x".into()), Term::iri("http://e/p"), Term::iri("http://e/o")),
        ),
    ];
    let mut out = Vec::new();
    LineWriter.write_quads(&mut out, &quads).unwrap();
    let text = String::from_utf8(out).unwrap();
    let parsed = parse(LineParser::quads(), &text, "http://b/").unwrap();
    assert_eq!(parsed.quads, vec![quads[0].clone()]);
    assert_eq!(parsed.triples, vec![quads[1].triple.clone()]);
}

#[test]
fn registry_lookups() {
    let registry = SyntaxRegistry::with_defaults();
    let nt = registry.syntax_for(&MediaType::parse("text/plain; charset=utf-8").unwrap()).unwrap();
    assert_eq!(nt.name, "N-Triples");
    assert!(registry.syntax_for_extension("NQ").unwrap().quads);
    assert!(registry.syntax_for(&MediaType::parse("text/turtle").unwrap()).is_none());
    assert_eq!(registry.writable_media_types(true), vec!["application/n-quads"]);

    let operations = OperationRegistry::with_defaults();
    let update = MediaType::parse("Application/SPARQL-Update; charset=utf-8").unwrap();
    assert_eq!(operations.operation_for_content_type(&update), Some(Operation::Update));
    assert_eq!(operations.content_type_for(Operation::Query), Some("application/sparql-query"));
    assert_eq!(operations.content_type_for(Operation::GspRw), None);
}

#[test]
fn settings_validation() {
    let settings = Settings::default();
    assert!(settings.validate().is_ok());
    assert_eq!(settings.bind_address(), "127.0.0.1:3030");

    let mut bad = Settings::default();
    bad.base_url = "not a url".into();
    assert!(bad.validate().is_err());

    let mut bad = Settings::default();
    bad.query.default_timeout_ms = Some(10_000);
    bad.query.max_timeout_ms = 1_000;
    assert!(bad.validate().is_err());
}
