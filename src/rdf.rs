//! RDF syntaxes, parsers and writers.
//!
//! Parsing and serialization are external collaborators; this module only
//! names their interfaces and keeps the registry that maps media types and
//! file extensions to them.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use thiserror::Error;

use crate::FastHasher;
use crate::mediatype::MediaType;
use crate::nquads::{LineParser, LineWriter};
use crate::store::{Quad, StoreError, Triple};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RdfSyntax {
    pub name: String,
    pub media_type: String,
    pub alt_media_types: Vec<String>,
    pub extensions: Vec<String>,
    /// Whether the syntax can carry named graphs.
    pub quads: bool,
}

impl RdfSyntax {
    pub fn new(name: &str, media_type: &str, extensions: &[&str], quads: bool) -> Self {
        Self {
            name: name.to_string(),
            media_type: media_type.to_string(),
            alt_media_types: Vec::new(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            quads,
        }
    }
    pub fn with_alt_media_type(mut self, media_type: &str) -> Self {
        self.alt_media_types.push(media_type.to_string());
        self
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("[line: {line}, col: {col}] {message}")]
    Syntax { message: String, line: u64, col: u64 },
    #[error("I/O error while parsing: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Sink(#[from] StoreError),
}

/// Receives statements as a parser produces them.
pub trait StatementSink {
    fn triple(&mut self, triple: Triple) -> Result<(), StoreError>;
    fn quad(&mut self, quad: Quad) -> Result<(), StoreError>;
}

pub trait RdfParser: Send + Sync {
    fn parse(
        &self,
        input: &mut dyn BufRead,
        base: &str,
        sink: &mut dyn StatementSink,
    ) -> Result<(), ParseError>;
}

pub trait RdfWriter: Send + Sync {
    fn write_triples(&self, out: &mut dyn Write, triples: &[Triple]) -> io::Result<()>;
    fn write_quads(&self, out: &mut dyn Write, quads: &[Quad]) -> io::Result<()>;
}

/// Passes statements through while counting them.
pub struct CountingSink<'a> {
    inner: &'a mut dyn StatementSink,
    triples: u64,
    quads: u64,
}

impl<'a> CountingSink<'a> {
    pub fn new(inner: &'a mut dyn StatementSink) -> Self {
        Self { inner, triples: 0, quads: 0 }
    }
    pub fn triple_count(&self) -> u64 {
        self.triples
    }
    pub fn quad_count(&self) -> u64 {
        self.quads
    }
}

impl StatementSink for CountingSink<'_> {
    fn triple(&mut self, triple: Triple) -> Result<(), StoreError> {
        self.triples += 1;
        self.inner.triple(triple)
    }
    fn quad(&mut self, quad: Quad) -> Result<(), StoreError> {
        self.quads += 1;
        self.inner.quad(quad)
    }
}

struct SyntaxEntry {
    syntax: RdfSyntax,
    parser: Option<Arc<dyn RdfParser>>,
    writer: Option<Arc<dyn RdfWriter>>,
}

#[derive(Default)]
pub struct SyntaxRegistry {
    entries: Vec<SyntaxEntry>,
    by_media_type: HashMap<String, usize, FastHasher>,
}

impl SyntaxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// N-Triples and N-Quads, both readable and writable.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            RdfSyntax::new("N-Triples", "application/n-triples", &["nt"], false)
                .with_alt_media_type("text/plain"),
            Some(Arc::new(LineParser::triples())),
            Some(Arc::new(LineWriter)),
        );
        registry.register(
            RdfSyntax::new("N-Quads", "application/n-quads", &["nq"], true)
                .with_alt_media_type("text/x-nquads"),
            Some(Arc::new(LineParser::quads())),
            Some(Arc::new(LineWriter)),
        );
        registry
    }

    pub fn register(
        &mut self,
        syntax: RdfSyntax,
        parser: Option<Arc<dyn RdfParser>>,
        writer: Option<Arc<dyn RdfWriter>>,
    ) {
        let index = self.entries.len();
        for media_type in std::iter::once(&syntax.media_type).chain(&syntax.alt_media_types) {
            self.by_media_type.insert(media_type.to_ascii_lowercase(), index);
        }
        self.entries.push(SyntaxEntry { syntax, parser, writer });
    }

    fn entry(&self, media_type: &MediaType) -> Option<&SyntaxEntry> {
        self.by_media_type
            .get(&media_type.essence())
            .map(|&i| &self.entries[i])
    }

    pub fn syntax_for(&self, media_type: &MediaType) -> Option<&RdfSyntax> {
        self.entry(media_type).map(|e| &e.syntax)
    }

    pub fn syntax_for_extension(&self, extension: &str) -> Option<&RdfSyntax> {
        self.entries
            .iter()
            .find(|e| e.syntax.extensions.iter().any(|x| x.eq_ignore_ascii_case(extension)))
            .map(|e| &e.syntax)
    }

    pub fn parser(&self, syntax: &RdfSyntax) -> Option<Arc<dyn RdfParser>> {
        self.entries
            .iter()
            .find(|e| e.syntax == *syntax)
            .and_then(|e| e.parser.clone())
    }

    pub fn writer(&self, media_type: &MediaType) -> Option<Arc<dyn RdfWriter>> {
        self.entry(media_type).and_then(|e| e.writer.clone())
    }

    /// Media types that can be written. Graph output may use any syntax,
    /// triples-only syntaxes first; dataset output needs a quads syntax.
    pub fn writable_media_types(&self, quads_only: bool) -> Vec<&str> {
        let writable = self.entries.iter().filter(|e| e.writer.is_some());
        let (quads, triples): (Vec<&SyntaxEntry>, Vec<&SyntaxEntry>) =
            writable.partition(|e| e.syntax.quads);
        let ordered: Vec<&SyntaxEntry> = if quads_only {
            quads
        } else {
            triples.into_iter().chain(quads).collect()
        };
        ordered.into_iter().map(|e| e.syntax.media_type.as_str()).collect()
    }
}
