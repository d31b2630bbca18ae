//! Loading RDF into a graph or a whole dataset.
//!
//! A malformed upload never leaves a partial mutation behind. When the store
//! can roll back, data is parsed straight into a write transaction and a
//! parse error aborts it. When it cannot, everything is parsed into an
//! in-memory scratch store first and the destination is only touched once
//! the whole payload is known to be good.

use std::io::{BufRead, BufReader, Cursor, Read};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use serde::Serialize;
use tracing::{debug, info};

use crate::action::Action;
use crate::error::{QuadgateError, Result};
use crate::lifecycle::TransactionPolicy;
use crate::mediatype::MediaType;
use crate::memory::MemoryStore;
use crate::rdf::{CountingSink, RdfParser, RdfSyntax, StatementSink, SyntaxRegistry};
use crate::store::{GraphName, Quad, Store, StoreError, StoreTxn, Triple, TxnMode};
use crate::target::GraphTarget;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub existed_before: bool,
    pub triple_count: u64,
    pub quad_count: u64,
}

/// Where uploaded data lands.
#[derive(Clone)]
pub enum Destination {
    Graph(GraphTarget),
    Dataset(Arc<dyn Store>),
}

impl Destination {
    pub fn store(&self) -> &Arc<dyn Store> {
        match self {
            Destination::Graph(target) => target.store(),
            Destination::Dataset(store) => store,
        }
    }

    /// The same destination over another store.
    pub fn with_store(&self, store: Arc<dyn Store>) -> Self {
        match self {
            Destination::Graph(target) => Destination::Graph(target.with_store(store)),
            Destination::Dataset(_) => Destination::Dataset(store),
        }
    }

    fn graph_name(&self) -> Option<GraphName> {
        match self {
            Destination::Graph(target) => target.graph_name(),
            Destination::Dataset(_) => None,
        }
    }

    fn exists(&self, txn: &dyn StoreTxn) -> bool {
        match self {
            Destination::Graph(target) => target.exists(txn),
            Destination::Dataset(_) => {
                !txn.default_graph().is_empty() || !txn.graph_names().is_empty()
            }
        }
    }

    fn clear(&self, txn: &mut dyn StoreTxn) -> Result<()> {
        match self.graph_name() {
            Some(graph) => txn.clear_graph(&graph)?,
            None => txn.clear()?,
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overwrite {
    /// PUT
    Replace,
    /// POST
    Merge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    BufferAndCopy,
}

impl Strategy {
    pub fn choose(policy: TransactionPolicy, always_buffer: bool) -> Self {
        if policy == TransactionPolicy::Full && !always_buffer {
            Strategy::Direct
        } else {
            Strategy::BufferAndCopy
        }
    }
}

struct Payload {
    name: String,
    syntax: RdfSyntax,
    parser: Arc<dyn RdfParser>,
    body: Box<dyn BufRead + Send>,
}

struct FormPart {
    file_name: String,
    content_type: Option<String>,
    data: Bytes,
}

impl FormPart {
    fn extension(&self) -> Option<&str> {
        self.file_name.rsplit_once('.').map(|(_, ext)| ext)
    }
}

/// Writes parsed statements into a transaction, either all into one graph
/// or, with no graph, as they come.
struct TxnSink<'t> {
    txn: &'t mut dyn StoreTxn,
    graph: Option<GraphName>,
}

impl StatementSink for TxnSink<'_> {
    fn triple(&mut self, triple: Triple) -> std::result::Result<(), StoreError> {
        let graph = self.graph.clone().unwrap_or(GraphName::Default);
        self.txn.insert(Quad::new(graph, triple))
    }
    fn quad(&mut self, quad: Quad) -> std::result::Result<(), StoreError> {
        match &self.graph {
            Some(graph) => self.txn.insert(Quad::new(graph.clone(), quad.triple)),
            None => self.txn.insert(quad),
        }
    }
}

/// Parses the request body (or every file of a multipart form) into
/// `destination`.
pub fn upload(action: &mut Action<'_>, destination: &Destination, overwrite: Overwrite) -> Result<UploadOutcome> {
    let payloads = payloads(action)?;
    if let Destination::Graph(target) = destination {
        if let Some(p) = payloads.iter().find(|p| p.syntax.quads) {
            return Err(QuadgateError::bad_request(format!(
                "{} carries named graphs; it can't be loaded into the {target}",
                p.syntax.name
            )));
        }
    }
    let policy = action.dataset()?.policy();
    let strategy = Strategy::choose(policy, action.services.settings.upload.always_buffer);
    let base = match destination {
        Destination::Graph(target) => target.iri().unwrap_or(action.url.as_str()).to_string(),
        Destination::Dataset(_) => action.url.clone(),
    };
    debug!(id = action.id, ?strategy, ?overwrite, files = payloads.len(), "upload");
    let outcome = match strategy {
        Strategy::Direct => direct(action, destination, overwrite, payloads, &base)?,
        Strategy::BufferAndCopy => buffer_and_copy(action, destination, overwrite, payloads, &base)?,
    };
    info!(
        id = action.id,
        triples = outcome.triple_count,
        quads = outcome.quad_count,
        existed_before = outcome.existed_before,
        "upload complete"
    );
    Ok(outcome)
}

fn direct(
    action: &mut Action<'_>,
    destination: &Destination,
    overwrite: Overwrite,
    payloads: Vec<Payload>,
    base: &str,
) -> Result<UploadOutcome> {
    action.begin_write()?;
    let txn = action.txn.handle_mut()?;
    let existed_before = destination.exists(&*txn);
    if overwrite == Overwrite::Replace {
        destination.clear(&mut *txn)?;
    }
    match parse_into(payloads, base, txn, destination.graph_name()) {
        Ok((triple_count, quad_count)) => {
            action.commit()?;
            Ok(UploadOutcome { existed_before, triple_count, quad_count })
        }
        Err(e) => {
            action.abort()?;
            Err(e)
        }
    }
}

fn buffer_and_copy(
    action: &mut Action<'_>,
    destination: &Destination,
    overwrite: Overwrite,
    payloads: Vec<Payload>,
    base: &str,
) -> Result<UploadOutcome> {
    let scratch = Arc::new(MemoryStore::new());
    let staging = destination.with_store(Arc::clone(&scratch) as Arc<dyn Store>);
    let (triple_count, quad_count) = {
        let mut txn = staging.store().begin(TxnMode::Write)?;
        let counts = parse_into(payloads, base, txn.as_mut(), staging.graph_name())?;
        txn.commit()?;
        counts
    };

    action.begin_write()?;
    let txn = action.txn.handle_mut()?;
    let existed_before = destination.exists(&*txn);
    if overwrite == Overwrite::Replace {
        destination.clear(&mut *txn)?;
    }
    for quad in scratch.contents().quads() {
        txn.insert(quad)?;
    }
    action.commit()?;
    Ok(UploadOutcome { existed_before, triple_count, quad_count })
}

fn parse_into(
    payloads: Vec<Payload>,
    base: &str,
    txn: &mut dyn StoreTxn,
    graph: Option<GraphName>,
) -> Result<(u64, u64)> {
    let mut sink = TxnSink { txn, graph };
    let mut counting = CountingSink::new(&mut sink);
    for mut payload in payloads {
        debug!(file = %payload.name, syntax = %payload.syntax.name, "parsing");
        payload.parser.parse(&mut payload.body, base, &mut counting)?;
    }
    Ok((counting.triple_count(), counting.quad_count()))
}

fn payloads(action: &mut Action<'_>) -> Result<Vec<Payload>> {
    let services = action.services;
    let syntaxes = &services.syntaxes;
    let content_type = action
        .content_type
        .clone()
        .ok_or_else(|| QuadgateError::bad_request("No Content-Type"))?;
    if content_type.is_multipart() {
        if content_type.subtype() != "form-data" {
            return Err(QuadgateError::UnsupportedMediaType(format!(
                "Unsupported multipart type: {}",
                content_type.essence()
            )));
        }
        let boundary = content_type
            .boundary()
            .ok_or_else(|| QuadgateError::bad_request("No boundary in multipart Content-Type"))?
            .to_string();
        let mut body = Vec::new();
        action.take_body()?.read_to_end(&mut body)?;
        if body.is_empty() {
            return Err(QuadgateError::bad_request("Empty body"));
        }
        return form_payloads(syntaxes, body, &boundary);
    }

    let syntax = syntaxes
        .syntax_for(&content_type)
        .cloned()
        .ok_or_else(|| {
            QuadgateError::bad_request(format!("Unknown content type: {}", content_type.essence()))
        })?;
    let parser = parser_for(syntaxes, &syntax)?;
    let mut body = BufReader::new(action.take_body()?);
    if body.fill_buf()?.is_empty() {
        return Err(QuadgateError::bad_request("Empty body"));
    }
    Ok(vec![Payload {
        name: "body".to_string(),
        syntax,
        parser,
        body: Box::new(body),
    }])
}

fn parser_for(syntaxes: &SyntaxRegistry, syntax: &RdfSyntax) -> Result<Arc<dyn RdfParser>> {
    syntaxes.parser(syntax).ok_or_else(|| {
        QuadgateError::UnsupportedMediaType(format!("No parser for {}", syntax.name))
    })
}

// Browsers label most files with one of these; the extension says more.
fn is_generic(content_type: &MediaType) -> bool {
    matches!(
        content_type.essence().as_str(),
        "application/octet-stream" | "text/plain"
    )
}

fn form_payloads(syntaxes: &SyntaxRegistry, body: Vec<u8>, boundary: &str) -> Result<Vec<Payload>> {
    let mut payloads = Vec::new();
    for part in read_form_data(body, boundary)? {
        let declared = part
            .content_type
            .as_deref()
            .and_then(|ct| MediaType::parse(ct).ok())
            .filter(|ct| !is_generic(ct));
        let syntax = declared
            .as_ref()
            .and_then(|ct| syntaxes.syntax_for(ct))
            .or_else(|| part.extension().and_then(|ext| syntaxes.syntax_for_extension(ext)))
            .cloned()
            .ok_or_else(|| {
                QuadgateError::bad_request(format!(
                    "Can't determine the RDF syntax of '{}'",
                    part.file_name
                ))
            })?;
        let parser = parser_for(syntaxes, &syntax)?;
        payloads.push(Payload {
            name: part.file_name,
            syntax,
            parser,
            body: Box::new(Cursor::new(part.data)),
        });
    }
    if payloads.is_empty() {
        return Err(QuadgateError::bad_request("No files in multipart upload"));
    }
    Ok(payloads)
}

fn multipart_error(e: multer::Error) -> QuadgateError {
    QuadgateError::bad_request(format!("Malformed multipart body: {e}"))
}

/// File parts of a `multipart/form-data` body; plain fields are skipped.
fn read_form_data(body: Vec<u8>, boundary: &str) -> Result<Vec<FormPart>> {
    let stream = stream::once(async move { Ok::<Bytes, std::io::Error>(Bytes::from(body)) });
    let mut multipart = multer::Multipart::new(stream, boundary.to_string());
    futures::executor::block_on(async move {
        let mut parts = Vec::new();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(file_name) = field.file_name().map(str::to_string) else {
                continue;
            };
            let content_type = field.content_type().map(|m| m.to_string());
            let data = field.bytes().await.map_err(multipart_error)?;
            parts.push(FormPart { file_name, content_type, data });
        }
        Ok::<_, QuadgateError>(parts)
    })
}
