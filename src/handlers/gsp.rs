//! Graph store protocol, for single graphs and for whole datasets.

use std::sync::Arc;

use http::StatusCode;
use http::header::CONTENT_LENGTH;

use crate::action::Action;
use crate::error::{QuadgateError, Result};
use crate::handlers::send_json;
use crate::ingest::{self, Destination, Overwrite};
use crate::mediatype::{MediaType, negotiate};
use crate::rdf::RdfWriter;
use crate::response;
use crate::store::GraphName;
use crate::target::{GraphSelector, GraphTarget};

pub fn validate(action: &mut Action<'_>) -> Result<()> {
    GraphTarget::resolve(action, action.is_write_method())?;
    Ok(())
}

pub fn validate_quads(_action: &mut Action<'_>) -> Result<()> {
    Ok(())
}

/// Picks the output syntax from the Accept header.
fn choose_writer(action: &Action<'_>, quads: bool) -> Result<(String, Arc<dyn RdfWriter>)> {
    let syntaxes = &action.services.syntaxes;
    let offers = syntaxes.writable_media_types(quads);
    let chosen = negotiate(action.accept(), &offers).ok_or_else(|| {
        QuadgateError::NotAcceptable(format!(
            "No acceptable RDF syntax for Accept: {}",
            action.accept().unwrap_or_default()
        ))
    })?;
    let writer = syntaxes
        .writer(&MediaType::parse(chosen)?)
        .ok_or_else(|| QuadgateError::Internal(format!("No writer for {chosen}")))?;
    Ok((chosen.to_string(), writer))
}

fn send_rdf(action: &mut Action<'_>, content_type: &str, body: &[u8], with_body: bool) -> Result<()> {
    let sink = &mut *action.sink;
    if with_body {
        response::send_content(sink, StatusCode::OK, content_type, body)?;
    } else {
        sink.set_status(StatusCode::OK);
        response::set_content_type(sink, content_type);
        sink.set_header(CONTENT_LENGTH, body.len().into());
    }
    Ok(())
}

fn serve_graph(action: &mut Action<'_>, with_body: bool) -> Result<()> {
    let target = GraphTarget::resolve(action, false)?;
    let (content_type, writer) = choose_writer(action, false)?;
    let triples = action.read(|txn| {
        if !target.exists(txn) {
            return Err(QuadgateError::not_found(format!("No such graph: {target}")));
        }
        Ok(target.triples(txn))
    })?;
    let mut body = Vec::new();
    writer.write_triples(&mut body, &triples)?;
    send_rdf(action, &content_type, &body, with_body)
}

pub fn get(action: &mut Action<'_>) -> Result<()> {
    serve_graph(action, true)
}

pub fn head(action: &mut Action<'_>) -> Result<()> {
    serve_graph(action, false)
}

fn store_graph(action: &mut Action<'_>, overwrite: Overwrite) -> Result<()> {
    let target = GraphTarget::resolve(action, true)?;
    let outcome = ingest::upload(action, &Destination::Graph(target), overwrite)?;
    let status = if outcome.existed_before {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    send_json(action, status, &outcome)
}

pub fn put(action: &mut Action<'_>) -> Result<()> {
    store_graph(action, Overwrite::Replace)
}

pub fn post(action: &mut Action<'_>) -> Result<()> {
    store_graph(action, Overwrite::Merge)
}

pub fn delete(action: &mut Action<'_>) -> Result<()> {
    let target = GraphTarget::resolve(action, true)?;
    action.begin_write()?;
    let txn = action.txn.handle_mut()?;
    match target.selector() {
        GraphSelector::Default => txn.clear_graph(&GraphName::Default)?,
        GraphSelector::Named(iri) => {
            if !txn.contains_graph(iri) {
                // Commit, never abort, before reporting the missing graph.
                action.commit()?;
                return Err(QuadgateError::not_found(format!("No such graph: <{iri}>")));
            }
            txn.remove_graph(iri)?;
        }
        GraphSelector::Union => {
            return Err(QuadgateError::bad_request("Can't delete the union graph"));
        }
    }
    action.commit()?;
    response::send_status(&mut *action.sink, StatusCode::NO_CONTENT);
    Ok(())
}

fn serve_dataset(action: &mut Action<'_>, with_body: bool) -> Result<()> {
    let (content_type, writer) = choose_writer(action, true)?;
    let quads = action.read(|txn| Ok(txn.quads()))?;
    let mut body = Vec::new();
    writer.write_quads(&mut body, &quads)?;
    send_rdf(action, &content_type, &body, with_body)
}

pub fn quads_get(action: &mut Action<'_>) -> Result<()> {
    serve_dataset(action, true)
}

pub fn quads_head(action: &mut Action<'_>) -> Result<()> {
    serve_dataset(action, false)
}

fn store_dataset(action: &mut Action<'_>, overwrite: Overwrite) -> Result<()> {
    let store = Arc::clone(action.dataset()?.store());
    let outcome = ingest::upload(action, &Destination::Dataset(store), overwrite)?;
    send_json(action, StatusCode::OK, &outcome)
}

pub fn quads_put(action: &mut Action<'_>) -> Result<()> {
    store_dataset(action, Overwrite::Replace)
}

pub fn quads_post(action: &mut Action<'_>) -> Result<()> {
    store_dataset(action, Overwrite::Merge)
}

pub fn quads_delete(_action: &mut Action<'_>) -> Result<()> {
    Err(QuadgateError::bad_request(
        "DELETE of a whole dataset is not supported; name a graph with ?default or ?graph=",
    ))
}
