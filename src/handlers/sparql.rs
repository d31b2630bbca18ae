//! SPARQL query and update over the protocol.

use std::time::Duration;

use http::StatusCode;

use crate::action::Action;
use crate::engine::{EngineError, ExecContext};
use crate::error::{QuadgateError, Result};
use crate::operation::{SPARQL_QUERY, SPARQL_UPDATE};
use crate::response::{self, SinkWriter};

const QUERY: &str = "query";
const UPDATE: &str = "update";
const REQUEST: &str = "request";
const TIMEOUT: &str = "timeout";
const DEFAULT_GRAPH_URI: &str = "default-graph-uri";
const NAMED_GRAPH_URI: &str = "named-graph-uri";
const USING_GRAPH_URI: &str = "using-graph-uri";
const USING_NAMED_GRAPH_URI: &str = "using-named-graph-uri";

/// `?timeout=` in (possibly fractional) seconds, else the configured
/// default; never above the configured maximum.
fn timeout(action: &Action<'_>) -> Result<Option<Duration>> {
    let settings = &action.services.settings.query;
    let requested = match action.params.get(TIMEOUT) {
        Some(value) => {
            let timeout = value
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
                .ok_or_else(|| QuadgateError::bad_request(format!("Bad timeout: '{value}'")))?;
            Some(timeout)
        }
        None => settings.default_timeout_ms.map(Duration::from_millis),
    };
    let max = Duration::from_millis(settings.max_timeout_ms);
    Ok(requested.map(|t| t.min(max)))
}

fn owned(values: Vec<&str>) -> Vec<String> {
    values.into_iter().map(str::to_string).collect()
}

pub fn validate_query(action: &mut Action<'_>) -> Result<()> {
    let in_body = action.has_content_type(SPARQL_QUERY);
    match (action.params.count(QUERY), in_body) {
        (0, false) => return Err(QuadgateError::bad_request("Missing parameter 'query'")),
        (1, true) => {
            return Err(QuadgateError::bad_request(
                "Both ?query= and a query in the request body",
            ));
        }
        (n, _) if n > 1 => return Err(QuadgateError::bad_request("Multiple 'query' parameters")),
        _ => {}
    }
    if action.params.contains(UPDATE) {
        return Err(QuadgateError::bad_request("An update parameter on a query request"));
    }
    timeout(action)?;
    Ok(())
}

pub fn query(action: &mut Action<'_>) -> Result<()> {
    let text = match action.params.get(QUERY).map(str::to_string) {
        Some(q) => q,
        None => action.read_body_string()?,
    };
    let engine = &action.services.engine;
    let prepared = engine.parse_query(&text, &action.url)?;
    let ctx = ExecContext {
        base: action.url.clone(),
        timeout: timeout(action)?,
        default_graph_uris: owned(action.params.get_all(DEFAULT_GRAPH_URI)),
        named_graph_uris: owned(action.params.get_all(NAMED_GRAPH_URI)),
        accept: action.accept().map(str::to_string),
    };

    action.begin_read()?;
    let mut results = prepared.execute(action.txn.handle()?, &ctx)?;
    let sink = &mut *action.sink;
    sink.set_status(StatusCode::OK);
    response::set_content_type(sink, &results.content_type());
    let written = results.write_to(&mut SinkWriter::new(sink));
    match written {
        Ok(()) => action.commit(),
        Err(EngineError::Cancelled(message)) => {
            response::send_truncated(&mut *action.sink)?;
            Err(QuadgateError::Timeout(message))
        }
        Err(e) => Err(e.into()),
    }
}

fn update_params<'x>(action: &'x Action<'_>) -> Vec<&'x str> {
    let mut values = action.params.get_all(UPDATE);
    if action.services.settings.legacy_compatibility {
        values.extend(action.params.get_all(REQUEST));
    }
    values
}

pub fn validate_update(action: &mut Action<'_>) -> Result<()> {
    let in_body = action.has_content_type(SPARQL_UPDATE);
    match (update_params(action).len(), in_body) {
        (0, false) => return Err(QuadgateError::bad_request("Missing parameter 'update'")),
        (1, true) => {
            return Err(QuadgateError::bad_request(
                "Both ?update= and an update in the request body",
            ));
        }
        (n, _) if n > 1 => return Err(QuadgateError::bad_request("Multiple 'update' parameters")),
        _ => {}
    }
    if action.params.contains(QUERY) {
        return Err(QuadgateError::bad_request("A query parameter on an update request"));
    }
    Ok(())
}

pub fn update(action: &mut Action<'_>) -> Result<()> {
    let from_params = update_params(action).first().map(|u| u.to_string());
    let text = match from_params {
        Some(u) => u,
        None => action.read_body_string()?,
    };
    // Parsed before the transaction: a bad update never touches the store.
    let prepared = action.services.engine.parse_update(&text, &action.url)?;
    let ctx = ExecContext {
        base: action.url.clone(),
        timeout: None,
        default_graph_uris: owned(action.params.get_all(USING_GRAPH_URI)),
        named_graph_uris: owned(action.params.get_all(USING_NAMED_GRAPH_URI)),
        accept: None,
    };
    action.begin_write()?;
    prepared.execute(action.txn.handle_mut()?, &ctx)?;
    action.commit()?;
    response::send_status(&mut *action.sink, StatusCode::NO_CONTENT);
    Ok(())
}
