//! The standard dispatch table: one [`HandlerSet`] per [`Operation`].

pub mod gsp;
pub mod sparql;
pub mod upload;

use http::StatusCode;
use serde::Serialize;

use crate::action::Action;
use crate::error::{QuadgateError, Result};
use crate::operation::{HandlerSet, Operation};
use crate::response;

pub fn default_handlers() -> Vec<(Operation, HandlerSet)> {
    vec![
        (
            Operation::Query,
            HandlerSet {
                get: Some(sparql::query),
                post: Some(sparql::query),
                options: Some(options),
                ..HandlerSet::new(sparql::validate_query)
            },
        ),
        (
            Operation::Update,
            HandlerSet {
                post: Some(sparql::update),
                options: Some(options),
                ..HandlerSet::new(sparql::validate_update)
            },
        ),
        (
            Operation::Upload,
            HandlerSet {
                post: Some(upload::upload),
                options: Some(options),
                ..HandlerSet::new(upload::validate)
            },
        ),
        (
            Operation::GspR,
            HandlerSet {
                get: Some(gsp::get),
                head: Some(gsp::head),
                options: Some(options),
                ..HandlerSet::new(gsp::validate)
            },
        ),
        (
            Operation::GspRw,
            HandlerSet {
                get: Some(gsp::get),
                head: Some(gsp::head),
                post: Some(gsp::post),
                put: Some(gsp::put),
                delete: Some(gsp::delete),
                options: Some(options),
                ..HandlerSet::new(gsp::validate)
            },
        ),
        (
            Operation::QuadsR,
            HandlerSet {
                get: Some(gsp::quads_get),
                head: Some(gsp::quads_head),
                options: Some(options),
                ..HandlerSet::new(gsp::validate_quads)
            },
        ),
        (
            Operation::QuadsRw,
            HandlerSet {
                get: Some(gsp::quads_get),
                head: Some(gsp::quads_head),
                post: Some(gsp::quads_post),
                put: Some(gsp::quads_put),
                delete: Some(gsp::quads_delete),
                options: Some(options),
                ..HandlerSet::new(gsp::validate_quads)
            },
        ),
    ]
}

/// The `Allow` header has already been set by the lifecycle.
pub fn options(action: &mut Action<'_>) -> Result<()> {
    response::send_status(&mut *action.sink, StatusCode::OK);
    Ok(())
}

pub(crate) fn send_json<T: Serialize>(action: &mut Action<'_>, status: StatusCode, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value).map_err(|e| QuadgateError::Internal(e.to_string()))?;
    response::send_content(&mut *action.sink, status, "application/json", &body)?;
    Ok(())
}
