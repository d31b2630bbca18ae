//! HTML form style upload: files into a named graph or into the dataset.

use std::sync::Arc;

use http::StatusCode;

use crate::action::Action;
use crate::error::{QuadgateError, Result};
use crate::handlers::send_json;
use crate::ingest::{self, Destination, Overwrite};
use crate::target::{self, GraphTarget};

pub fn validate(action: &mut Action<'_>) -> Result<()> {
    if action.content_type.is_none() {
        return Err(QuadgateError::bad_request("No Content-Type"));
    }
    if target::has_selector(action) {
        GraphTarget::resolve(action, true)?;
    }
    Ok(())
}

pub fn upload(action: &mut Action<'_>) -> Result<()> {
    let destination = if target::has_selector(action) {
        Destination::Graph(GraphTarget::resolve(action, true)?)
    } else {
        Destination::Dataset(Arc::clone(action.dataset()?.store()))
    };
    let outcome = ingest::upload(action, &destination, Overwrite::Merge)?;
    send_json(action, StatusCode::OK, &outcome)
}
