//! Request classification.
//!
//! [`Dispatcher::dispatch`] turns a request into exactly one
//! [`Operation`] served by one endpoint (or, at the dataset root, by every
//! endpoint able to provide it), checks authorization and availability,
//! then hands over to [`lifecycle::execute`].
//!
//! At a named endpoint the endpoint decides, except that a graph store
//! endpoint called without `?default` or `?graph=` serves the whole
//! dataset when legacy compatibility is on. At the root the request speaks
//! for itself, in this order:
//!
//! 1. `?query=` is a query,
//! 2. `?update=` (or legacy `?request=`) is an update,
//! 3. `?default` / `?graph=` is a graph store read or write,
//! 4. any other parameter is an error,
//! 5. a body whose content type names an operation is that operation,
//! 6. anything else reads or writes the dataset as quads.

use std::sync::Arc;

use http::Method;
use tracing::{debug, info};

use crate::action::{Action, RequestDescriptor};
use crate::config::Settings;
use crate::engine::QueryEngine;
use crate::error::{QuadgateError, Result};
use crate::lifecycle;
use crate::operation::{HandlerSet, Operation, OperationRegistry};
use crate::rdf::SyntaxRegistry;
use crate::registry::{Dataset, DatasetRegistry, Endpoint};
use crate::response::{self, ResponseSink};
use crate::target;

/// Everything a request may consult, fixed once the server starts.
pub struct Services {
    pub settings: Settings,
    pub datasets: DatasetRegistry,
    pub operations: OperationRegistry,
    pub syntaxes: SyntaxRegistry,
    pub engine: Arc<dyn QueryEngine>,
}

impl Services {
    pub fn new(settings: Settings, datasets: DatasetRegistry, engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            settings,
            datasets,
            operations: OperationRegistry::with_defaults(),
            syntaxes: SyntaxRegistry::with_defaults(),
            engine,
        }
    }
    pub fn with_operations(mut self, operations: OperationRegistry) -> Self {
        self.operations = operations;
        self
    }
    pub fn with_syntaxes(mut self, syntaxes: SyntaxRegistry) -> Self {
        self.syntaxes = syntaxes;
        self
    }
}

const QUERY: &str = "query";
const UPDATE: &str = "update";
const REQUEST: &str = "request";

/// What classification settled on.
struct Route<'a> {
    operation: Operation,
    /// More than one only when no endpoint was named.
    endpoints: Vec<&'a Endpoint>,
}

pub struct Dispatcher {
    services: Arc<Services>,
}

impl Dispatcher {
    pub fn new(services: Services) -> Self {
        Self { services: Arc::new(services) }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Serves the request if its path belongs to a registered dataset.
    /// Returns `false`, writing nothing, when no dataset matches.
    pub fn dispatch(&self, request: RequestDescriptor, sink: &mut dyn ResponseSink) -> bool {
        let services: &Services = &self.services;
        let Some((dataset, suffix)) = services.datasets.resolve(&request.path) else {
            debug!(path = %request.path, "no dataset");
            return false;
        };
        let mut action = Action::new(services, request, sink);
        action.dataset = Some(dataset);
        info!(id = action.id, method = %action.method, url = %action.url, "request");

        let outcome = route(&mut action, dataset, &suffix)
            .and_then(|handlers| lifecycle::execute(&mut action, handlers));
        if let Err(e) = &outcome {
            response::send_error(&mut *action.sink, e, &action.method);
        }
        info!(
            id = action.id,
            status = action.sink.status().as_u16(),
            operation = action.operation.map(|o| o.name()).unwrap_or("-"),
            ms = action.elapsed_ms(),
            "response"
        );
        true
    }
}

fn route<'a>(action: &mut Action<'a>, dataset: &'a Dataset, suffix: &str) -> Result<&'a HandlerSet> {
    if !dataset.is_accepting() {
        return Err(QuadgateError::Unavailable(format!(
            "Dataset {} not available",
            dataset.name()
        )));
    }
    action.prepare()?;
    let services = action.services;
    let settings = &services.settings;
    let route = if suffix.is_empty() {
        root_route(action, dataset, settings.legacy_compatibility)?
    } else {
        let named = dataset.endpoints_named(suffix);
        if !named.is_empty() {
            named_route(action, named, settings.legacy_compatibility)?
        } else if settings.direct_naming {
            direct_naming_route(action, dataset)?
        } else {
            return Err(QuadgateError::not_found(format!(
                "No endpoint for request: {}",
                action.path
            )));
        }
    };

    authorize(action, dataset, &route.endpoints)?;
    let handlers = services
        .operations
        .handlers(route.operation)
        .ok_or_else(|| {
            QuadgateError::Internal(format!("No handlers registered for {}", route.operation))
        })?;
    debug!(id = action.id, operation = %route.operation, candidates = route.endpoints.len(), "routed");
    action.operation = Some(route.operation);
    action.endpoint = route.endpoints.first().copied();
    Ok(handlers)
}

fn is_read_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// The protocol parameters that name an operation outright.
fn classify_params(action: &Action<'_>, legacy: bool) -> Option<Operation> {
    let params = &action.params;
    if params.contains(QUERY) {
        Some(Operation::Query)
    } else if params.contains(UPDATE) || (legacy && params.contains(REQUEST)) {
        Some(Operation::Update)
    } else if target::has_selector(action) {
        Some(gsp_by_method(&action.method))
    } else {
        None
    }
}

fn classify_content_type(action: &Action<'_>) -> Option<Operation> {
    action
        .content_type
        .as_ref()
        .and_then(|ct| action.services.operations.operation_for_content_type(ct))
}

fn gsp_by_method(method: &Method) -> Operation {
    if is_read_method(method) {
        Operation::GspR
    } else {
        Operation::GspRw
    }
}

fn quads_by_method(method: &Method) -> Operation {
    if is_read_method(method) {
        Operation::QuadsR
    } else {
        Operation::QuadsRw
    }
}

fn named_route<'a>(action: &Action<'a>, named: Vec<&'a Endpoint>, legacy: bool) -> Result<Route<'a>> {
    let endpoint = if named.len() == 1 {
        named[0]
    } else {
        let wanted = classify_params(action, legacy)
            .or_else(|| classify_content_type(action))
            .unwrap_or_else(|| quads_by_method(&action.method));
        named
            .iter()
            .find(|e| wanted.provided_by(e.operation()))
            .or_else(|| {
                named
                    .iter()
                    .find(|e| wanted.provided_by(e.operation().quads_equivalent()))
            })
            .copied()
            .unwrap_or(named[0])
    };
    let mut operation = endpoint.operation();
    if operation.is_gsp() && legacy && !target::has_selector(action) {
        operation = operation.quads_equivalent();
    }
    if operation.is_gsp() {
        target::check_selectors(action)?;
    }
    Ok(Route { operation, endpoints: vec![endpoint] })
}

fn root_route<'a>(action: &Action<'a>, dataset: &'a Dataset, legacy: bool) -> Result<Route<'a>> {
    let operation = classify_root(action, dataset, legacy)?;
    if operation.is_gsp() {
        target::check_selectors(action)?;
    }
    let endpoints = dataset.endpoints_for(operation);
    if !endpoints.is_empty() {
        return Ok(Route { operation, endpoints });
    }
    if action.services.settings.direct_naming && (operation.is_gsp() || operation.is_quads()) {
        return direct_naming_route(action, dataset);
    }
    Err(no_provider(dataset, operation))
}

fn classify_root(action: &Action<'_>, dataset: &Dataset, legacy: bool) -> Result<Operation> {
    if let Some(operation) = classify_params(action, legacy) {
        return Ok(operation);
    }
    if !action.params.is_empty() {
        return Err(QuadgateError::bad_request(format!(
            "Unrecognized request parameter(s): {}",
            action.params.names().join(", ")
        )));
    }
    if let Some(operation) = classify_content_type(action) {
        if dataset.has_endpoint_for(operation) {
            return Ok(operation);
        }
        return Err(QuadgateError::bad_request(format!(
            "No endpoint for {operation} requests in {}",
            dataset.name()
        )));
    }
    Ok(quads_by_method(&action.method))
}

/// The request URL names the graph; served by the dataset's graph store
/// endpoints.
fn direct_naming_route<'a>(action: &Action<'a>, dataset: &'a Dataset) -> Result<Route<'a>> {
    let operation = gsp_by_method(&action.method);
    target::check_selectors(action)?;
    let endpoints = dataset.endpoints_for(operation);
    if endpoints.is_empty() {
        return Err(no_provider(dataset, operation));
    }
    Ok(Route { operation, endpoints })
}

fn no_provider(dataset: &Dataset, operation: Operation) -> QuadgateError {
    match operation.read_counterpart() {
        Some(read) if dataset.has_endpoint_for(read) => QuadgateError::method_not_allowed(format!(
            "Dataset {} is read-only for {}",
            dataset.name(),
            operation
        )),
        _ => QuadgateError::not_found(format!(
            "No endpoint in {} for {}",
            dataset.name(),
            operation
        )),
    }
}

/// Dataset policy first, then every candidate endpoint's.
fn authorize(action: &Action<'_>, dataset: &Dataset, endpoints: &[&Endpoint]) -> Result<()> {
    let user = action.user.as_deref();
    if !dataset.auth().is_allowed(user) {
        return Err(QuadgateError::Forbidden);
    }
    if endpoints.iter().all(|e| e.auth().is_allowed(user)) {
        Ok(())
    } else {
        Err(QuadgateError::Forbidden)
    }
}
