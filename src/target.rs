//! Which graph a graph store request is about.
//!
//! A [`GraphTarget`] pairs a store handle with exactly one selector. It is a
//! plain value: [`GraphTarget::with_store`] points a resolved target at a
//! different store (a scratch buffer during uploads) without touching the
//! request again.

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::action::Action;
use crate::error::{QuadgateError, Result};
use crate::store::{GraphName, Store, StoreTxn, Triple};

pub const PARAM_DEFAULT: &str = "default";
pub const PARAM_GRAPH: &str = "graph";

const DEFAULT_GRAPH_IRI: &str = "urn:x-arq:DefaultGraph";
const UNION_GRAPH_IRI: &str = "urn:x-arq:UnionGraph";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphSelector {
    Default,
    Named(String),
    /// Union of all named graphs. Read only.
    Union,
}

#[derive(Clone)]
pub struct GraphTarget {
    store: Arc<dyn Store>,
    selector: GraphSelector,
}

impl GraphTarget {
    pub fn new(store: Arc<dyn Store>, selector: GraphSelector) -> Self {
        Self { store, selector }
    }

    /// Resolves the target from `?default`, `?graph=` or, with direct
    /// naming, from the request URL itself.
    pub fn resolve(action: &Action<'_>, for_write: bool) -> Result<Self> {
        let dataset = action.dataset()?;
        let selector = resolve_selector(action)?;
        if for_write && selector == GraphSelector::Union {
            return Err(QuadgateError::bad_request("Can't write to the union graph"));
        }
        Ok(Self::new(Arc::clone(dataset.store()), selector))
    }

    pub fn with_store(&self, store: Arc<dyn Store>) -> Self {
        Self { store, selector: self.selector.clone() }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
    pub fn selector(&self) -> &GraphSelector {
        &self.selector
    }
    pub fn is_default(&self) -> bool {
        self.selector == GraphSelector::Default
    }
    pub fn is_union(&self) -> bool {
        self.selector == GraphSelector::Union
    }
    pub fn iri(&self) -> Option<&str> {
        match &self.selector {
            GraphSelector::Named(iri) => Some(iri),
            _ => None,
        }
    }

    /// Where statements go when writing to this target.
    pub fn graph_name(&self) -> Option<GraphName> {
        match &self.selector {
            GraphSelector::Default => Some(GraphName::Default),
            GraphSelector::Named(iri) => Some(GraphName::Named(iri.clone())),
            GraphSelector::Union => None,
        }
    }

    /// Default and union always exist; a named graph exists when it has
    /// at least one triple.
    pub fn exists(&self, txn: &dyn StoreTxn) -> bool {
        match &self.selector {
            GraphSelector::Default | GraphSelector::Union => true,
            GraphSelector::Named(iri) => txn.contains_graph(iri),
        }
    }

    pub fn triples(&self, txn: &dyn StoreTxn) -> Vec<Triple> {
        match &self.selector {
            GraphSelector::Default => txn.default_graph(),
            GraphSelector::Named(iri) => txn.named_graph(iri),
            GraphSelector::Union => txn.union_graph(),
        }
    }
}

impl fmt::Display for GraphTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            GraphSelector::Default => f.write_str("default graph"),
            GraphSelector::Union => f.write_str("union graph"),
            GraphSelector::Named(iri) => write!(f, "<{iri}>"),
        }
    }
}

impl fmt::Debug for GraphTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphTarget")
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

/// Checks the selector parameters without resolving anything: repeated or
/// conflicting selectors, and writes naming the union graph.
pub fn check_selectors(action: &Action<'_>) -> Result<()> {
    selector_counts(action)?;
    if action.is_write_method() {
        if let Some(graph) = action.params.get(PARAM_GRAPH) {
            if is_union_name(graph) {
                return Err(QuadgateError::bad_request("Can't write to the union graph"));
            }
        }
    }
    Ok(())
}

pub fn has_selector(action: &Action<'_>) -> bool {
    action.params.contains(PARAM_DEFAULT) || action.params.contains(PARAM_GRAPH)
}

fn is_union_name(name: &str) -> bool {
    name == "union" || name == UNION_GRAPH_IRI
}

fn is_default_name(name: &str) -> bool {
    name == "default" || name == DEFAULT_GRAPH_IRI
}

fn selector_counts(action: &Action<'_>) -> Result<(usize, usize)> {
    let defaults = action.params.count(PARAM_DEFAULT);
    let graphs = action.params.count(PARAM_GRAPH);
    if defaults > 1 {
        return Err(QuadgateError::bad_request("Multiple ?default in the request"));
    }
    if graphs > 1 {
        return Err(QuadgateError::bad_request("Multiple ?graph= in the request"));
    }
    if defaults == 1 && graphs == 1 {
        return Err(QuadgateError::bad_request(
            "Both ?default and ?graph in the query string of the request",
        ));
    }
    Ok((defaults, graphs))
}

fn resolve_selector(action: &Action<'_>) -> Result<GraphSelector> {
    match selector_counts(action)? {
        (1, _) => Ok(GraphSelector::Default),
        (_, 1) => {
            let name = action.params.get(PARAM_GRAPH).unwrap_or_default();
            if is_default_name(name) {
                Ok(GraphSelector::Default)
            } else if is_union_name(name) {
                Ok(GraphSelector::Union)
            } else {
                resolve_iri(&action.url, name).map(GraphSelector::Named)
            }
        }
        _ => direct_name(action),
    }
}

/// Absolute names are kept as given; relative ones resolve against the
/// request URL, taken as a directory.
pub fn resolve_iri(request_url: &str, name: &str) -> Result<String> {
    if name.trim().is_empty() {
        return Err(QuadgateError::bad_request("Empty graph name"));
    }
    if Url::parse(name).is_ok() {
        return Ok(name.to_string());
    }
    let base = if request_url.ends_with('/') {
        request_url.to_string()
    } else {
        format!("{request_url}/")
    };
    Url::parse(&base)
        .and_then(|b| b.join(name))
        .map(String::from)
        .map_err(|e| QuadgateError::bad_request(format!("Bad IRI: <{name}>: {e}")))
}

fn direct_name(action: &Action<'_>) -> Result<GraphSelector> {
    if !action.services.settings.direct_naming {
        return Err(QuadgateError::bad_request(
            "Neither ?default nor ?graph in the query string of the request",
        ));
    }
    let iri = action.url.trim_end_matches('/');
    let dataset_url = action.dataset_url().unwrap_or_default();
    if iri == dataset_url.trim_end_matches('/') {
        return Err(QuadgateError::bad_request(
            "Direct graph name is the dataset itself; use ?default or ?graph=",
        ));
    }
    Ok(GraphSelector::Named(action.url.clone()))
}
