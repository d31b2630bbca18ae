//! Operations and the dispatch table.
//!
//! Every request resolves to exactly one [`Operation`]. The
//! [`OperationRegistry`] holds the content types that name an operation on
//! their own (`application/sparql-query`, `application/sparql-update`) and
//! the [`HandlerSet`] each operation is served by.

use std::collections::HashMap;
use std::fmt;

use bimap::BiMap;
use http::Method;

use crate::FastHasher;
use crate::action::Action;
use crate::counters::CounterName;
use crate::error::Result;
use crate::handlers;
use crate::mediatype::MediaType;

pub const SPARQL_QUERY: &str = "application/sparql-query";
pub const SPARQL_UPDATE: &str = "application/sparql-update";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Query,
    Update,
    Upload,
    GspR,
    GspRw,
    QuadsR,
    QuadsRw,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Query => "query",
            Operation::Update => "update",
            Operation::Upload => "upload",
            Operation::GspR => "gsp-r",
            Operation::GspRw => "gsp-rw",
            Operation::QuadsR => "quads-r",
            Operation::QuadsRw => "quads-rw",
        }
    }

    pub fn is_gsp(&self) -> bool {
        matches!(self, Operation::GspR | Operation::GspRw)
    }

    pub fn is_quads(&self) -> bool {
        matches!(self, Operation::QuadsR | Operation::QuadsRw)
    }

    /// The whole-dataset operation of the same read/write class.
    pub fn quads_equivalent(&self) -> Operation {
        match self {
            Operation::GspR => Operation::QuadsR,
            Operation::GspRw => Operation::QuadsRw,
            other => *other,
        }
    }

    pub fn read_counterpart(&self) -> Option<Operation> {
        match self {
            Operation::GspRw => Some(Operation::GspR),
            Operation::QuadsRw => Some(Operation::QuadsR),
            _ => None,
        }
    }

    /// Whether an endpoint configured for `endpoint_op` can serve `self`.
    /// A read-write endpoint also serves its read-only counterpart.
    pub fn provided_by(&self, endpoint_op: Operation) -> bool {
        *self == endpoint_op || endpoint_op.read_counterpart() == Some(*self)
    }

    /// Counters kept by an endpoint of this operation.
    pub fn counter_names(&self) -> Vec<CounterName> {
        let mut names = vec![
            CounterName::Requests,
            CounterName::RequestsGood,
            CounterName::RequestsBad,
        ];
        match self {
            Operation::Query => {
                names.push(CounterName::QueryTimeouts);
                names.push(CounterName::QueryExecErrors);
            }
            Operation::Update => names.push(CounterName::UpdateExecErrors),
            Operation::Upload | Operation::GspRw | Operation::QuadsRw => {
                names.push(CounterName::UploadErrors)
            }
            Operation::GspR | Operation::QuadsR => {}
        }
        names
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type HandlerFn = fn(&mut Action<'_>) -> Result<()>;

/// Handlers for one operation, one per HTTP method it supports.
#[derive(Clone, Copy)]
pub struct HandlerSet {
    /// Runs before any transaction is opened.
    pub validate: HandlerFn,
    pub get: Option<HandlerFn>,
    pub head: Option<HandlerFn>,
    pub post: Option<HandlerFn>,
    pub put: Option<HandlerFn>,
    pub delete: Option<HandlerFn>,
    pub options: Option<HandlerFn>,
}

impl HandlerSet {
    pub fn new(validate: HandlerFn) -> Self {
        Self {
            validate,
            get: None,
            head: None,
            post: None,
            put: None,
            delete: None,
            options: None,
        }
    }

    pub fn for_method(&self, method: &Method) -> Option<HandlerFn> {
        match *method {
            Method::GET => self.get,
            Method::HEAD => self.head,
            Method::POST => self.post,
            Method::PUT => self.put,
            Method::DELETE => self.delete,
            Method::OPTIONS => self.options,
            _ => None,
        }
    }

    pub fn allowed_methods(&self) -> Vec<Method> {
        [
            (Method::GET, self.get),
            (Method::HEAD, self.head),
            (Method::POST, self.post),
            (Method::PUT, self.put),
            (Method::DELETE, self.delete),
            (Method::OPTIONS, self.options),
        ]
        .into_iter()
        .filter(|(_, h)| h.is_some())
        .map(|(m, _)| m)
        .collect()
    }

    /// Value for an `Allow` header.
    pub fn allow_header(&self) -> String {
        self.allowed_methods()
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Default)]
pub struct OperationRegistry {
    content_types: BiMap<String, Operation>,
    handlers: HashMap<Operation, HandlerSet, FastHasher>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard SPARQL operations with their standard handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (operation, handler_set) in handlers::default_handlers() {
            let content_type = match operation {
                Operation::Query => Some(SPARQL_QUERY),
                Operation::Update => Some(SPARQL_UPDATE),
                _ => None,
            };
            registry.register(operation, content_type, handler_set);
        }
        registry
    }

    /// Registers (or replaces) an operation's handlers and, optionally, the
    /// content type that names it.
    pub fn register(&mut self, operation: Operation, content_type: Option<&str>, handlers: HandlerSet) {
        if let Some(content_type) = content_type {
            self.content_types
                .insert(content_type.to_ascii_lowercase(), operation);
        }
        self.handlers.insert(operation, handlers);
    }

    pub fn operation_for_content_type(&self, media_type: &MediaType) -> Option<Operation> {
        self.content_types
            .get_by_left(&media_type.essence())
            .copied()
    }

    pub fn content_type_for(&self, operation: Operation) -> Option<&str> {
        self.content_types
            .get_by_right(&operation)
            .map(String::as_str)
    }

    pub fn handlers(&self, operation: Operation) -> Option<&HandlerSet> {
        self.handlers.get(&operation)
    }
}
