use std::io;
use std::sync::PoisonError;

use http::StatusCode;
use thiserror::Error;

use crate::engine::EngineError;
use crate::mediatype::MediaTypeError;
use crate::rdf::ParseError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum QuadgateError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    MethodNotAllowed(String),
    #[error("{0}")]
    NotAcceptable(String),
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("Query cancelled: {0}")]
    Timeout(String),
    #[error("Upstream error: {message}")]
    Upstream { status: Option<u16>, message: String },
    #[error("Client disconnected: {0}")]
    ClientGone(#[source] io::Error),
    /// Raised by a handler with an explicit status; forwarded verbatim.
    #[error("{message}")]
    Action { status: StatusCode, message: String },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, QuadgateError>;

impl QuadgateError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn method_not_allowed(msg: impl Into<String>) -> Self {
        Self::MethodNotAllowed(msg.into())
    }
    pub fn action(status: StatusCode, msg: impl Into<String>) -> Self {
        Self::Action { status, message: msg.into() }
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Unavailable(_) | Self::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Action { status, .. } => *status,
            Self::Config(_)
            | Self::ClientGone(_)
            | Self::Store(_)
            | Self::Internal(_)
            | Self::Lock(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message sent to the client, always a single line.
    pub fn message(&self) -> String {
        single_line(&self.to_string())
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

pub(crate) fn single_line(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

// Helper conversions
impl From<io::Error> for QuadgateError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => Self::ClientGone(e),
            _ => Self::Internal(e.to_string()),
        }
    }
}

impl From<EngineError> for QuadgateError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Parse { .. } => Self::BadRequest(e.to_string()),
            EngineError::Cancelled(msg) => Self::Timeout(msg),
            EngineError::Upstream { status, message } => Self::Upstream { status, message },
            EngineError::Execution(msg) => Self::Internal(msg),
            EngineError::Store(s) => Self::Store(s),
            EngineError::Io(io) => io.into(),
        }
    }
}

impl From<ParseError> for QuadgateError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Syntax { .. } => Self::BadRequest(format!("Parse error: {e}")),
            ParseError::Io(io) => io.into(),
            ParseError::Sink(s) => Self::Store(s),
        }
    }
}

impl From<MediaTypeError> for QuadgateError {
    fn from(e: MediaTypeError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<config::ConfigError> for QuadgateError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl<T> From<PoisonError<T>> for QuadgateError {
    fn from(e: PoisonError<T>) -> Self {
        Self::Lock(e.to_string())
    }
}
