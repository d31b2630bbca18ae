//! The query engine seam.
//!
//! Queries and updates are parsed first, outside any transaction, and then
//! executed against a [`StoreTxn`] the lifecycle has opened.

use std::io::{self, Write};
use std::time::Duration;

use thiserror::Error;

use crate::store::{StoreError, StoreTxn};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Parse error: [line: {line}, col: {col}] {message}")]
    Parse { message: String, line: u64, col: u64 },
    /// Timeout or explicit cancellation.
    #[error("{0}")]
    Cancelled(String),
    /// A remote endpoint (SERVICE) failed.
    #[error("{message}")]
    Upstream { status: Option<u16>, message: String },
    #[error("{0}")]
    Execution(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Everything execution needs besides the transaction itself.
#[derive(Clone, Debug, Default)]
pub struct ExecContext {
    pub base: String,
    pub timeout: Option<Duration>,
    /// `default-graph-uri` / `using-graph-uri`.
    pub default_graph_uris: Vec<String>,
    /// `named-graph-uri` / `using-named-graph-uri`.
    pub named_graph_uris: Vec<String>,
    pub accept: Option<String>,
}

pub trait QueryEngine: Send + Sync {
    fn parse_query(&self, text: &str, base: &str) -> Result<Box<dyn PreparedQuery>, EngineError>;
    fn parse_update(&self, text: &str, base: &str) -> Result<Box<dyn PreparedUpdate>, EngineError>;
}

pub trait PreparedQuery: Send {
    fn execute(
        &self,
        txn: &dyn StoreTxn,
        ctx: &ExecContext,
    ) -> Result<Box<dyn QueryResults>, EngineError>;
}

pub trait PreparedUpdate: Send {
    fn execute(&self, txn: &mut dyn StoreTxn, ctx: &ExecContext) -> Result<(), EngineError>;
}

/// Results are produced lazily; a cancellation may surface part way
/// through `write_to`, after output has already been flushed.
pub trait QueryResults {
    fn content_type(&self) -> String;
    fn write_to(&mut self, out: &mut dyn Write) -> Result<(), EngineError>;
}

/// Stands in when no engine has been wired in; every request fails cleanly.
pub struct UnavailableEngine;

impl QueryEngine for UnavailableEngine {
    fn parse_query(&self, _text: &str, _base: &str) -> Result<Box<dyn PreparedQuery>, EngineError> {
        Err(EngineError::Execution("No query engine configured".into()))
    }
    fn parse_update(&self, _text: &str, _base: &str) -> Result<Box<dyn PreparedUpdate>, EngineError> {
        Err(EngineError::Execution("No update engine configured".into()))
    }
}
