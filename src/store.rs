//! The narrow interface to the backing triple store.
//!
//! A [`Store`] hands out [`StoreTxn`] handles. Stores differ in what they can
//! promise: some roll back on abort, some run transactions but cannot undo a
//! write, and some have no transactions at all (their handles write straight
//! through and rely on the caller for isolation). The lifecycle picks a
//! policy from [`Store::supports_abort`] and [`Store::supports_transactions`].

use std::fmt;

use thiserror::Error;

// ------------- Terms -------------
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Iri(String),
    BlankNode(String),
    Literal {
        value: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal { value: value.into(), datatype: None, language: None }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::BlankNode(label) => write!(f, "_:{label}"),
            Term::Literal { value, datatype, language } => {
                write!(f, "\"")?;
                for c in value.chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\r' => write!(f, "\\r")?,
                        '\t' => write!(f, "\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")?;
                if let Some(lang) = language {
                    write!(f, "@{lang}")
                } else if let Some(dt) = datatype {
                    write!(f, "^^<{dt}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self { subject, predicate, object }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GraphName {
    Default,
    Named(String),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quad {
    pub graph: GraphName,
    pub triple: Triple,
}

impl Quad {
    pub fn new(graph: GraphName, triple: Triple) -> Self {
        Self { graph, triple }
    }
}

// ------------- Transactions -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnMode {
    Read,
    Write,
    /// Starts as a read, may be promoted to a write.
    ReadPromote,
}

impl TxnMode {
    pub fn is_write(&self) -> bool {
        matches!(self, TxnMode::Write)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store does not support abort")]
    AbortUnsupported,
    #[error("no active transaction")]
    NotActive,
    #[error("write attempted in a read transaction")]
    ReadOnly,
    #[error("transaction promotion failed: {0}")]
    Promote(String),
    #[error("lock poisoned: {0}")]
    Lock(String),
    #[error("{0}")]
    Backend(String),
}

pub trait Store: Send + Sync {
    fn supports_transactions(&self) -> bool;
    fn supports_abort(&self) -> bool;
    fn begin(&self, mode: TxnMode) -> Result<Box<dyn StoreTxn>, StoreError>;
}

/// A transaction (or, for non-transactional stores, a direct view).
pub trait StoreTxn: Send {
    fn mode(&self) -> TxnMode;
    fn promote(&mut self) -> Result<(), StoreError>;
    fn commit(&mut self) -> Result<(), StoreError>;
    fn abort(&mut self) -> Result<(), StoreError>;
    /// Releases the transaction. Abortable stores roll back anything
    /// uncommitted; others keep what was written.
    fn end(&mut self);

    fn default_graph(&self) -> Vec<Triple>;
    fn named_graph(&self, iri: &str) -> Vec<Triple>;
    fn union_graph(&self) -> Vec<Triple>;
    fn contains_graph(&self, iri: &str) -> bool;
    fn graph_names(&self) -> Vec<String>;
    fn quads(&self) -> Vec<Quad>;

    fn insert(&mut self, quad: Quad) -> Result<(), StoreError>;
    fn clear(&mut self) -> Result<(), StoreError>;
    fn clear_graph(&mut self, graph: &GraphName) -> Result<(), StoreError>;
    fn remove_graph(&mut self, iri: &str) -> Result<(), StoreError>;
}
