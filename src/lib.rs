//! Quadgate – the request routing and transactional execution core of a
//! SPARQL 1.1 protocol server.
//!
//! Given an HTTP request aimed at a registered dataset, quadgate decides which
//! SPARQL operation the request stands for, checks authorization and
//! availability, runs the operation inside a transaction suited to what the
//! backing store can do, and makes sure the store is never left half
//! written when something fails.
//!
//! The query engine, RDF parsers and writers and the triple store itself are
//! collaborators behind narrow traits ([`engine::QueryEngine`],
//! [`rdf::RdfParser`], [`rdf::RdfWriter`], [`store::Store`]).
//!
//! ## Modules
//! * [`operation`] – The [`operation::Operation`] enum and the dispatch table
//!   mapping each operation to its per-method handlers.
//! * [`registry`] – Datasets and their named or unnamed endpoints.
//! * [`dispatch`] – Classifies a request and enforces policy; the single
//!   entry point is [`dispatch::Dispatcher::dispatch`].
//! * [`target`] – Resolves `?default`, `?graph=` or a directly named graph.
//! * [`lifecycle`] – Begin / commit / abort / end around handler execution,
//!   counters and error mapping.
//! * [`ingest`] – Loads uploaded RDF without ever leaving partial writes.
//! * [`handlers`] – Query, update, graph store and upload handlers.
//! * [`memory`] – An in-memory store, used as upload scratch space and as a
//!   reference backend.
//! * [`server`] – A thin axum adapter.
//!
//! ## Transactions
//! Each dataset gets a [`lifecycle::TransactionPolicy`] the first time it is
//! used. A store that can abort gets real rollback; one with transactions
//! but no abort only ever sees writes of data already validated; one
//! without transactions is serialised behind an advisory lock.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use quadgate::action::RequestDescriptor;
//! use quadgate::config::Settings;
//! use quadgate::dispatch::{Dispatcher, Services};
//! use quadgate::engine::UnavailableEngine;
//! use quadgate::memory::MemoryStore;
//! use quadgate::registry::{Dataset, DatasetRegistry};
//! use quadgate::response::{BufferedResponse, ResponseSink};
//!
//! let dataset = Dataset::new("/ds", Arc::new(MemoryStore::new())).with_standard_endpoints();
//! let services = Services::new(
//!     Settings::default(),
//!     DatasetRegistry::new().with_dataset(dataset),
//!     Arc::new(UnavailableEngine),
//! );
//! let dispatcher = Dispatcher::new(services);
//!
//! let put = RequestDescriptor::put("/ds/data?graph=http://example/g")
//!     .with_content_type("application/n-triples")
//!     .with_body_bytes("<http://example/s> <http://example/p> \"o\" .\n");
//! let mut response = BufferedResponse::new();
//! assert!(dispatcher.dispatch(put, &mut response));
//! assert_eq!(response.status().as_u16(), 201);
//! ```

use std::hash::BuildHasherDefault;

use seahash::SeaHasher;

pub mod action;
pub mod auth;
pub mod config;
pub mod counters;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod lifecycle;
pub mod mediatype;
pub mod memory;
pub mod nquads;
pub mod operation;
pub mod rdf;
pub mod registry;
pub mod response;
pub mod server;
pub mod store;
pub mod target;

pub(crate) type FastHasher = BuildHasherDefault<SeaHasher>;

pub use dispatch::{Dispatcher, Services};
pub use error::{QuadgateError, Result};
pub use operation::Operation;
