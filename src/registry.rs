//! Datasets and their endpoints.
//!
//! A [`DatasetRegistry`] is built once at startup and read concurrently by
//! every request. The only thing that changes afterwards is a dataset's
//! availability flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::info;

use crate::auth::{AuthPolicy, allow_all};
use crate::counters::CounterSet;
use crate::lifecycle::TransactionPolicy;
use crate::operation::Operation;
use crate::store::Store;

pub struct Endpoint {
    name: String,
    operation: Operation,
    auth: Arc<dyn AuthPolicy>,
    counters: CounterSet,
}

impl Endpoint {
    /// An empty name makes the endpoint reachable only at the dataset root.
    pub fn new(name: &str, operation: Operation) -> Self {
        Self {
            name: name.trim_matches('/').to_string(),
            operation,
            auth: allow_all(),
            counters: CounterSet::new(&operation.counter_names()),
        }
    }
    pub fn unnamed(operation: Operation) -> Self {
        Self::new("", operation)
    }
    pub fn with_auth(mut self, auth: Arc<dyn AuthPolicy>) -> Self {
        self.auth = auth;
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn is_unnamed(&self) -> bool {
        self.name.is_empty()
    }
    pub fn operation(&self) -> Operation {
        self.operation
    }
    pub fn auth(&self) -> &dyn AuthPolicy {
        self.auth.as_ref()
    }
    pub fn counters(&self) -> &CounterSet {
        &self.counters
    }
}

pub struct Dataset {
    name: String,
    store: Arc<dyn Store>,
    endpoints: Vec<Endpoint>,
    auth: Arc<dyn AuthPolicy>,
    counters: CounterSet,
    accepting: AtomicBool,
    policy: OnceLock<TransactionPolicy>,
    // Stand-in isolation for stores without transactions.
    lock: Mutex<()>,
}

impl Dataset {
    pub fn new(name: &str, store: Arc<dyn Store>) -> Self {
        Self {
            name: normalize_name(name),
            store,
            endpoints: Vec::new(),
            auth: allow_all(),
            counters: CounterSet::requests(),
            accepting: AtomicBool::new(true),
            policy: OnceLock::new(),
            lock: Mutex::new(()),
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthPolicy>) -> Self {
        self.auth = auth;
        self
    }

    /// The usual set: query, update, upload and read-write GSP both at the
    /// root and under their conventional names.
    pub fn with_standard_endpoints(self) -> Self {
        let mut dataset = self;
        for operation in [Operation::Query, Operation::Update, Operation::GspRw] {
            dataset = dataset.with_endpoint(Endpoint::unnamed(operation));
        }
        dataset
            .with_endpoint(Endpoint::unnamed(Operation::QuadsRw))
            .with_endpoint(Endpoint::new("sparql", Operation::Query))
            .with_endpoint(Endpoint::new("query", Operation::Query))
            .with_endpoint(Endpoint::new("update", Operation::Update))
            .with_endpoint(Endpoint::new("upload", Operation::Upload))
            .with_endpoint(Endpoint::new("data", Operation::GspRw))
            .with_endpoint(Endpoint::new("get", Operation::GspR))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
    pub fn auth(&self) -> &dyn AuthPolicy {
        self.auth.as_ref()
    }
    pub fn counters(&self) -> &CounterSet {
        &self.counters
    }
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Endpoints registered under `name`; several may share one.
    pub fn endpoints_named(&self, name: &str) -> Vec<&Endpoint> {
        let name = name.trim_matches('/');
        self.endpoints
            .iter()
            .filter(|e| !e.is_unnamed() && e.name == name)
            .collect()
    }

    /// Every endpoint, named or not, able to serve `operation`.
    pub fn endpoints_for(&self, operation: Operation) -> Vec<&Endpoint> {
        self.endpoints
            .iter()
            .filter(|e| operation.provided_by(e.operation))
            .collect()
    }

    pub fn has_endpoint_for(&self, operation: Operation) -> bool {
        self.endpoints
            .iter()
            .any(|e| operation.provided_by(e.operation))
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Takes the dataset offline (or back online) without unregistering it.
    pub fn set_accepting(&self, accepting: bool) {
        info!(dataset = %self.name, accepting, "dataset availability changed");
        self.accepting.store(accepting, Ordering::Release);
    }

    /// Chosen from the store's capabilities on first use.
    pub fn policy(&self) -> TransactionPolicy {
        *self
            .policy
            .get_or_init(|| TransactionPolicy::for_store(self.store.as_ref()))
    }

    pub(crate) fn advisory_lock(&self) -> &Mutex<()> {
        &self.lock
    }
}

fn normalize_name(name: &str) -> String {
    format!("/{}", name.trim_matches('/'))
}

#[derive(Default)]
pub struct DatasetRegistry {
    datasets: Vec<Arc<Dataset>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.register(dataset);
        self
    }

    /// Replaces any dataset of the same name.
    pub fn register(&mut self, dataset: Dataset) -> Arc<Dataset> {
        let dataset = Arc::new(dataset);
        self.datasets.retain(|d| d.name != dataset.name);
        self.datasets.push(Arc::clone(&dataset));
        dataset
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Dataset>> {
        let name = normalize_name(name);
        self.datasets.iter().find(|d| d.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.datasets.iter().map(|d| d.name.as_str()).collect()
    }

    /// The dataset whose name is the longest prefix of `path` ending on a
    /// segment boundary, with the rest of the path (no leading `/`).
    pub fn resolve(&self, path: &str) -> Option<(&Dataset, String)> {
        self.datasets
            .iter()
            .filter_map(|d| {
                let rest = path.strip_prefix(d.name.as_str())?;
                if rest.is_empty() || rest.starts_with('/') || d.name == "/" {
                    Some((d.as_ref(), rest.trim_matches('/').to_string()))
                } else {
                    None
                }
            })
            .max_by_key(|(d, _)| d.name.len())
    }
}
