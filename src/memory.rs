//! In-memory store.
//!
//! Serves as the scratch buffer for buffered uploads and as a reference
//! backend. Its [`Capability`] selects which of the three transaction
//! behaviours it exhibits, so every lifecycle policy can be exercised
//! against it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use crate::store::{GraphName, Quad, Store, StoreError, StoreTxn, Triple, TxnMode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Snapshot isolation with rollback.
    Full,
    /// Single writer, writes land immediately, no rollback.
    NoAbort,
    /// No transactions; handles read and write the live data.
    NonTransactional,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetData {
    default: BTreeSet<Triple>,
    named: BTreeMap<String, BTreeSet<Triple>>,
}

impl DatasetData {
    pub fn default_graph(&self) -> Vec<Triple> {
        self.default.iter().cloned().collect()
    }
    pub fn named_graph(&self, iri: &str) -> Vec<Triple> {
        self.named
            .get(iri)
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default()
    }
    pub fn union_graph(&self) -> Vec<Triple> {
        let union: BTreeSet<&Triple> = self.named.values().flatten().collect();
        union.into_iter().cloned().collect()
    }
    pub fn contains_graph(&self, iri: &str) -> bool {
        self.named.get(iri).is_some_and(|g| !g.is_empty())
    }
    pub fn graph_names(&self) -> Vec<String> {
        self.named
            .iter()
            .filter(|(_, g)| !g.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }
    pub fn quads(&self) -> Vec<Quad> {
        let mut quads: Vec<Quad> = self
            .default
            .iter()
            .map(|t| Quad::new(GraphName::Default, t.clone()))
            .collect();
        for (name, graph) in &self.named {
            quads.extend(
                graph
                    .iter()
                    .map(|t| Quad::new(GraphName::Named(name.clone()), t.clone())),
            );
        }
        quads
    }
    pub fn len(&self) -> usize {
        self.default.len() + self.named.values().map(BTreeSet::len).sum::<usize>()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn insert(&mut self, quad: Quad) {
        match quad.graph {
            GraphName::Default => {
                self.default.insert(quad.triple);
            }
            GraphName::Named(name) => {
                self.named.entry(name).or_default().insert(quad.triple);
            }
        }
    }
    fn clear_graph(&mut self, graph: &GraphName) {
        match graph {
            GraphName::Default => self.default.clear(),
            GraphName::Named(name) => {
                self.named.remove(name);
            }
        }
    }
    fn clear(&mut self) {
        self.default.clear();
        self.named.clear();
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Lock(e.to_string())
}

struct Shared {
    committed: RwLock<Arc<DatasetData>>,
    writer: Mutex<bool>,
    writer_released: Condvar,
}

impl Shared {
    fn acquire_writer(&self) -> Result<(), StoreError> {
        let mut busy = self.writer.lock().map_err(lock_error)?;
        while *busy {
            busy = self.writer_released.wait(busy).map_err(lock_error)?;
        }
        *busy = true;
        Ok(())
    }
    fn release_writer(&self) {
        if let Ok(mut busy) = self.writer.lock() {
            *busy = false;
        }
        self.writer_released.notify_one();
    }
    fn current(&self) -> Arc<DatasetData> {
        let guard = self.committed.read().unwrap_or_else(|p| p.into_inner());
        Arc::clone(&*guard)
    }
    fn publish(&self, data: DatasetData) -> Result<(), StoreError> {
        let mut guard = self.committed.write().map_err(lock_error)?;
        *guard = Arc::new(data);
        Ok(())
    }
    fn mutate(&self, f: impl FnOnce(&mut DatasetData)) -> Result<(), StoreError> {
        let mut guard = self.committed.write().map_err(lock_error)?;
        f(Arc::make_mut(&mut *guard));
        Ok(())
    }
}

pub struct MemoryStore {
    capability: Capability,
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capability(Capability::Full)
    }
    pub fn without_abort() -> Self {
        Self::with_capability(Capability::NoAbort)
    }
    pub fn non_transactional() -> Self {
        Self::with_capability(Capability::NonTransactional)
    }
    pub fn with_capability(capability: Capability) -> Self {
        Self {
            capability,
            shared: Arc::new(Shared {
                committed: RwLock::new(Arc::new(DatasetData::default())),
                writer: Mutex::new(false),
                writer_released: Condvar::new(),
            }),
        }
    }
    pub fn capability(&self) -> Capability {
        self.capability
    }
    /// A copy of the committed contents.
    pub fn contents(&self) -> DatasetData {
        (*self.shared.current()).clone()
    }
    /// Loads quads outside of any transaction.
    pub fn load(&self, quads: impl IntoIterator<Item = Quad>) -> Result<(), StoreError> {
        self.shared.mutate(|data| {
            for quad in quads {
                data.insert(quad);
            }
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn supports_transactions(&self) -> bool {
        self.capability != Capability::NonTransactional
    }
    fn supports_abort(&self) -> bool {
        self.capability == Capability::Full
    }
    fn begin(&self, mode: TxnMode) -> Result<Box<dyn StoreTxn>, StoreError> {
        let mut txn = MemoryTxn {
            shared: Arc::clone(&self.shared),
            capability: self.capability,
            mode,
            view: View::Live,
            holds_writer: false,
            active: true,
        };
        match (self.capability, mode) {
            (Capability::NonTransactional, _) => {}
            (_, TxnMode::Read) | (_, TxnMode::ReadPromote) => {
                txn.view = View::Snapshot(self.shared.current());
            }
            (Capability::Full, TxnMode::Write) => {
                self.shared.acquire_writer()?;
                txn.holds_writer = true;
                txn.view = View::Working((*self.shared.current()).clone());
            }
            (Capability::NoAbort, TxnMode::Write) => {
                self.shared.acquire_writer()?;
                txn.holds_writer = true;
            }
        }
        Ok(Box::new(txn))
    }
}

enum View {
    Snapshot(Arc<DatasetData>),
    Working(DatasetData),
    Live,
}

struct MemoryTxn {
    shared: Arc<Shared>,
    capability: Capability,
    mode: TxnMode,
    view: View,
    holds_writer: bool,
    active: bool,
}

impl MemoryTxn {
    fn read<R>(&self, f: impl FnOnce(&DatasetData) -> R) -> R {
        match &self.view {
            View::Snapshot(data) => f(data.as_ref()),
            View::Working(data) => f(data),
            View::Live => f(self.shared.current().as_ref()),
        }
    }
    fn write(&mut self, f: impl FnOnce(&mut DatasetData)) -> Result<(), StoreError> {
        if !self.active {
            return Err(StoreError::NotActive);
        }
        if self.capability != Capability::NonTransactional && !self.mode.is_write() {
            return Err(StoreError::ReadOnly);
        }
        match &mut self.view {
            View::Working(data) => {
                f(data);
                Ok(())
            }
            View::Live => self.shared.mutate(f),
            View::Snapshot(_) => Err(StoreError::ReadOnly),
        }
    }
    fn release(&mut self) {
        if self.holds_writer {
            self.holds_writer = false;
            self.shared.release_writer();
        }
        self.active = false;
    }
}

impl StoreTxn for MemoryTxn {
    fn mode(&self) -> TxnMode {
        self.mode
    }
    fn promote(&mut self) -> Result<(), StoreError> {
        if !self.active {
            return Err(StoreError::NotActive);
        }
        match self.mode {
            TxnMode::Write => return Ok(()),
            TxnMode::Read => return Err(StoreError::Promote("read transaction".into())),
            TxnMode::ReadPromote => {}
        }
        match self.capability {
            Capability::NonTransactional => {}
            Capability::NoAbort => {
                self.shared.acquire_writer()?;
                self.holds_writer = true;
                self.view = View::Live;
            }
            Capability::Full => {
                self.shared.acquire_writer()?;
                self.holds_writer = true;
                self.view = View::Working((*self.shared.current()).clone());
            }
        }
        self.mode = TxnMode::Write;
        Ok(())
    }
    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.active {
            return Err(StoreError::NotActive);
        }
        let view = std::mem::replace(&mut self.view, View::Live);
        if let View::Working(data) = view {
            self.shared.publish(data)?;
        }
        self.release();
        Ok(())
    }
    fn abort(&mut self) -> Result<(), StoreError> {
        if !self.active {
            return Err(StoreError::NotActive);
        }
        if self.capability != Capability::Full && self.mode.is_write() {
            return Err(StoreError::AbortUnsupported);
        }
        self.view = View::Live;
        self.release();
        Ok(())
    }
    fn end(&mut self) {
        if self.active {
            // Working data is dropped here: uncommitted changes vanish.
            self.view = View::Live;
            self.release();
        }
    }

    fn default_graph(&self) -> Vec<Triple> {
        self.read(DatasetData::default_graph)
    }
    fn named_graph(&self, iri: &str) -> Vec<Triple> {
        self.read(|d| d.named_graph(iri))
    }
    fn union_graph(&self) -> Vec<Triple> {
        self.read(DatasetData::union_graph)
    }
    fn contains_graph(&self, iri: &str) -> bool {
        self.read(|d| d.contains_graph(iri))
    }
    fn graph_names(&self) -> Vec<String> {
        self.read(DatasetData::graph_names)
    }
    fn quads(&self) -> Vec<Quad> {
        self.read(DatasetData::quads)
    }

    fn insert(&mut self, quad: Quad) -> Result<(), StoreError> {
        self.write(|d| d.insert(quad))
    }
    fn clear(&mut self) -> Result<(), StoreError> {
        self.write(DatasetData::clear)
    }
    fn clear_graph(&mut self, graph: &GraphName) -> Result<(), StoreError> {
        self.write(|d| d.clear_graph(graph))
    }
    fn remove_graph(&mut self, iri: &str) -> Result<(), StoreError> {
        let graph = GraphName::Named(iri.to_string());
        self.write(|d| d.clear_graph(&graph))
    }
}

impl Drop for MemoryTxn {
    fn drop(&mut self) {
        self.end();
    }
}
