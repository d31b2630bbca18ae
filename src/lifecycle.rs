//! Transactions around handler execution.
//!
//! Every dataset gets one [`TransactionPolicy`], chosen from what its store
//! can do:
//!
//! * [`TransactionPolicy::Full`]: the store can roll back, so any failure
//!   aborts and nothing partial is ever visible.
//! * [`TransactionPolicy::Buffered`]: transactions without rollback. Writes
//!   must only start once the data is known to be good (see `ingest`).
//! * [`TransactionPolicy::Mutex`]: no transactions at all. An advisory lock
//!   held from begin to end serialises readers and writers.
//!
//! [`execute`] is the single place where execution errors are caught. It
//! always finishes the transaction and bumps the counters before the error
//! travels on to be written out.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{MutexGuard, PoisonError};

use http::header::ALLOW;
use http::{HeaderValue, Method};
use tracing::{error, info, warn};

use crate::action::Action;
use crate::counters::{CounterName, CounterSet};
use crate::error::{QuadgateError, Result};
use crate::operation::{HandlerSet, Operation};
use crate::registry::Dataset;
use crate::store::{Store, StoreTxn, TxnMode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionPolicy {
    Full,
    Buffered,
    Mutex,
}

impl TransactionPolicy {
    pub fn for_store(store: &dyn Store) -> Self {
        if store.supports_abort() {
            TransactionPolicy::Full
        } else if store.supports_transactions() {
            TransactionPolicy::Buffered
        } else {
            TransactionPolicy::Mutex
        }
    }

    pub fn supports_abort(&self) -> bool {
        matches!(self, TransactionPolicy::Full)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnState {
    Idle,
    Active(TxnMode),
    Committed,
    Aborted,
    Ended,
}

/// The transaction of one action: begun at most once, always ended.
pub struct ActionTxn<'a> {
    state: TxnState,
    policy: Option<TransactionPolicy>,
    handle: Option<Box<dyn StoreTxn>>,
    guard: Option<MutexGuard<'a, ()>>,
}

impl<'a> ActionTxn<'a> {
    pub fn new() -> Self {
        Self { state: TxnState::Idle, policy: None, handle: None, guard: None }
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, TxnState::Active(_))
    }

    pub fn policy(&self) -> Option<TransactionPolicy> {
        self.policy
    }

    pub fn begin(&mut self, dataset: &'a Dataset, mode: TxnMode) -> Result<()> {
        if self.state != TxnState::Idle {
            return Err(QuadgateError::Internal(format!(
                "Transaction already begun ({:?})",
                self.state
            )));
        }
        let policy = dataset.policy();
        if policy == TransactionPolicy::Mutex {
            // The lock guards nothing but ordering; poisoning carries no meaning.
            self.guard = Some(
                dataset
                    .advisory_lock()
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
        }
        match dataset.store().begin(mode) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.policy = Some(policy);
                self.state = TxnState::Active(mode);
                Ok(())
            }
            Err(e) => {
                self.guard = None;
                Err(e.into())
            }
        }
    }

    pub fn handle(&self) -> Result<&dyn StoreTxn> {
        match (&self.state, &self.handle) {
            (TxnState::Active(_), Some(handle)) => {
                let handle: &dyn StoreTxn = handle.as_ref();
                Ok(handle)
            }
            _ => Err(QuadgateError::Internal("No active transaction".into())),
        }
    }

    pub fn handle_mut(&mut self) -> Result<&mut dyn StoreTxn> {
        match (&self.state, &mut self.handle) {
            (TxnState::Active(_), Some(handle)) => {
                let handle: &mut dyn StoreTxn = handle.as_mut();
                Ok(handle)
            }
            _ => Err(QuadgateError::Internal("No active transaction".into())),
        }
    }

    pub fn promote(&mut self) -> Result<()> {
        self.handle_mut()?.promote()?;
        self.state = TxnState::Active(TxnMode::Write);
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.handle_mut()?.commit()?;
        self.state = TxnState::Committed;
        Ok(())
    }

    /// Rolls back under [`TransactionPolicy::Full`]. Otherwise there is
    /// nothing to roll back with; the transaction is just finished.
    pub fn abort(&mut self) -> Result<()> {
        let policy = self.policy;
        let handle = self.handle_mut()?;
        match policy {
            Some(TransactionPolicy::Full) => handle.abort()?,
            _ if handle.mode().is_write() => {
                warn!(?policy, "abort without rollback support; changes already made remain");
            }
            _ => {}
        }
        self.state = TxnState::Aborted;
        Ok(())
    }

    /// Terminal and safe to call repeatedly. A still active transaction is
    /// aborted first.
    pub fn end(&mut self) {
        if self.state == TxnState::Ended {
            return;
        }
        if self.is_active() {
            warn!(state = ?self.state, "transaction still active at end; forcing abort");
            if let Err(e) = self.abort() {
                warn!(error = %e, "forced abort failed");
            }
        }
        if let Some(mut handle) = self.handle.take() {
            handle.end();
        }
        self.guard = None;
        self.state = TxnState::Ended;
    }
}

impl Default for ActionTxn<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ActionTxn<'_> {
    fn drop(&mut self) {
        self.end();
    }
}

fn bump(counters: &CounterSet, name: CounterName, scope: &str) {
    if let Err(e) = counters.increment(name) {
        warn!(scope, error = %e, "counter increment failed");
    }
}

fn count(action: &Action<'_>, name: CounterName) {
    if let Some(endpoint) = action.endpoint {
        bump(endpoint.counters(), name, "endpoint");
    }
    if let Some(dataset) = action.dataset {
        bump(dataset.counters(), name, "dataset");
    }
}

// Operation specific failure counters live on the endpoint only.
fn count_failure(action: &Action<'_>, error: &QuadgateError) {
    let Some(endpoint) = action.endpoint else {
        return;
    };
    let name = match (action.operation, error) {
        (Some(Operation::Query), QuadgateError::Timeout(_)) => CounterName::QueryTimeouts,
        (Some(Operation::Query), _) => CounterName::QueryExecErrors,
        (Some(Operation::Update), _) => CounterName::UpdateExecErrors,
        (Some(Operation::Upload), _) => CounterName::UploadErrors,
        (Some(Operation::GspRw | Operation::QuadsRw), _)
            if matches!(action.method, Method::PUT | Method::POST) =>
        {
            CounterName::UploadErrors
        }
        _ => return,
    };
    if endpoint.counters().contains(name) {
        bump(endpoint.counters(), name, "endpoint");
    }
}

/// Method check then the operation's own validation. Nothing here may
/// open a transaction.
fn validate(action: &mut Action<'_>, handlers: &HandlerSet) -> Result<()> {
    let allowed = handlers.for_method(&action.method).is_some();
    if !allowed || action.method == Method::OPTIONS {
        if let Ok(allow) = HeaderValue::from_str(&handlers.allow_header()) {
            action.sink.set_header(ALLOW, allow);
        }
    }
    if !allowed {
        return Err(QuadgateError::method_not_allowed(format!(
            "Method {} not allowed for {}",
            action.method,
            action.operation.map(|o| o.name()).unwrap_or("this request")
        )));
    }
    if action.method == Method::OPTIONS {
        return Ok(());
    }
    (handlers.validate)(action)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

fn log_failure(action: &Action<'_>, e: &QuadgateError) {
    let id = action.id;
    match e {
        QuadgateError::ClientGone(_) => warn!(id, "client disconnected"),
        QuadgateError::Timeout(_) => info!(id, error = %e, "cancelled"),
        e if e.is_client_error() => warn!(id, status = e.status_code().as_u16(), error = %e.message()),
        e => error!(id, status = e.status_code().as_u16(), error = ?e, "request failed"),
    }
}

/// Runs the handler for the action's method inside the lifecycle.
pub fn execute(action: &mut Action<'_>, handlers: &HandlerSet) -> Result<()> {
    count(action, CounterName::Requests);
    let validated = match panic::catch_unwind(AssertUnwindSafe(|| validate(&mut *action, handlers))) {
        Ok(result) => result,
        Err(payload) => Err(QuadgateError::Internal(panic_message(payload))),
    };
    if let Err(e) = validated {
        count(action, CounterName::RequestsBad);
        log_failure(action, &e);
        return Err(e);
    }
    if !action.dataset()?.is_accepting() {
        count(action, CounterName::RequestsBad);
        return Err(QuadgateError::Unavailable("Dataset not available".into()));
    }
    let handler = handlers.for_method(&action.method).ok_or_else(|| {
        QuadgateError::method_not_allowed(format!("Method {} not allowed", action.method))
    })?;

    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| handler(&mut *action))) {
        Ok(result) => result,
        Err(payload) => Err(QuadgateError::Internal(panic_message(payload))),
    };

    if outcome.is_err() && action.txn.is_active() {
        if let Err(e) = action.txn.abort() {
            warn!(id = action.id, error = %e, "abort after failure failed");
        }
    }
    action.txn.end();

    match &outcome {
        Ok(()) => count(action, CounterName::RequestsGood),
        Err(e) => {
            count(action, CounterName::RequestsBad);
            count_failure(action, e);
            log_failure(action, e);
        }
    }
    outcome
}
