use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use thiserror::Error;

use crate::FastHasher;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CounterName {
    Requests,
    RequestsGood,
    RequestsBad,
    QueryTimeouts,
    QueryExecErrors,
    UpdateExecErrors,
    UploadErrors,
}

impl CounterName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterName::Requests => "Requests",
            CounterName::RequestsGood => "RequestsGood",
            CounterName::RequestsBad => "RequestsBad",
            CounterName::QueryTimeouts => "QueryTimeouts",
            CounterName::QueryExecErrors => "QueryExecErrors",
            CounterName::UpdateExecErrors => "UpdateExecErrors",
            CounterName::UploadErrors => "UploadErrors",
        }
    }
}

impl fmt::Display for CounterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CounterError {
    #[error("Unknown counter: {0}")]
    Unknown(CounterName),
}

/// A fixed set of monotonic counters. Names are registered up front;
/// incrementing anything else is an error.
#[derive(Debug)]
pub struct CounterSet {
    counters: HashMap<CounterName, AtomicU64, FastHasher>,
}

impl CounterSet {
    pub fn new(names: &[CounterName]) -> Self {
        Self {
            counters: names.iter().map(|&n| (n, AtomicU64::new(0))).collect(),
        }
    }

    /// `Requests`, `RequestsGood` and `RequestsBad`.
    pub fn requests() -> Self {
        Self::new(&[
            CounterName::Requests,
            CounterName::RequestsGood,
            CounterName::RequestsBad,
        ])
    }

    pub fn increment(&self, name: CounterName) -> Result<(), CounterError> {
        self.counters
            .get(&name)
            .map(|c| {
                c.fetch_add(1, Ordering::Relaxed);
            })
            .ok_or(CounterError::Unknown(name))
    }

    pub fn value(&self, name: CounterName) -> Option<u64> {
        self.counters.get(&name).map(|c| c.load(Ordering::Relaxed))
    }

    pub fn contains(&self, name: CounterName) -> bool {
        self.counters.contains_key(&name)
    }
}

impl Default for CounterSet {
    fn default() -> Self {
        Self::requests()
    }
}
