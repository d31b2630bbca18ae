//! Requests and the per-request [`Action`].

use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use http::header::{ACCEPT, CONTENT_TYPE, HOST};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::dispatch::Services;
use crate::error::{QuadgateError, Result};
use crate::lifecycle::ActionTxn;
use crate::mediatype::MediaType;
use crate::operation::Operation;
use crate::registry::{Dataset, Endpoint};
use crate::response::ResponseSink;
use crate::store::{StoreTxn, TxnMode};

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// What the transport hands to the dispatcher.
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Box<dyn Read + Send>,
    /// Already authenticated by the transport, if at all.
    pub user: Option<String>,
}

impl RequestDescriptor {
    /// `path` may carry a query string.
    pub fn new(method: Method, path: &str) -> Self {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q.to_string())),
            None => (path, None),
        };
        Self {
            method,
            path: path.to_string(),
            query,
            headers: HeaderMap::new(),
            body: Box::new(io::empty()),
            user: None,
        }
    }
    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }
    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }
    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }
    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }
    pub fn with_query(mut self, query: Option<&str>) -> Self {
        self.query = query.map(str::to_string);
        self
    }
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
    /// Invalid names or values are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }
    pub fn with_content_type(self, content_type: &str) -> Self {
        self.with_header(CONTENT_TYPE.as_str(), content_type)
    }
    pub fn with_body(mut self, body: impl Read + Send + 'static) -> Self {
        self.body = Box::new(body);
        self
    }
    pub fn with_body_bytes(self, body: impl Into<Vec<u8>>) -> Self {
        self.with_body(Cursor::new(body.into()))
    }
    pub fn with_user(mut self, user: Option<&str>) -> Self {
        self.user = user.map(str::to_string);
        self
    }
}

/// Request parameters, from the query string and form bodies, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn parse(encoded: &str) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(encoded)
            .map_err(|e| QuadgateError::bad_request(format!("Malformed parameters: {e}")))?;
        Ok(Self { pairs })
    }
    pub fn extend(&mut self, other: Params) {
        self.pairs.extend(other.pairs);
    }
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }
    pub fn count(&self, name: &str) -> usize {
        self.pairs.iter().filter(|(k, _)| k == name).count()
    }
    pub fn contains(&self, name: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == name)
    }
    /// Distinct names in first-seen order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (k, _) in &self.pairs {
            if !names.contains(&k.as_str()) {
                names.push(k);
            }
        }
        names
    }
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Everything known about one request while it is being served.
pub struct Action<'a> {
    pub id: u64,
    pub started: DateTime<Utc>,
    pub method: Method,
    pub path: String,
    /// Absolute request URL without the query string.
    pub url: String,
    origin: String,
    raw_query: Option<String>,
    pub headers: HeaderMap,
    pub params: Params,
    pub content_type: Option<MediaType>,
    pub user: Option<String>,
    body: Option<Box<dyn Read + Send>>,
    pub services: &'a Services,
    pub dataset: Option<&'a Dataset>,
    pub endpoint: Option<&'a Endpoint>,
    pub operation: Option<Operation>,
    pub txn: ActionTxn<'a>,
    pub sink: &'a mut dyn ResponseSink,
}

impl<'a> Action<'a> {
    pub fn new(services: &'a Services, request: RequestDescriptor, sink: &'a mut dyn ResponseSink) -> Self {
        let origin = origin(&services.settings.base_url, &request.headers);
        Self {
            id: NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed),
            started: Utc::now(),
            url: format!("{origin}{}", request.path),
            origin,
            method: request.method,
            path: request.path,
            raw_query: request.query,
            headers: request.headers,
            params: Params::default(),
            content_type: None,
            user: request.user,
            body: Some(request.body),
            services,
            dataset: None,
            endpoint: None,
            operation: None,
            txn: ActionTxn::new(),
            sink,
        }
    }

    /// Parses parameters and the content type. HTML form bodies are read
    /// here and contribute parameters.
    pub fn prepare(&mut self) -> Result<()> {
        if let Some(query) = self.raw_query.as_deref().filter(|q| !q.is_empty()) {
            self.params = Params::parse(query)?;
        }
        if let Some(value) = self.header(CONTENT_TYPE.as_str()) {
            self.content_type = Some(MediaType::parse(value)?);
        }
        if self.has_content_type(FORM_URLENCODED) {
            let form = self.read_body_string()?;
            self.params.extend(Params::parse(form.trim())?);
        }
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn accept(&self) -> Option<&str> {
        self.header(ACCEPT.as_str())
    }

    pub fn has_content_type(&self, essence: &str) -> bool {
        self.content_type
            .as_ref()
            .is_some_and(|ct| ct.essence() == essence)
    }

    pub fn is_write_method(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::DELETE | Method::PATCH
        )
    }

    pub fn dataset(&self) -> Result<&'a Dataset> {
        self.dataset
            .ok_or_else(|| QuadgateError::Internal("Action has no dataset".into()))
    }

    /// Absolute URI of the dataset itself.
    pub fn dataset_url(&self) -> Option<String> {
        self.dataset
            .map(|d| format!("{}{}", self.origin, d.name()))
    }

    /// The request body, which can be taken once.
    pub fn take_body(&mut self) -> Result<Box<dyn Read + Send>> {
        self.body
            .take()
            .ok_or_else(|| QuadgateError::Internal("Request body already consumed".into()))
    }

    pub fn read_body_string(&mut self) -> Result<String> {
        let mut text = String::new();
        self.take_body()?
            .read_to_string(&mut text)
            .map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData => QuadgateError::bad_request("Body is not valid UTF-8"),
                _ => e.into(),
            })?;
        Ok(text)
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started).num_milliseconds()
    }

    pub fn begin(&mut self, mode: TxnMode) -> Result<()> {
        let dataset = self.dataset()?;
        self.txn.begin(dataset, mode)
    }
    pub fn begin_read(&mut self) -> Result<()> {
        self.begin(TxnMode::Read)
    }
    pub fn begin_write(&mut self) -> Result<()> {
        self.begin(TxnMode::Write)
    }
    pub fn commit(&mut self) -> Result<()> {
        self.txn.commit()
    }
    pub fn abort(&mut self) -> Result<()> {
        self.txn.abort()
    }
    pub fn end(&mut self) {
        self.txn.end()
    }

    /// Runs `f` in a read transaction that is always finished here.
    pub fn read<R>(&mut self, f: impl FnOnce(&dyn StoreTxn) -> Result<R>) -> Result<R> {
        self.begin_read()?;
        let result = self.txn.handle().and_then(f);
        let finish = match result {
            Ok(_) => self.txn.commit(),
            Err(_) => self.txn.abort(),
        };
        self.txn.end();
        let value = result?;
        finish?;
        Ok(value)
    }
}

fn origin(base_url: &str, headers: &HeaderMap) -> String {
    let base = Url::parse(base_url).ok();
    let scheme = base.as_ref().map(Url::scheme).unwrap_or("http");
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            base.as_ref().and_then(|b| {
                b.host_str().map(|h| match b.port() {
                    Some(port) => format!("{h}:{port}"),
                    None => h.to_string(),
                })
            })
        })
        .unwrap_or_else(|| "localhost".to_string());
    format!("{scheme}://{host}")
}
