//! The response side of an action.
//!
//! Serialization proper belongs to the transport; handlers only see a
//! [`ResponseSink`].

use std::io::{self, Write};

use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderName};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tracing::{debug, warn};

use crate::error::QuadgateError;

/// Appended to a result stream cut short after output had been flushed.
pub const TRUNCATION_MARKER: &str = "\n##  Query cancelled due to timeout during execution   ##\n##  ****          Incomplete results           ****   ##\n";

pub trait ResponseSink {
    /// Ignored once the response is committed.
    fn set_status(&mut self, status: StatusCode);
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);
    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    /// Status and headers have been sent and can no longer change.
    fn is_committed(&self) -> bool;
    fn body_started(&self) -> bool;
    fn status(&self) -> StatusCode;
}

/// Collects the whole response in memory. A `flush` commits status and
/// headers, as it would on a real connection.
#[derive(Debug)]
pub struct BufferedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    committed: bool,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            committed: false,
        }
    }
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
    pub fn body(&self) -> &[u8] {
        &self.body
    }
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Vec<u8>) {
        (self.status, self.headers, self.body)
    }
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink for BufferedResponse {
    fn set_status(&mut self, status: StatusCode) {
        if !self.committed {
            self.status = status;
        }
    }
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if !self.committed {
            self.headers.insert(name, value);
        }
    }
    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.body.extend_from_slice(bytes);
        Ok(())
    }
    fn flush(&mut self) -> io::Result<()> {
        self.committed = true;
        Ok(())
    }
    fn is_committed(&self) -> bool {
        self.committed
    }
    fn body_started(&self) -> bool {
        !self.body.is_empty()
    }
    fn status(&self) -> StatusCode {
        self.status
    }
}

/// `io::Write` over a sink, for serializers.
pub struct SinkWriter<'s> {
    sink: &'s mut dyn ResponseSink,
}

impl<'s> SinkWriter<'s> {
    pub fn new(sink: &'s mut dyn ResponseSink) -> Self {
        Self { sink }
    }
}

impl Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write_body(buf)?;
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

pub fn set_content_type(sink: &mut dyn ResponseSink, content_type: &str) {
    sink.set_header(CONTENT_TYPE, header_value(content_type));
}

/// A complete response with a body.
pub fn send_content(
    sink: &mut dyn ResponseSink,
    status: StatusCode,
    content_type: &str,
    body: &[u8],
) -> io::Result<()> {
    sink.set_status(status);
    set_content_type(sink, content_type);
    sink.set_header(CONTENT_LENGTH, HeaderValue::from(body.len()));
    sink.write_body(body)
}

pub fn send_status(sink: &mut dyn ResponseSink, status: StatusCode) {
    sink.set_status(status);
}

/// Marks a result stream as cut short. The status becomes 503 unless it
/// has already gone out.
pub fn send_truncated(sink: &mut dyn ResponseSink) -> io::Result<()> {
    if !sink.is_committed() {
        sink.set_status(StatusCode::SERVICE_UNAVAILABLE);
    }
    sink.write_body(TRUNCATION_MARKER.as_bytes())?;
    sink.flush()
}

/// Writes the error as a single plain-text line. Does nothing to the body
/// when output has already started. A HEAD response gets the status only.
pub fn send_error(sink: &mut dyn ResponseSink, error: &QuadgateError, method: &Method) {
    if sink.body_started() {
        debug!(error = %error, "response already started; error not written");
        return;
    }
    let status = error.status_code();
    if *method == Method::HEAD {
        sink.set_status(status);
        return;
    }
    let body = format!("{}\n", error.message());
    if let Err(e) = send_content(sink, status, "text/plain; charset=utf-8", body.as_bytes()) {
        warn!(error = %e, "failed to write error response");
    }
}
