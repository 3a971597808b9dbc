//! Outgoing HTTP response type, the per-request [`ResponseBuilder`], and the
//! [`IntoResponse`] conversion trait.
//!
//! A handler either returns a [`Response`] directly or builds one through
//! `ctx.res`. The builder remembers the last response it produced; the
//! router falls back to it when no handler returned one explicitly.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use tracing::warn;

use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
#[derive(Clone, Copy, Debug)]
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }

    fn header_value(&self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK)
///
/// ```rust
/// use runway::{Response, StatusCode};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// Convert to a hyper-compatible response with [`Response::into_inner`].
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: HeaderMap,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK` with pre-serialized JSON bytes.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::typed(ContentType::Json, body.into())
    }

    /// `200 OK` — `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::typed(ContentType::Text, Bytes::from(body.into()))
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: HeaderMap::new(), status: code }
    }

    fn typed(content_type: ContentType, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, content_type.header_value());
        Self { body, headers, status: StatusCode::OK }
    }

    /// The same response with a different status.
    pub fn with_status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub(crate) fn from_parts(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self { body, headers, status }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// Case-insensitive header lookup returning the first value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the same response with `extra` written over its headers.
    /// Status and body are untouched.
    pub(crate) fn with_headers<'a, I>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = (&'a HeaderName, &'a HeaderValue)>,
    {
        for (name, value) in extra {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Converts into the `http` response type hyper serves.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl Default for Response {
    /// Empty `200 OK`.
    fn default() -> Self {
        Self::status(StatusCode::OK)
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// The per-request response builder exposed as `ctx.res`.
///
/// Setters accumulate status (default `200`) and headers. Each terminal
/// method (`json`, `text`, `send`, ...) produces a [`Response`] from the
/// accumulated state and remembers it as [`last`](ResponseBuilder::last).
#[derive(Debug)]
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
    last: Option<Response>,
}

impl ResponseBuilder {
    pub(crate) fn new() -> Self {
        Self { headers: HeaderMap::new(), status: StatusCode::OK, last: None }
    }

    pub fn status(&mut self, code: StatusCode) -> &mut Self {
        self.status = code;
        self
    }

    /// Sets a header, replacing any previous value. Invalid names or values
    /// are skipped with a warning.
    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(header = name, "ignoring invalid response header"),
        }
        self
    }

    /// Serializes `data` as JSON.
    pub fn json<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<Response, Error> {
        let body = serde_json::to_vec(data)?;
        self.headers.insert(CONTENT_TYPE, ContentType::Json.header_value());
        Ok(self.finish(Bytes::from(body)))
    }

    pub fn text(&mut self, data: impl Into<String>) -> Response {
        self.headers.insert(CONTENT_TYPE, ContentType::Text.header_value());
        self.finish(Bytes::from(data.into()))
    }

    /// Terminates with a typed body. Use this for XML, HTML, binary, SSE, etc.
    pub fn bytes(&mut self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.headers.insert(CONTENT_TYPE, content_type.header_value());
        self.finish(body.into())
    }

    /// Sends `body` as-is with whatever headers were set.
    pub fn send(&mut self, body: impl Into<Bytes>) -> Response {
        self.finish(body.into())
    }

    /// `200` with a JSON body.
    pub fn ok<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<Response, Error> {
        self.status = StatusCode::OK;
        self.json(data)
    }

    /// `201` with a JSON body.
    pub fn created<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<Response, Error> {
        self.status = StatusCode::CREATED;
        self.json(data)
    }

    pub fn no_content(&mut self) -> Response {
        self.status = StatusCode::NO_CONTENT;
        self.send(Bytes::new())
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// The most recently built response, if any.
    pub fn last(&self) -> Option<&Response> {
        self.last.as_ref()
    }

    pub(crate) fn take_last(&mut self) -> Option<Response> {
        self.last.take()
    }

    fn finish(&mut self, body: Bytes) -> Response {
        let res = Response::from_parts(self.status, self.headers.clone(), body);
        self.last = Some(res.clone());
        res
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a [`StatusCode`] directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}
