//! Failure types.
//!
//! Handlers fail by returning `Err(Error)`. The dispatcher catches every
//! failure exactly once and turns it into a response (see [`crate::resolve`]).
//!
//! Two shapes of failure exist:
//!
//! - [`HttpError`]: a structured failure carrying a status code, message,
//!   extra headers and an optional explicit body. Clients see exactly what
//!   the handler chose.
//! - anything else: an unstructured failure. Clients see a fixed `500`; the
//!   original value is only ever handed to logging hooks.

use std::any::Any;
use std::fmt;

use http::StatusCode;
use http::header::{HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use crate::response::Response;

/// Boxed error used for body streams and unstructured failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ── Error ─────────────────────────────────────────────────────────────────────

/// A failure raised somewhere in the request pipeline.
///
/// Any `std::error::Error + Send + Sync + 'static` converts into `Error` with
/// `?`, so handlers can bubble up I/O, parse, or domain errors directly. Use
/// [`Error::downcast_ref`] to inspect the original value.
///
/// `Error` deliberately does not implement `std::error::Error` itself; that
/// is what makes the blanket `From` conversion possible.
pub struct Error {
    inner: BoxError,
}

impl Error {
    /// Wraps any error value.
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self { inner: Box::new(err) }
    }

    /// An unstructured failure carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self { inner: Box::new(Message(message.into())) }
    }

    pub(crate) fn boxed(inner: BoxError) -> Self {
        Self { inner }
    }

    /// Converts a caught panic payload into an unstructured failure.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_owned()
        };
        Self { inner: Box::new(Panic(message)) }
    }

    /// `true` when the wrapped value is a `T`.
    pub fn is<T: std::error::Error + 'static>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn downcast_ref<T: std::error::Error + 'static>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// The structured error, if this failure is one.
    pub fn as_http(&self) -> Option<&HttpError> {
        self.downcast_ref::<HttpError>()
    }

    /// Takes the structured error out, or gives the failure back.
    pub fn into_http(self) -> Result<HttpError, Error> {
        match self.inner.downcast::<HttpError>() {
            Ok(http) => Ok(*http),
            Err(inner) => Err(Self { inner }),
        }
    }

    /// `true` when this failure came from a panicking handler.
    pub fn is_panic(&self) -> bool {
        self.is::<Panic>()
    }

    pub fn into_inner(self) -> BoxError {
        self.inner
    }
}

impl<E> From<E> for Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::new(err)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

#[derive(Debug)]
struct Panic(String);

impl fmt::Display for Panic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler panicked: {}", self.0)
    }
}

impl std::error::Error for Panic {}

// ── HttpError ─────────────────────────────────────────────────────────────────

/// Explicit payload carried by an [`HttpError`].
#[derive(Debug)]
pub enum ErrorBody {
    /// A complete prebuilt response. Its body and headers are reused; the
    /// error's status and headers take precedence.
    Response(Response),
    /// Sent verbatim as `text/plain`.
    Text(String),
    /// Sent as JSON when the client accepts it.
    Json(Value),
}

/// A structured HTTP failure.
///
/// ```rust
/// use runway::HttpError;
///
/// let err = HttpError::new(403, "Forbidden").header("x-reason", "auth");
/// assert_eq!(err.status().as_u16(), 403);
/// ```
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Option<ErrorBody>,
    source: Option<BoxError>,
}

impl HttpError {
    /// A structured error with a message. The default body is
    /// `{"error": <message>}`.
    ///
    /// # Panics
    ///
    /// Panics if `status` is not a valid status code (100..=999). Inside a
    /// handler that panic is caught and answered with a plain `500`.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let body = Some(ErrorBody::Json(serde_json::json!({ "error": message })));
        Self { message, body, ..Self::bare(status) }
    }

    /// A structured error with no explicit message or body. The message
    /// defaults to `HTTP <status>`.
    ///
    /// # Panics
    ///
    /// Panics if `status` is not a valid status code (100..=999).
    pub fn status_only(status: u16) -> Self {
        Self::bare(status)
    }

    fn bare(status: u16) -> Self {
        let status = StatusCode::from_u16(status)
            .unwrap_or_else(|e| panic!("invalid status code `{status}`: {e}"));
        Self {
            status,
            message: format!("HTTP {}", status.as_u16()),
            headers: Vec::new(),
            body: None,
            source: None,
        }
    }

    /// Adds a header to the eventual response. Later values for the same
    /// name replace earlier ones.
    ///
    /// # Panics
    ///
    /// Panics if `name` or `value` is not a valid header, which inside a
    /// handler turns into a plain `500`. Use [`try_header`](Self::try_header)
    /// for values that come from untrusted input.
    pub fn header(self, name: &str, value: &str) -> Self {
        self.try_header(name, value)
            .unwrap_or_else(|e| panic!("invalid header `{name}: {value}`: {e}"))
    }

    /// Fallible form of [`header`](Self::header).
    pub fn try_header(mut self, name: &str, value: &str) -> Result<Self, http::Error> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.headers.retain(|(n, _)| *n != name);
        self.headers.push((name, value));
        Ok(self)
    }

    /// Replaces the body with a JSON payload.
    ///
    /// A value that cannot be represented as JSON falls back to its message
    /// as plain text.
    pub fn json(mut self, body: impl Serialize) -> Self {
        self.body = Some(match serde_json::to_value(body) {
            Ok(value) => ErrorBody::Json(value),
            Err(e) => ErrorBody::Text(e.to_string()),
        });
        self
    }

    /// Replaces the body with a plain-text payload.
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(ErrorBody::Text(body.into()));
        self
    }

    /// Replaces the body with a prebuilt response.
    pub fn response(mut self, response: Response) -> Self {
        self.body = Some(ErrorBody::Response(response));
        self
    }

    /// Records the underlying cause. Never sent to the client.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] { &self.headers }
    pub fn body(&self) -> Option<&ErrorBody> { self.body.as_ref() }

    pub(crate) fn into_parts(self) -> (StatusCode, String, Vec<(HeaderName, HeaderValue)>, Option<ErrorBody>) {
        (self.status, self.message, self.headers, self.body)
    }

    /// The fixed error every unstructured failure becomes.
    pub(crate) fn internal() -> Self {
        Self::new(500, "Internal Server Error")
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ── ConfigError ───────────────────────────────────────────────────────────────

/// Registration-time misconfiguration.
#[derive(Debug)]
pub enum ConfigError {
    /// A mount prefix must be non-empty and start with `/`.
    InvalidPrefix(String),
    /// A content-type pattern failed to compile.
    InvalidPattern(regex::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPrefix(p) => write!(f, "invalid mount prefix `{p}`: must start with `/`"),
            Self::InvalidPattern(e) => write!(f, "invalid content-type pattern: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidPrefix(_) => None,
            Self::InvalidPattern(e) => Some(e),
        }
    }
}

impl From<regex::Error> for ConfigError {
    fn from(e: regex::Error) -> Self {
        Self::InvalidPattern(e)
    }
}
