//! Incoming HTTP request type.
//!
//! [`Request`] is the handler-facing view of one inbound request: method,
//! URI, headers and a lazily read body, plus the per-request state the
//! pipeline accumulates (path params, locals, header annotations, the parsed
//! body).

use std::borrow::Cow;
use std::collections::HashMap;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::{Extensions, Method, Uri};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::body::{BodyKind, BodyParseError, BodyParser, BodyState, RequestBody};
use crate::config::{BodyParserConfig, BodyParserOptions, ParserConfig};
use crate::error::Error;

/// An incoming HTTP request.
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    params: HashMap<String, String>,
    locals: Extensions,
    annotations: HeaderMap,
    body: BodyParser,
}

impl Request {
    pub(crate) fn new(parts: http::request::Parts, body: RequestBody, parser: BodyParserConfig) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            params: HashMap::new(),
            locals: parts.extensions,
            annotations: HeaderMap::new(),
            body: BodyParser::new(body, parser),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// Path without the query string.
    pub fn path(&self) -> &str { self.uri.path() }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Content-Type` header, or `""`.
    pub fn content_type(&self) -> &str {
        content_type(&self.headers)
    }

    // ── Params and query ─────────────────────────────────────────────────────

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// Decoded query-string pairs, in order. Repeated keys appear repeatedly.
    pub fn query(&self) -> Vec<(Cow<'_, str>, Cow<'_, str>)> {
        url::form_urlencoded::parse(self.uri.query().unwrap_or_default().as_bytes()).collect()
    }

    /// First decoded value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<String> {
        url::form_urlencoded::parse(self.uri.query()?.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    // ── Locals and annotations ───────────────────────────────────────────────

    /// Typed per-request storage for passing values between middleware.
    /// Seeded with the inbound request's extensions.
    pub fn locals(&self) -> &Extensions { &self.locals }
    pub fn locals_mut(&mut self) -> &mut Extensions { &mut self.locals }

    /// Headers to apply to whatever response this request ends with,
    /// including responses handlers build without `ctx.res`.
    pub fn annotations(&self) -> &HeaderMap { &self.annotations }

    /// Records a header for the final response, replacing any earlier
    /// annotation of the same name. Invalid headers are skipped with a warning.
    pub fn annotate(&mut self, name: &str, value: &str) {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.annotations.insert(name, value);
            }
            _ => warn!(header = name, "ignoring invalid header annotation"),
        }
    }

    // ── Body ─────────────────────────────────────────────────────────────────

    /// The whole body. The stream is read on first call only.
    pub async fn raw_body(&mut self) -> Result<Bytes, Error> {
        self.body.raw().await
    }

    /// The whole body decoded as UTF-8, invalid sequences replaced.
    pub async fn raw_text(&mut self) -> Result<&str, Error> {
        self.body.raw_text().await
    }

    /// The parsed body, once a parser has produced one.
    pub fn body(&self) -> Option<&Value> {
        self.body.value()
    }

    /// Deserializes the parsed body into `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.body.value().map(|v| T::deserialize(v))
    }

    pub fn body_kind(&self) -> Option<BodyKind> {
        match self.body.state() {
            BodyState::Parsed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn body_parse_error(&self) -> Option<&BodyParseError> {
        match self.body.state() {
            BodyState::Errored(err) => Some(err),
            _ => None,
        }
    }

    pub fn body_state(&self) -> &BodyState {
        self.body.state()
    }

    /// `true` once any parser produced a value or an error.
    pub fn is_body_parsed(&self) -> bool {
        self.body.is_parsed()
    }

    /// Layers `overrides` over this request's parser settings. Successive
    /// calls accumulate; the last value for each field wins.
    pub fn apply_body_parser_overrides(&mut self, overrides: &BodyParserOptions) {
        self.body.apply_overrides(overrides);
    }

    /// The parser settings in effect for this request.
    pub fn body_parser_config(&self) -> BodyParserConfig {
        self.body.config()
    }

    /// Parses as JSON if the content type matches `config`.
    /// Returns `true` when a result (value or error) was recorded.
    pub async fn try_parse_json(&mut self, config: &ParserConfig) -> Result<bool, Error> {
        self.try_parse(BodyKind::Json, config).await
    }

    pub async fn try_parse_urlencoded(&mut self, config: &ParserConfig) -> Result<bool, Error> {
        self.try_parse(BodyKind::Urlencoded, config).await
    }

    pub async fn try_parse_text(&mut self, config: &ParserConfig) -> Result<bool, Error> {
        self.try_parse(BodyKind::Text, config).await
    }

    async fn try_parse(&mut self, kind: BodyKind, config: &ParserConfig) -> Result<bool, Error> {
        let content_type = content_type(&self.headers);
        self.body.try_parse(kind, content_type, config).await
    }

    /// Runs every enabled parser in order; see the crate docs for the
    /// fallback rules.
    pub async fn auto_parse_body(&mut self, config: &BodyParserConfig) -> Result<(), Error> {
        let content_type = content_type(&self.headers);
        self.body.auto_parse(content_type, config).await
    }

    /// Parses the body with this request's settings, optionally layered
    /// with one-off `overrides`, and returns the value. An already parsed
    /// body is returned as-is.
    pub async fn parse_body(&mut self, overrides: Option<&BodyParserOptions>) -> Result<Option<&Value>, Error> {
        if !self.body.is_parsed() {
            let base = self.body.config();
            let config = match overrides {
                Some(o) => base.resolve(o),
                None => base,
            };
            self.auto_parse_body(&config).await?;
        }
        Ok(self.body.value())
    }
}

fn content_type(headers: &HeaderMap) -> &str {
    headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_support {
    use bytes::Bytes;
    use http_body_util::Full;

    use super::*;
    use crate::body::box_body;

    /// Builds a request with a fixed in-memory body.
    pub(crate) fn request(req: http::Request<&'static str>) -> Request {
        let (parts, body) = req.into_parts();
        Request::new(parts, box_body(Full::new(Bytes::from_static(body.as_bytes()))), BodyParserConfig::default())
    }
}
