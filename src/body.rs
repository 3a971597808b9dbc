//! Per-request body reading and parsing.
//!
//! The body stream is read at most once; the bytes (and their text
//! decoding) are cached for every later caller. Parsing is a small state
//! machine:
//!
//! ```text
//!                 ┌──► Parsed { kind, value }
//!   Unattempted ──┤
//!                 └──► Errored { status, message }
//! ```
//!
//! Only `Unattempted` has outgoing transitions. Every parse call made in a
//! terminal state is a no-op.

use bytes::Bytes;
use http::StatusCode;
use http_body::Body;
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::{
    BodyParserConfig, BodyParserOptions, JSON_TYPE, ParserConfig, TypeMatcher, URLENCODED_TYPE,
};
use crate::error::{BoxError, Error};

/// The type-erased body stream every request carries.
pub(crate) type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

pub(crate) fn box_body<B>(body: B) -> RequestBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// Which parser produced the body value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Urlencoded,
    Text,
}

/// A recorded parse failure. Never raised; the body-parsing middleware turns
/// it into an immediate response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyParseError {
    pub status: StatusCode,
    pub message: &'static str,
}

impl BodyParseError {
    const TOO_LARGE: Self = Self { status: StatusCode::PAYLOAD_TOO_LARGE, message: "Payload Too Large" };
    const INVALID_JSON: Self = Self { status: StatusCode::BAD_REQUEST, message: "Invalid JSON" };
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum BodyState {
    #[default]
    Unattempted,
    Parsed { kind: BodyKind, value: Value },
    Errored(BodyParseError),
}

// ── BodyParser ────────────────────────────────────────────────────────────────

pub(crate) struct BodyParser {
    source: Option<RequestBody>,
    raw: Option<Bytes>,
    text: Option<String>,
    state: BodyState,
    defaults: BodyParserConfig,
    overrides: Option<BodyParserOptions>,
}

impl BodyParser {
    pub(crate) fn new(source: RequestBody, defaults: BodyParserConfig) -> Self {
        Self { source: Some(source), raw: None, text: None, state: BodyState::Unattempted, defaults, overrides: None }
    }

    pub(crate) fn state(&self) -> &BodyState {
        &self.state
    }

    pub(crate) fn is_parsed(&self) -> bool {
        !matches!(self.state, BodyState::Unattempted)
    }

    pub(crate) fn value(&self) -> Option<&Value> {
        match &self.state {
            BodyState::Parsed { value, .. } => Some(value),
            _ => None,
        }
    }

    // ── Configuration ────────────────────────────────────────────────────────

    /// Accumulates `overrides` onto any previously applied ones.
    pub(crate) fn apply_overrides(&mut self, overrides: &BodyParserOptions) {
        self.overrides = Some(match self.overrides.take() {
            Some(prev) => prev.merge(overrides),
            None => overrides.clone(),
        });
    }

    /// Request defaults with accumulated overrides resolved on top.
    pub(crate) fn config(&self) -> BodyParserConfig {
        match &self.overrides {
            Some(o) => self.defaults.resolve(o),
            None => self.defaults.clone(),
        }
    }

    // ── Raw access ───────────────────────────────────────────────────────────

    /// Reads the whole stream on first call; later calls return the cached
    /// bytes. A failed read is reported once and leaves an empty body behind.
    pub(crate) async fn raw(&mut self) -> Result<Bytes, Error> {
        if let Some(raw) = &self.raw {
            return Ok(raw.clone());
        }
        let bytes = match self.source.take() {
            Some(body) => body.collect().await.map_err(Error::boxed)?.to_bytes(),
            None => Bytes::new(),
        };
        self.raw = Some(bytes.clone());
        Ok(bytes)
    }

    pub(crate) async fn raw_text(&mut self) -> Result<&str, Error> {
        if self.text.is_none() {
            let raw = self.raw().await?;
            self.text = Some(String::from_utf8_lossy(&raw).into_owned());
        }
        Ok(self.text.as_deref().unwrap_or_default())
    }

    // ── Parsers ──────────────────────────────────────────────────────────────

    /// Attempts one parser. Returns `true` when the parser accepted the
    /// content type and recorded a result (value or error), `false` when it
    /// declined or a result already exists.
    pub(crate) async fn try_parse(
        &mut self,
        kind: BodyKind,
        content_type: &str,
        config: &ParserConfig,
    ) -> Result<bool, Error> {
        if self.is_parsed() || !config.type_matcher.matches(content_type) {
            return Ok(false);
        }

        let raw = self.raw().await?;
        if raw.len() > config.limit {
            self.fail(BodyParseError::TOO_LARGE, raw.len(), config.limit);
            return Ok(true);
        }

        let text = self.raw_text().await?;
        let parsed = match kind {
            BodyKind::Json if text.is_empty() => Ok(Value::Object(Map::new())),
            BodyKind::Json => serde_json::from_str(text).map_err(|_| BodyParseError::INVALID_JSON),
            BodyKind::Urlencoded => Ok(decode_form(raw.as_ref())),
            BodyKind::Text => Ok(Value::String(text.to_owned())),
        };
        match parsed {
            Ok(value) => self.state = BodyState::Parsed { kind, value },
            Err(err) => self.fail(err, raw.len(), config.limit),
        }
        Ok(true)
    }

    /// Runs the enabled parsers in order json → urlencoded → text, stopping
    /// at the first that accepts.
    ///
    /// When none of the configured matchers accepts, an enabled parser whose
    /// standard media type appears in the raw content type is forced anyway,
    /// and an enabled text parser finally accepts any non-empty content type.
    /// This leniency covers callers that swapped a matcher without changing
    /// what clients send.
    pub(crate) async fn auto_parse(&mut self, content_type: &str, config: &BodyParserConfig) -> Result<(), Error> {
        if self.is_parsed() {
            return Ok(());
        }
        if config.json.enabled && self.try_parse(BodyKind::Json, content_type, &config.json).await? {
            return Ok(());
        }
        if config.urlencoded.enabled
            && self.try_parse(BodyKind::Urlencoded, content_type, &config.urlencoded).await?
        {
            return Ok(());
        }
        if config.text.enabled && self.try_parse(BodyKind::Text, content_type, &config.text).await? {
            return Ok(());
        }

        if config.json.enabled && content_type.contains(JSON_TYPE) {
            let forced = forced(&config.json, JSON_TYPE.into());
            self.try_parse(BodyKind::Json, content_type, &forced).await?;
            return Ok(());
        }
        if config.urlencoded.enabled && content_type.contains(URLENCODED_TYPE) {
            let forced = forced(&config.urlencoded, URLENCODED_TYPE.into());
            self.try_parse(BodyKind::Urlencoded, content_type, &forced).await?;
            return Ok(());
        }
        if config.text.enabled {
            let forced = forced(&config.text, TypeMatcher::predicate(|_| true));
            self.try_parse(BodyKind::Text, content_type, &forced).await?;
        }
        Ok(())
    }

    fn fail(&mut self, err: BodyParseError, len: usize, limit: usize) {
        warn!(status = err.status.as_u16(), len, limit, "{}", err.message);
        self.state = BodyState::Errored(err);
    }
}

fn forced(config: &ParserConfig, type_matcher: TypeMatcher) -> ParserConfig {
    ParserConfig { enabled: true, limit: config.limit, type_matcher }
}

/// Flat form decoding; the last value wins for repeated keys.
fn decode_form(raw: &[u8]) -> Value {
    let map = url::form_urlencoded::parse(raw)
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect::<Map<String, Value>>();
    Value::Object(map)
}
