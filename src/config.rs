//! Body-parser configuration.
//!
//! Two shapes of the same three-parser structure exist:
//!
//! - [`BodyParserOptions`]: partial, every field optional. This is what
//!   callers write and what per-request overrides carry.
//! - [`BodyParserConfig`]: fully resolved, every field concrete. This is what
//!   the parsers consume.
//!
//! Resolution is a pure function: [`BodyParserConfig::resolve`] takes a base
//! and a set of options and returns a new config where every explicit option
//! field wins and every omitted one falls through to the base.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;

/// Default size limit for every parser: 1 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

pub(crate) const JSON_TYPE: &str = "application/json";
pub(crate) const URLENCODED_TYPE: &str = "application/x-www-form-urlencoded";
pub(crate) const TEXT_TYPE: &str = "text/plain";

// ── TypeMatcher ───────────────────────────────────────────────────────────────

/// Decides whether a parser accepts a request's `Content-Type`.
#[derive(Clone)]
pub enum TypeMatcher {
    /// Accepts when the content type contains this substring.
    Substring(String),
    /// Accepts when the pattern matches anywhere in the content type.
    Pattern(Regex),
    /// Accepts when the predicate returns `true`.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl TypeMatcher {
    pub fn substring(s: impl Into<String>) -> Self {
        Self::Substring(s.into())
    }

    pub fn pattern(re: &str) -> Result<Self, ConfigError> {
        Ok(Self::Pattern(Regex::new(re)?))
    }

    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    /// An empty content type never matches, whatever the matcher.
    pub fn matches(&self, content_type: &str) -> bool {
        if content_type.is_empty() {
            return false;
        }
        match self {
            Self::Substring(s) => content_type.contains(s.as_str()),
            Self::Pattern(re) => re.is_match(content_type),
            Self::Predicate(f) => f(content_type),
        }
    }
}

impl PartialEq for TypeMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Substring(a), Self::Substring(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => a.as_str() == b.as_str(),
            (Self::Predicate(a), Self::Predicate(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for TypeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Substring(s) => f.debug_tuple("Substring").field(s).finish(),
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for TypeMatcher {
    fn from(s: &str) -> Self {
        Self::Substring(s.to_owned())
    }
}

impl From<String> for TypeMatcher {
    fn from(s: String) -> Self {
        Self::Substring(s)
    }
}

impl From<Regex> for TypeMatcher {
    fn from(re: Regex) -> Self {
        Self::Pattern(re)
    }
}

impl<'de> Deserialize<'de> for TypeMatcher {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::Substring)
    }
}

// ── Per-parser settings ───────────────────────────────────────────────────────

/// Partial settings for one parser.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserOptions {
    pub enabled: Option<bool>,
    pub limit: Option<usize>,
    #[serde(rename = "type")]
    pub type_matcher: Option<TypeMatcher>,
}

impl ParserOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn type_matcher(mut self, matcher: impl Into<TypeMatcher>) -> Self {
        self.type_matcher = Some(matcher.into());
        self
    }

    /// Field-wise merge: fields set on `later` win.
    fn merge(&self, later: &ParserOptions) -> ParserOptions {
        ParserOptions {
            enabled: later.enabled.or(self.enabled),
            limit: later.limit.or(self.limit),
            type_matcher: later.type_matcher.clone().or_else(|| self.type_matcher.clone()),
        }
    }
}

/// Fully resolved settings for one parser.
#[derive(Clone, Debug, PartialEq)]
pub struct ParserConfig {
    pub enabled: bool,
    pub limit: usize,
    pub type_matcher: TypeMatcher,
}

impl ParserConfig {
    fn resolve(&self, options: &ParserOptions) -> ParserConfig {
        ParserConfig {
            enabled: options.enabled.unwrap_or(self.enabled),
            limit: options.limit.unwrap_or(self.limit),
            type_matcher: options.type_matcher.clone().unwrap_or_else(|| self.type_matcher.clone()),
        }
    }

    /// Settings used by the standalone parsing middleware: always enabled,
    /// limit and matcher from `options` or the defaults.
    pub(crate) fn standalone(options: &ParserOptions, default_type: &str) -> ParserConfig {
        ParserConfig {
            enabled: true,
            limit: options.limit.unwrap_or(DEFAULT_BODY_LIMIT),
            type_matcher: options.type_matcher.clone().unwrap_or_else(|| default_type.into()),
        }
    }
}

// ── Three-parser structures ───────────────────────────────────────────────────

/// Partial body-parser settings. Omitted parsers and fields fall through.
///
/// ```rust
/// use runway::{BodyParserOptions, ParserOptions};
///
/// let opts = BodyParserOptions::new()
///     .text(ParserOptions::new().enabled(true).limit(64 * 1024))
///     .json(ParserOptions::new().enabled(false));
/// # let _ = opts;
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BodyParserOptions {
    pub json: ParserOptions,
    pub urlencoded: ParserOptions,
    pub text: ParserOptions,
}

impl BodyParserOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(mut self, options: ParserOptions) -> Self {
        self.json = options;
        self
    }

    pub fn urlencoded(mut self, options: ParserOptions) -> Self {
        self.urlencoded = options;
        self
    }

    pub fn text(mut self, options: ParserOptions) -> Self {
        self.text = options;
        self
    }

    /// Accumulates `later` on top of `self`, per parser and per field.
    pub fn merge(&self, later: &BodyParserOptions) -> BodyParserOptions {
        BodyParserOptions {
            json: self.json.merge(&later.json),
            urlencoded: self.urlencoded.merge(&later.urlencoded),
            text: self.text.merge(&later.text),
        }
    }
}

/// Fully resolved body-parser settings.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyParserConfig {
    pub json: ParserConfig,
    pub urlencoded: ParserConfig,
    pub text: ParserConfig,
}

impl BodyParserConfig {
    /// Returns a new config with `options` applied over `self`.
    pub fn resolve(&self, options: &BodyParserOptions) -> BodyParserConfig {
        BodyParserConfig {
            json: self.json.resolve(&options.json),
            urlencoded: self.urlencoded.resolve(&options.urlencoded),
            text: self.text.resolve(&options.text),
        }
    }
}

/// JSON on, urlencoded and text off, 1 MiB limits, standard media types.
impl Default for BodyParserConfig {
    fn default() -> Self {
        let parser = |enabled, media: &str| ParserConfig {
            enabled,
            limit: DEFAULT_BODY_LIMIT,
            type_matcher: media.into(),
        };
        Self {
            json: parser(true, JSON_TYPE),
            urlencoded: parser(false, URLENCODED_TYPE),
            text: parser(false, TEXT_TYPE),
        }
    }
}

// ── RouterOptions ─────────────────────────────────────────────────────────────

/// Options accepted by [`Router::with_options`](crate::Router::with_options).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterOptions {
    pub body_parser: BodyParserOptions,
}
