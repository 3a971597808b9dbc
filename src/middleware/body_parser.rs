//! Body-parsing middleware.
//!
//! The router already runs [`AutoBodyParser`] in front of every route with
//! its configured parsers. The explicit helpers here force one parser on
//! regardless of that configuration:
//!
//! ```rust,no_run
//! use runway::middleware::body_parser::{json, text};
//! use runway::{ParserOptions, Router};
//!
//! let app = Router::new()
//!     .middleware(json(ParserOptions::new().limit(2 * 1024 * 1024)))
//!     .middleware(text(ParserOptions::new().type_matcher("text/csv")));
//! # let _ = app;
//! ```
//!
//! A parse that fails (too large, malformed JSON) ends the chain with
//! `{"error": <message>}` and the failure's status.

use crate::body::{BodyKind, BodyParseError};
use crate::config::{BodyParserOptions, JSON_TYPE, ParserConfig, ParserOptions, TEXT_TYPE, URLENCODED_TYPE};
use crate::context::Context;
use crate::handler::{BoxFuture, Handler, Next, Outcome};
use crate::response::Response;
use crate::error::Error;

/// Parses `application/json` bodies.
pub fn json(options: ParserOptions) -> ParseBody {
    ParseBody::new(BodyKind::Json, &options, JSON_TYPE)
}

/// Parses `application/x-www-form-urlencoded` bodies.
pub fn urlencoded(options: ParserOptions) -> ParseBody {
    ParseBody::new(BodyKind::Urlencoded, &options, URLENCODED_TYPE)
}

/// Parses `text/plain` bodies.
pub fn text(options: ParserOptions) -> ParseBody {
    ParseBody::new(BodyKind::Text, &options, TEXT_TYPE)
}

/// Layers `options` over the parser settings of every request it sees.
/// Overrides from several of these accumulate in registration order.
pub fn body_parser(options: BodyParserOptions) -> Overrides {
    Overrides { options }
}

/// One always-enabled parser. See [`json`], [`urlencoded`] and [`text`].
pub struct ParseBody {
    kind: BodyKind,
    config: ParserConfig,
}

impl ParseBody {
    fn new(kind: BodyKind, options: &ParserOptions, default_type: &str) -> Self {
        Self { kind, config: ParserConfig::standalone(options, default_type) }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }
}

impl Handler for ParseBody {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            if !ctx.req.is_body_parsed() {
                let handled = match self.kind {
                    BodyKind::Json => ctx.req.try_parse_json(&self.config).await?,
                    BodyKind::Urlencoded => ctx.req.try_parse_urlencoded(&self.config).await?,
                    BodyKind::Text => ctx.req.try_parse_text(&self.config).await?,
                };
                if handled {
                    if let Some(response) = respond_if_failed(ctx)? {
                        return Ok(Some(response));
                    }
                }
            }
            next.run(ctx).await?;
            Ok(None)
        })
    }
}

/// See [`body_parser`].
pub struct Overrides {
    options: BodyParserOptions,
}

impl Handler for Overrides {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            ctx.req.apply_body_parser_overrides(&self.options);
            next.run(ctx).await?;
            Ok(None)
        })
    }
}

/// The parsing stage the router places between global middleware and route
/// handlers. Uses the request's settings, overrides included.
pub(crate) struct AutoBodyParser;

impl Handler for AutoBodyParser {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            if !ctx.req.is_body_parsed() {
                let config = ctx.req.body_parser_config();
                ctx.req.auto_parse_body(&config).await?;
                if let Some(response) = respond_if_failed(ctx)? {
                    return Ok(Some(response));
                }
            }
            next.run(ctx).await?;
            Ok(None)
        })
    }
}

fn respond_if_failed(ctx: &mut Context) -> Result<Option<Response>, Error> {
    let Some(&BodyParseError { status, message }) = ctx.req.body_parse_error() else {
        return Ok(None);
    };
    ctx.res.status(status).json(&serde_json::json!({ "error": message })).map(Some)
}
