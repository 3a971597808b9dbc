//! # runway
//!
//! Express-style routing and middleware over plain `http` request and
//! response types. Routes, path parameters, middleware chains, sub-router
//! mounts, lazy body parsing and structured errors; nothing else.
//!
//! ## The contract
//!
//! The caller owns the socket. Hand each request to [`Router::dispatch`] (or
//! serve [`Router::into_service`] with hyper) and get exactly one
//! [`Response`] back. No failure escapes: structured errors keep the status,
//! headers and body their handler chose; everything else, panics included,
//! becomes `500 {"error":"Internal Server Error"}`.
//!
//! ## How a request flows
//!
//! 1. Mounted sub-routers are tried first, in registration order. The first
//!    whose prefix the path starts with gets the request with the prefix
//!    stripped, 404 or not.
//! 2. Otherwise the first route with the same method and a matching pattern
//!    wins. Registration order decides, never specificity.
//! 3. The pipeline is global middleware, then the automatic body parser,
//!    then the route's handlers. Each stage decides whether to call
//!    `next.run(ctx)`.
//! 4. The response is the last one a stage returned, else the last one
//!    `ctx.res` built, else an empty `200`. Header annotations from
//!    `ctx.req.annotate` are written over it.
//! 5. Nothing matched: `404 {"error":"Not Found"}`.
//!
//! ## Body parsing
//!
//! The body is read at most once per request, on first use. By default only
//! JSON is parsed automatically; urlencoded and text parsers are switched on
//! through [`RouterOptions`], [`Router::configure_body_parser`], or per
//! request with [`middleware::body_parser`]. A body over the limit records
//! `413`, malformed JSON records `400`; the parsing stage answers with
//! `{"error": <message>}`.
//!
//! When no configured matcher accepts the content type, an enabled parser
//! whose standard media type appears in it anyway is forced, and an enabled
//! text parser finally accepts any content type.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use runway::middleware::{Cors, ErrorHandler};
//! use runway::{Context, Error, HttpError, Next, Response, Router};
//!
//! async fn get_user(ctx: &mut Context, _next: Next<'_>) -> Result<Response, Error> {
//!     let id = ctx.req.param("id").unwrap_or("unknown").to_owned();
//!     ctx.res.json(&serde_json::json!({ "id": id }))
//! }
//!
//! async fn create_user(ctx: &mut Context, _next: Next<'_>) -> Result<Response, Error> {
//!     let Some(body) = ctx.req.body().cloned() else {
//!         return Err(HttpError::new(400, "Missing body").into());
//!     };
//!     ctx.res.header("location", "/users/99");
//!     ctx.res.created(&body)
//! }
//!
//! let api = Router::new()
//!     .get("/users/:id", get_user)
//!     .post("/users", create_user);
//!
//! let app = Router::new()
//!     .middleware(ErrorHandler::new())
//!     .middleware(Cors::new())
//!     .mount("/api", api);
//!
//! // hand `app.into_service()` to a hyper connection builder
//! # let _ = app;
//! ```

mod body;
mod config;
mod context;
mod error;
mod handler;
mod path;
mod request;
mod resolve;
mod response;
mod router;
mod service;

pub mod middleware;

pub use body::{BodyKind, BodyParseError, BodyState};
pub use config::{
    BodyParserConfig, BodyParserOptions, DEFAULT_BODY_LIMIT, ParserConfig, ParserOptions,
    RouterOptions, TypeMatcher,
};
pub use context::Context;
pub use error::{BoxError, ConfigError, Error, ErrorBody, HttpError};
pub use handler::{BoxFuture, Chain, FromFn, Handler, IntoOutcome, Next, Outcome, from_fn};
pub use request::Request;
pub use resolve::{build_error_response, prefers_json, resolve_error};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{Router, Use};
pub use service::RouterService;

pub use http::{Method, StatusCode};
