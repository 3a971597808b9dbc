//! Request router and dispatcher.
//!
//! Routes and mounts are matched in registration order, never by
//! specificity. The first mount whose prefix the path starts with takes the
//! request unconditionally; otherwise the first route with the same method
//! and a matching pattern does. Nothing matched means `404`.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http::uri::{PathAndQuery, Uri};
use http::{Method, StatusCode};
use http_body::Body;
use tracing::debug;

use crate::body::{RequestBody, box_body};
use crate::config::{BodyParserConfig, BodyParserOptions, RouterOptions};
use crate::context::Context;
use crate::error::{BoxError, ConfigError};
use crate::handler::{BoxFuture, BoxedHandler, Chain, Handler, Next};
use crate::middleware::body_parser::AutoBodyParser;
use crate::path::PathPattern;
use crate::resolve::resolve_error;
use crate::response::Response;

struct Route {
    method: Method,
    pattern: PathPattern,
    handlers: Vec<BoxedHandler>,
}

struct Mount {
    prefix: String,
    router: Router,
}

/// What [`Router::with`] registers: global middleware or a sub-router.
pub enum Use {
    Middleware(BoxedHandler),
    Mount(String, Router),
}

impl<H: Handler> From<H> for Use {
    fn from(handler: H) -> Self {
        Self::Middleware(Arc::new(handler))
    }
}

impl<P: Into<String>> From<(P, Router)> for Use {
    fn from((prefix, router): (P, Router)) -> Self {
        Self::Mount(prefix.into(), router)
    }
}

/// The application router.
///
/// Build it once at startup; registration methods return `self` so calls
/// chain. After that it is shared read-only across concurrent dispatches.
///
/// ```rust,no_run
/// use runway::{Context, Error, Next, Response, Router};
///
/// async fn get_user(ctx: &mut Context, _next: Next<'_>) -> Result<Response, Error> {
///     let id = ctx.req.param("id").unwrap_or_default().to_owned();
///     ctx.res.json(&serde_json::json!({ "id": id }))
/// }
///
/// let api = Router::new().get("/users/:id", get_user);
/// let app = Router::new().mount("/api", api);
/// # let _ = app;
/// ```
pub struct Router {
    routes: Vec<Route>,
    mounts: Vec<Mount>,
    middleware: Vec<BoxedHandler>,
    body_parser: BodyParserConfig,
    auto_body_parser: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    /// A router whose body-parser settings are `options` resolved over the
    /// global defaults.
    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            routes: Vec::new(),
            mounts: Vec::new(),
            middleware: Vec::new(),
            body_parser: BodyParserConfig::default().resolve(&options.body_parser),
            auto_body_parser: Arc::new(AutoBodyParser),
        }
    }

    // ── Routes ───────────────────────────────────────────────────────────────

    /// Registers a handler chain for a method + pattern pair.
    ///
    /// Path parameters use `:name` segments; `ctx.req.param("name")`
    /// retrieves them. Registering the same pattern twice keeps both; the
    /// first one wins at dispatch.
    pub fn route(mut self, method: Method, pattern: &str, chain: Chain) -> Self {
        self.routes.push(Route {
            method,
            pattern: PathPattern::compile(pattern),
            handlers: chain.into_handlers(),
        });
        self
    }

    /// Register a single handler for a method + pattern pair.
    pub fn on(self, method: Method, pattern: &str, handler: impl Handler) -> Self {
        self.route(method, pattern, Chain::new(handler))
    }

    pub fn get(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, pattern, handler)
    }

    pub fn patch(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, pattern, handler)
    }

    pub fn options(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::OPTIONS, pattern, handler)
    }

    // ── Middleware and mounts ────────────────────────────────────────────────

    /// Adds global middleware. It runs, in registration order, before the
    /// automatic body parser and the matched route's handlers.
    pub fn middleware(mut self, handler: impl Handler) -> Self {
        self.middleware.push(Arc::new(handler));
        self
    }

    /// Delegates every path starting with `prefix` to `router`.
    ///
    /// The test is a plain string prefix: `/api` also takes `/apikey/x`,
    /// which the mounted router sees as `/key/x`.
    ///
    /// # Panics
    ///
    /// Panics if `prefix` is empty or does not start with `/`.
    pub fn mount(self, prefix: &str, router: Router) -> Self {
        self.try_mount(prefix, router)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Fallible form of [`mount`](Router::mount).
    pub fn try_mount(mut self, prefix: &str, router: Router) -> Result<Self, ConfigError> {
        if !prefix.starts_with('/') {
            return Err(ConfigError::InvalidPrefix(prefix.to_owned()));
        }
        self.mounts.push(Mount { prefix: prefix.to_owned(), router });
        Ok(self)
    }

    /// Registers either kind of [`Use`].
    ///
    /// ```rust,no_run
    /// # use runway::{Context, Next, Router};
    /// # async fn log(_: &mut Context, _: Next<'_>) {}
    /// Router::new()
    ///     .with(log)
    ///     .with(("/admin", Router::new()));
    /// ```
    pub fn with(self, item: impl Into<Use>) -> Self {
        match item.into() {
            Use::Middleware(handler) => {
                let mut this = self;
                this.middleware.push(handler);
                this
            }
            Use::Mount(prefix, router) => self.mount(&prefix, router),
        }
    }

    // ── Body-parser settings ─────────────────────────────────────────────────

    /// Replaces the settings with `options` resolved over the global defaults.
    pub fn set_body_parser(&mut self, options: &BodyParserOptions) {
        self.body_parser = BodyParserConfig::default().resolve(options);
    }

    /// Layers `options` over the current settings.
    pub fn configure_body_parser(&mut self, options: &BodyParserOptions) {
        self.body_parser = self.body_parser.resolve(options);
    }

    pub fn body_parser_config(&self) -> &BodyParserConfig {
        &self.body_parser
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Resolves one request into one response. Never fails: every failure
    /// inside the pipeline becomes an error response.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> Response
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        self.handle(req.map(box_body)).await
    }

    fn handle(&self, req: http::Request<RequestBody>) -> BoxFuture<'_, Response> {
        Box::pin(async move {
            let path = req.uri().path().to_owned();

            for mount in &self.mounts {
                if let Some(rest) = path.strip_prefix(mount.prefix.as_str()) {
                    debug!(prefix = %mount.prefix, path = %path, "delegating to mounted router");
                    let (mut parts, body) = req.into_parts();
                    parts.uri = rewrite_path(&parts.uri, rest);
                    return mount.router.handle(http::Request::from_parts(parts, body)).await;
                }
            }

            for route in &self.routes {
                if !route.method.as_str().eq_ignore_ascii_case(req.method().as_str()) {
                    continue;
                }
                let Some(params) = route.pattern.matches(&path) else {
                    continue;
                };
                debug!(method = %route.method, pattern = route.pattern.as_str(), path = %path, "route matched");
                return self.run(route, params, req).await;
            }

            not_found()
        })
    }

    async fn run(&self, route: &Route, params: Vec<(String, String)>, req: http::Request<RequestBody>) -> Response {
        let mut ctx = Context::new(req, self.body_parser.clone());
        ctx.req.set_params(params.into_iter().collect::<HashMap<_, _>>());

        let pipeline: Vec<BoxedHandler> = self.middleware.iter()
            .chain(std::iter::once(&self.auto_body_parser))
            .chain(route.handlers.iter())
            .cloned()
            .collect();

        if let Err(err) = Next::new(&pipeline).run(&mut ctx).await {
            let response = resolve_error(err, &ctx.req);
            ctx.capture(response);
        }
        ctx.finalize()
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Replaces the path of `uri` with `rest` (or `/` when empty), keeping the
/// query string.
fn rewrite_path(uri: &Uri, rest: &str) -> Uri {
    // The remainder of a plain prefix match may lack its leading slash.
    let path = if rest.starts_with('/') { rest.to_owned() } else { format!("/{rest}") };
    let path_and_query = match uri.query() {
        Some(q) => format!("{path}?{q}"),
        None => path,
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = PathAndQuery::try_from(path_and_query).ok();
    Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
}

fn not_found() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Response::from_parts(StatusCode::NOT_FOUND, headers, Bytes::from_static(br#"{"error":"Not Found"}"#))
}
