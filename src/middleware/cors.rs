//! Cross-origin resource sharing.
//!
//! Every header this middleware computes goes both to `ctx.res` and to the
//! request's header annotations, so it lands on the final response even when
//! a handler returns a [`Response`](crate::Response) it built itself.
//!
//! ```rust,no_run
//! use runway::middleware::cors::{Cors, Origin};
//! use runway::Router;
//!
//! let app = Router::new().middleware(
//!     Cors::new()
//!         .origin(Origin::list(["https://app.example.com"]).pattern(r"\.example\.org$"))
//!         .credentials(true)
//!         .exposed_headers(["x-total-count"]),
//! );
//! # let _ = app;
//! ```

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use http::header::{
    ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN,
};
use http::Method;
use regex::Regex;

use crate::context::Context;
use crate::error::ConfigError;
use crate::handler::{BoxFuture, Handler, Next, Outcome};
use crate::request::Request;

const DEFAULT_METHODS: &str = "GET, HEAD, PUT, PATCH, POST, DELETE, OPTIONS";
const DEFAULT_MAX_AGE: u64 = 600;

/// A single allowed-origin entry.
#[derive(Clone, Debug)]
pub enum OriginPattern {
    Exact(String),
    Pattern(Regex),
}

impl OriginPattern {
    fn matches(&self, origin: &str) -> bool {
        match self {
            OriginPattern::Exact(allowed) => allowed == origin,
            OriginPattern::Pattern(re) => re.is_match(origin),
        }
    }
}

impl From<&str> for OriginPattern {
    fn from(s: &str) -> Self { Self::Exact(s.to_owned()) }
}

impl From<String> for OriginPattern {
    fn from(s: String) -> Self { Self::Exact(s) }
}

impl From<Regex> for OriginPattern {
    fn from(re: Regex) -> Self { Self::Pattern(re) }
}

type OriginFn = dyn Fn(&str, &Request) -> Option<String> + Send + Sync;

/// Which origins are allowed and what `Access-Control-Allow-Origin` says.
#[derive(Clone)]
pub enum Origin {
    /// `*`, or the request origin when credentials are on.
    Any,
    /// Echo whatever origin the client sent.
    Reflect,
    /// One or more exact origins or patterns.
    List(Vec<OriginPattern>),
    /// A callback returning the value to send, or `None` to reject.
    /// Returning `"*"` behaves like [`Origin::Any`].
    Predicate(Arc<OriginFn>),
}

impl Origin {
    pub fn exact(origin: impl Into<String>) -> Self {
        Self::List(vec![OriginPattern::Exact(origin.into())])
    }

    pub fn regex(pattern: &str) -> Result<Self, ConfigError> {
        Ok(Self::List(vec![OriginPattern::Pattern(Regex::new(pattern)?)]))
    }

    pub fn list<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<OriginPattern>,
    {
        Self::List(entries.into_iter().map(Into::into).collect())
    }

    pub fn predicate(f: impl Fn(&str, &Request) -> Option<String> + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    /// Adds a regex entry to a list policy.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regex or `self` is not a list.
    pub fn pattern(self, pattern: &str) -> Self {
        let re = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("invalid origin pattern `{pattern}`: {e}"));
        match self {
            Self::List(mut entries) => {
                entries.push(OriginPattern::Pattern(re));
                Self::List(entries)
            }
            _ => panic!("`pattern` extends an origin list"),
        }
    }

    fn resolve(&self, origin: &str, req: &Request, credentials: bool) -> Option<String> {
        let any = || if credentials { origin.to_owned() } else { "*".to_owned() };
        match self {
            Origin::Any => Some(any()),
            Origin::Reflect => Some(origin.to_owned()),
            Origin::List(entries) => entries.iter()
                .any(|e| e.matches(origin))
                .then(|| origin.to_owned()),
            Origin::Predicate(f) => match f(origin, req)? {
                value if value == "*" => Some(any()),
                value => Some(value),
            },
        }
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Any => f.write_str("Any"),
            Origin::Reflect => f.write_str("Reflect"),
            Origin::List(entries) => f.debug_tuple("List").field(entries).finish(),
            Origin::Predicate(_) => f.write_str("Predicate(<function>)"),
        }
    }
}

/// CORS policy middleware.
///
/// Requests without an `Origin` header, or from an origin the policy
/// rejects, pass through untouched. A preflight (`OPTIONS` carrying
/// `Access-Control-Request-Method`) from an allowed origin is answered
/// with `204` and the chain stops there.
#[derive(Clone, Debug)]
pub struct Cors {
    origin: Origin,
    methods: String,
    allowed_headers: Option<String>,
    exposed_headers: Option<String>,
    credentials: bool,
    max_age: u64,
    private_network: bool,
}

impl Cors {
    pub fn new() -> Self {
        Self {
            origin: Origin::Any,
            methods: DEFAULT_METHODS.to_owned(),
            allowed_headers: None,
            exposed_headers: None,
            credentials: false,
            max_age: DEFAULT_MAX_AGE,
            private_network: false,
        }
    }

    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// An empty list keeps the default methods.
    pub fn methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        let list = methods.into_iter().map(|m| m.to_string()).collect::<Vec<_>>();
        if !list.is_empty() {
            self.methods = list.join(", ");
        }
        self
    }

    /// Headers allowed on preflight. Without this the requested headers
    /// are echoed back.
    pub fn allowed_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_headers = join(headers);
        self
    }

    pub fn exposed_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exposed_headers = join(headers);
        self
    }

    pub fn credentials(mut self, credentials: bool) -> Self {
        self.credentials = credentials;
        self
    }

    /// Preflight cache lifetime in seconds.
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = seconds;
        self
    }

    /// Answer `Access-Control-Request-Private-Network: true` preflights.
    pub fn allow_private_network(mut self, allow: bool) -> Self {
        self.private_network = allow;
        self
    }

    fn preflight(&self, ctx: &mut Context, allow_origin: &str) {
        append_vary(ctx, "Access-Control-Request-Headers");
        append_vary(ctx, "Access-Control-Request-Method");
        set(ctx, "access-control-allow-origin", allow_origin);
        if self.credentials {
            set(ctx, "access-control-allow-credentials", "true");
        }
        set(ctx, "access-control-allow-methods", &self.methods);
        let requested = ctx.req.header(ACCESS_CONTROL_REQUEST_HEADERS.as_str()).map(str::to_owned);
        if let Some(allowed) = self.allowed_headers.as_deref().or(requested.as_deref()) {
            set(ctx, "access-control-allow-headers", allowed);
        }
        set(ctx, "access-control-max-age", &self.max_age.to_string());
        if self.private_network && ctx.req.header("access-control-request-private-network") == Some("true") {
            set(ctx, "access-control-allow-private-network", "true");
        }
    }
}

impl Default for Cors {
    fn default() -> Self { Self::new() }
}

impl Handler for Cors {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let Some(origin) = ctx.req.header(ORIGIN.as_str()).map(str::to_owned) else {
                next.run(ctx).await?;
                return Ok(None);
            };
            let Some(allow_origin) = self.origin.resolve(&origin, &ctx.req, self.credentials) else {
                next.run(ctx).await?;
                return Ok(None);
            };

            append_vary(ctx, "Origin");

            let preflight = ctx.req.method() == Method::OPTIONS
                && ctx.req.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD);
            if preflight {
                self.preflight(ctx, &allow_origin);
                let response = ctx.res.status(StatusCode::NO_CONTENT).send("");
                return Ok(Some(response));
            }

            set(ctx, "access-control-allow-origin", &allow_origin);
            if self.credentials {
                set(ctx, "access-control-allow-credentials", "true");
            }
            if let Some(exposed) = &self.exposed_headers {
                set(ctx, "access-control-expose-headers", exposed);
            }
            next.run(ctx).await?;
            Ok(None)
        })
    }
}

fn set(ctx: &mut Context, name: &str, value: &str) {
    ctx.req.annotate(name, value);
    ctx.res.header(name, value);
}

/// Merges `value` into the annotated `Vary`, keeping first-seen order.
fn append_vary(ctx: &mut Context, value: &str) {
    let existing = ctx.req.annotations().get("vary").and_then(|v| v.to_str().ok()).unwrap_or_default();
    let mut seen: Vec<&str> = Vec::new();
    for part in existing.split(',').chain(value.split(',')).map(str::trim) {
        if !part.is_empty() && !seen.contains(&part) {
            seen.push(part);
        }
    }
    let merged = seen.join(", ");
    set(ctx, "vary", &merged);
}

fn join<I, S>(items: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let list = items.into_iter().map(|s| s.as_ref().to_owned()).collect::<Vec<_>>();
    (!list.is_empty()).then(|| list.join(", "))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use http_body_util::Empty;

    use super::*;
    use crate::config::BodyParserConfig;
    use crate::handler::BoxedHandler;
    use crate::response::Response;

    fn ctx(method: Method, headers: &[(&str, &str)]) -> Context {
        let mut req = http::Request::builder().method(method).uri("/");
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        Context::new(req.body(Empty::<Bytes>::new()).unwrap(), BodyParserConfig::default())
    }

    async fn raw(_ctx: &mut Context, _next: Next<'_>) -> Response {
        Response::text("raw")
    }

    async fn run(cors: Cors, mut c: Context) -> Response {
        let p: Vec<BoxedHandler> = vec![Arc::new(cors), Arc::new(raw)];
        Next::new(&p).run(&mut c).await.unwrap();
        c.finalize()
    }

    #[tokio::test]
    async fn simple_request_gets_headers_on_a_raw_response() {
        let c = ctx(Method::GET, &[("origin", "https://a.test")]);
        let res = run(Cors::new().exposed_headers(["x-total"]), c).await;

        assert_eq!(res.body().as_ref(), b"raw");
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
        assert_eq!(res.header("access-control-expose-headers"), Some("x-total"));
        assert_eq!(res.header("vary"), Some("Origin"));
    }

    #[tokio::test]
    async fn credentials_reflect_the_origin_instead_of_wildcard() {
        let c = ctx(Method::GET, &[("origin", "https://a.test")]);
        let res = run(Cors::new().credentials(true), c).await;
        assert_eq!(res.header("access-control-allow-origin"), Some("https://a.test"));
        assert_eq!(res.header("access-control-allow-credentials"), Some("true"));
    }

    #[tokio::test]
    async fn preflight_short_circuits_with_204() {
        let c = ctx(Method::OPTIONS, &[
            ("origin", "https://a.test"),
            ("access-control-request-method", "PUT"),
            ("access-control-request-headers", "x-token"),
            ("access-control-request-private-network", "true"),
        ]);
        let res = run(Cors::new().allow_private_network(true), c).await;

        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert!(res.body().is_empty());
        assert_eq!(res.header("access-control-allow-methods"), Some(DEFAULT_METHODS));
        assert_eq!(res.header("access-control-allow-headers"), Some("x-token"));
        assert_eq!(res.header("access-control-max-age"), Some("600"));
        assert_eq!(res.header("access-control-allow-private-network"), Some("true"));
        assert_eq!(
            res.header("vary"),
            Some("Origin, Access-Control-Request-Headers, Access-Control-Request-Method"),
        );
    }

    #[tokio::test]
    async fn rejected_origin_adds_nothing() {
        let c = ctx(Method::GET, &[("origin", "https://evil.test")]);
        let res = run(Cors::new().origin(Origin::exact("https://a.test")), c).await;
        assert_eq!(res.body().as_ref(), b"raw");
        assert!(res.header("access-control-allow-origin").is_none());
        assert!(res.header("vary").is_none());
    }

    #[tokio::test]
    async fn list_accepts_exact_and_pattern_entries() {
        let policy = Origin::list(["https://a.test"]).pattern(r"\.example\.org$");
        let c = ctx(Method::GET, &[("origin", "https://app.example.org")]);
        let res = run(Cors::new().origin(policy), c).await;
        assert_eq!(res.header("access-control-allow-origin"), Some("https://app.example.org"));
    }

    #[tokio::test]
    async fn predicate_wildcard_behaves_like_any() {
        let policy = Origin::predicate(|origin, _| origin.ends_with(".test").then(|| "*".to_owned()));
        let c = ctx(Method::GET, &[("origin", "https://a.test")]);
        let res = run(Cors::new().origin(policy), c).await;
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    }

    #[tokio::test]
    async fn no_origin_header_passes_through() {
        let res = run(Cors::new(), ctx(Method::GET, &[])).await;
        assert!(res.header("access-control-allow-origin").is_none());
    }

    #[test]
    fn invalid_regex_is_a_config_error() {
        assert!(Origin::regex("(").is_err());
    }
}
