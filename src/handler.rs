//! Handler trait, continuation, and type erasure.
//!
//! # Shape of a handler
//!
//! Every pipeline stage, middleware or route handler alike, has the same
//! signature:
//!
//! ```text
//! async fn name(ctx: &mut Context, next: Next<'_>) -> impl IntoOutcome
//! ```
//!
//! Calling `next.run(ctx).await` hands control to the rest of the pipeline
//! and resumes once it finished. Not calling it ends the pipeline there.
//!
//! # How handlers are stored
//!
//! The router holds handlers of *different* types in one list, so each is
//! erased behind `Arc<dyn Handler>`:
//!
//! ```text
//! async fn hello(ctx, next) -> Response { … }      ← user writes this
//!        ↓ router.get("/", hello)
//! Arc::new(hello) as BoxedHandler                  ← one allocation at startup
//!        ↓
//! handler.call(ctx, next)  at request time         ← one vtable dispatch
//!        ↓
//! Box::pin(async { hello(ctx, next).await.into_outcome() })
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;

use crate::context::Context;
use crate::error::Error;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future borrowing for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a pipeline stage produced: maybe a response, or a failure.
pub type Outcome = Result<Option<Response>, Error>;

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

// ── Handler ───────────────────────────────────────────────────────────────────

/// One stage of the request pipeline.
///
/// Implemented automatically for every `async fn` of the shape shown in the
/// module docs. Implement it by hand for stateful middleware.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome>;
}

/// Bridges `async fn(&mut Context, Next<'_>)` items to [`Handler`].
///
/// The returned future borrows its arguments, so its type depends on the
/// lifetime. Naming it through an associated type per lifetime is what lets
/// a single blanket impl cover every such function.
#[doc(hidden)]
pub trait HandlerFn<'a>: Send + Sync + 'static {
    type Output: IntoOutcome;
    type Future: Future<Output = Self::Output> + Send + 'a;

    fn invoke(&self, ctx: &'a mut Context, next: Next<'a>) -> Self::Future;
}

impl<'a, F, Fut> HandlerFn<'a> for F
where
    F: Fn(&'a mut Context, Next<'a>) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'a,
    Fut::Output: IntoOutcome,
{
    type Output = Fut::Output;
    type Future = Fut;

    fn invoke(&self, ctx: &'a mut Context, next: Next<'a>) -> Fut {
        self(ctx, next)
    }
}

impl<F> Handler for F
where
    F: for<'a> HandlerFn<'a>,
{
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        let fut = self.invoke(ctx, next);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

/// Wraps a closure returning a boxed future as a [`Handler`].
///
/// Closures cannot return an `async` block that borrows their arguments, so
/// they box it instead:
///
/// ```rust
/// use runway::{from_fn, Error, Response, Router};
///
/// let app = Router::new().middleware(from_fn(|ctx, next| Box::pin(async move {
///     ctx.req.annotate("x-served-by", "runway");
///     next.run(ctx).await?;
///     Ok::<_, Error>(None::<Response>)
/// })));
/// # let _ = app;
/// ```
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    FromFn(f)
}

/// See [`from_fn`].
pub struct FromFn<F>(F);

impl<F> Handler for FromFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        (self.0)(ctx, next)
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The continuation: a forward-only cursor over the rest of the pipeline.
///
/// Consumed by [`run`](Next::run), so a handler can advance it at most once.
pub struct Next<'a> {
    rest: &'a [BoxedHandler],
}

impl<'a> Next<'a> {
    pub(crate) fn new(pipeline: &'a [BoxedHandler]) -> Self {
        Self { rest: pipeline }
    }

    /// Runs the next stage, which may in turn run the ones after it.
    ///
    /// A response the stage returns becomes the dispatch's result unless a
    /// stage that finishes later returns another. A failure or panic aborts
    /// the remaining stages and propagates to the caller.
    pub async fn run(self, ctx: &mut Context) -> Result<(), Error> {
        let Some((head, rest)) = self.rest.split_first() else {
            return Ok(());
        };

        let outcome = AssertUnwindSafe(head.call(ctx, Next { rest }))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)))?;

        if let Some(response) = outcome {
            ctx.capture(response);
        }
        Ok(())
    }

    /// Number of stages still ahead.
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// An ordered list of handlers for one route.
///
/// ```rust,no_run
/// # use runway::{Chain, Context, Next, Method, Router, Error};
/// # async fn auth(_: &mut Context, _: Next<'_>) {}
/// # async fn create(_: &mut Context, _: Next<'_>) {}
/// Router::new().route(Method::POST, "/users", Chain::new(auth).then(create));
/// ```
#[derive(Clone, Default)]
pub struct Chain {
    handlers: Vec<BoxedHandler>,
}

impl Chain {
    pub fn new(handler: impl Handler) -> Self {
        Self { handlers: vec![Arc::new(handler)] }
    }

    pub fn then(mut self, handler: impl Handler) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub(crate) fn into_handlers(self) -> Vec<BoxedHandler> {
        self.handlers
    }
}

// ── IntoOutcome ───────────────────────────────────────────────────────────────

/// Conversion of a handler's return value into an [`Outcome`].
///
/// - `()` and `None` produce no response.
/// - any [`IntoResponse`] value, bare or in `Some`, is a response.
/// - `Err(e)` fails the pipeline with `e`.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome { Ok(None) }
}

impl<R: IntoResponse> IntoOutcome for Option<R> {
    fn into_outcome(self) -> Outcome { Ok(self.map(IntoResponse::into_response)) }
}

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoOutcome,
    E: Into<Error>,
{
    fn into_outcome(self) -> Outcome {
        self.map_err(Into::<Error>::into)?.into_outcome()
    }
}

macro_rules! response_outcome {
    ($($ty:ty),*) => {$(
        impl IntoOutcome for $ty {
            fn into_outcome(self) -> Outcome { Ok(Some(self.into_response())) }
        }
    )*};
}

response_outcome!(Response, StatusCode, String, &'static str);

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http_body_util::Empty;

    use super::*;
    use crate::config::BodyParserConfig;
    use crate::error::HttpError;

    fn ctx() -> Context {
        Context::new(http::Request::new(Empty::<Bytes>::new()), BodyParserConfig::default())
    }

    async fn mark(ctx: &mut Context, next: Next<'_>) -> Result<(), Error> {
        ctx.req.annotate("x-before", "1");
        next.run(ctx).await?;
        ctx.req.annotate("x-after", "1");
        Ok(())
    }

    async fn stop(_ctx: &mut Context, _next: Next<'_>) -> Response {
        Response::text("stopped")
    }

    async fn unreachable_stage(_ctx: &mut Context, _next: Next<'_>) -> Response {
        panic!("stage after a short-circuit must not run")
    }

    async fn fail(_ctx: &mut Context, _next: Next<'_>) -> Result<(), HttpError> {
        Err(HttpError::new(409, "Conflict"))
    }

    async fn explode(_ctx: &mut Context, _next: Next<'_>) {
        panic!("kaboom");
    }

    fn boxed(h: impl Handler) -> BoxedHandler {
        Arc::new(h)
    }

    #[tokio::test]
    async fn stages_wrap_the_rest_of_the_pipeline() {
        let p = vec![boxed(mark), boxed(stop), boxed(unreachable_stage)];
        let mut c = ctx();
        Next::new(&p).run(&mut c).await.unwrap();

        assert_eq!(c.req.annotations().len(), 2);
        assert_eq!(c.finalize().body().as_ref(), b"stopped");
    }

    #[tokio::test]
    async fn errors_propagate_through_next() {
        let p = vec![boxed(mark), boxed(fail)];
        let mut c = ctx();
        let err = Next::new(&p).run(&mut c).await.unwrap_err();

        assert_eq!(err.as_http().map(|e| e.status().as_u16()), Some(409));
        // `mark` never reached its post-processing.
        assert!(c.req.annotations().get("x-after").is_none());
    }

    #[tokio::test]
    async fn panics_become_errors() {
        let p = vec![boxed(explode)];
        let mut c = ctx();
        let err = Next::new(&p).run(&mut c).await.unwrap_err();
        assert!(err.is_panic());
    }

    #[tokio::test]
    async fn empty_pipeline_is_a_no_op() {
        let mut c = ctx();
        let next = Next::new(&[]);
        assert_eq!(next.remaining(), 0);
        next.run(&mut c).await.unwrap();
    }

    #[test]
    fn outcomes() {
        assert!(().into_outcome().unwrap().is_none());
        assert!(None::<Response>.into_outcome().unwrap().is_none());
        assert!("hi".into_outcome().unwrap().is_some());
        assert!(Ok::<_, HttpError>(StatusCode::NO_CONTENT).into_outcome().unwrap().is_some());
        assert!(Err::<(), _>(HttpError::new(400, "bad")).into_outcome().is_err());
    }
}
