//! Catch-all error middleware with mapping and logging hooks.
//!
//! Register it first so it wraps everything after it. Failures it catches
//! are resolved here instead of at the router boundary, after an optional
//! `map` stage has had a chance to turn them into [`HttpError`]s.
//!
//! ```rust,no_run
//! use runway::middleware::error_handler::ErrorHandler;
//! use runway::{HttpError, Router};
//!
//! let app = Router::new().middleware(
//!     ErrorHandler::new()
//!         .map(|err, _ctx| {
//!             Ok(err.is::<serde_json::Error>().then(|| HttpError::new(400, "Invalid JSON").into()))
//!         })
//!         .logger(|err, ctx| eprintln!("{} {}: {err}", ctx.req.method(), ctx.req.path())),
//! );
//! # let _ = app;
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::warn;

use crate::context::Context;
use crate::error::{Error, HttpError};
use crate::handler::{BoxFuture, Handler, Next, Outcome};
use crate::resolve::build_error_response;

type MapFn = dyn Fn(&Error, &Context) -> Result<Option<Error>, Error> + Send + Sync;
type LogFn = dyn Fn(&Error, &Context) + Send + Sync;

#[derive(Clone, Default)]
pub struct ErrorHandler {
    map: Option<Arc<MapFn>>,
    logger: Option<Arc<LogFn>>,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrites a failure before it is resolved. `Ok(None)` keeps the
    /// original. An `Err` is passed to the logger and otherwise ignored.
    pub fn map(mut self, f: impl Fn(&Error, &Context) -> Result<Option<Error>, Error> + Send + Sync + 'static) -> Self {
        self.map = Some(Arc::new(f));
        self
    }

    /// Called once for every failure resolved to `500` and every
    /// [`HttpError`] with a 5xx status. A panicking logger is ignored and
    /// the error response is sent as usual.
    pub fn logger(mut self, f: impl Fn(&Error, &Context) + Send + Sync + 'static) -> Self {
        self.logger = Some(Arc::new(f));
        self
    }

    fn log(&self, err: &Error, ctx: &Context) {
        if let Some(logger) = &self.logger {
            if catch_unwind(AssertUnwindSafe(|| logger(err, ctx))).is_err() {
                warn!("error logger panicked");
            }
        }
    }

    fn rewrite(&self, err: Error, ctx: &Context) -> Error {
        let Some(map) = &self.map else { return err };
        match map(&err, ctx) {
            Ok(Some(mapped)) => mapped,
            Ok(None) => err,
            Err(map_err) => {
                self.log(&map_err, ctx);
                err
            }
        }
    }
}

impl Handler for ErrorHandler {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let Err(err) = next.run(ctx).await else {
                return Ok(None);
            };
            let err = self.rewrite(err, ctx);

            match err.as_http() {
                Some(http) if !http.status().is_server_error() => {}
                _ => self.log(&err, ctx),
            }
            let http = err.into_http()
                .unwrap_or_else(|other| HttpError::internal().with_source(other.into_inner()));

            Ok(Some(build_error_response(http, &ctx.req)))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Empty;

    use super::*;
    use crate::config::BodyParserConfig;
    use crate::handler::BoxedHandler;
    use crate::response::Response;

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("boom") }
    }

    impl std::error::Error for Boom {}

    async fn boom(_ctx: &mut Context, _next: Next<'_>) -> Result<(), Error> {
        Err(Boom.into())
    }

    async fn forbidden(_ctx: &mut Context, _next: Next<'_>) -> Result<(), HttpError> {
        Err(HttpError::new(403, "Forbidden"))
    }

    async fn unavailable(_ctx: &mut Context, _next: Next<'_>) -> Result<(), HttpError> {
        Err(HttpError::new(503, "Down"))
    }

    async fn run(handler: ErrorHandler, stage: BoxedHandler) -> Response {
        let mut ctx = Context::new(http::Request::new(Empty::<Bytes>::new()), BodyParserConfig::default());
        let p: Vec<BoxedHandler> = vec![Arc::new(handler), stage];
        Next::new(&p).run(&mut ctx).await.unwrap();
        ctx.finalize()
    }

    fn recording() -> (ErrorHandler, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = ErrorHandler::new().logger(move |err, _| sink.lock().unwrap().push(err.to_string()));
        (handler, seen)
    }

    #[tokio::test]
    async fn generic_failure_is_logged_once_and_hidden() {
        let (handler, seen) = recording();
        let res = run(handler, Arc::new(boom)).await;

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body().as_ref(), br#"{"error":"Internal Server Error"}"#);
        assert_eq!(*seen.lock().unwrap(), vec!["boom".to_owned()]);
    }

    #[tokio::test]
    async fn client_errors_are_not_logged() {
        let (handler, seen) = recording();
        let res = run(handler, Arc::new(forbidden)).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_errors_are_logged() {
        let (handler, seen) = recording();
        let res = run(handler, Arc::new(unavailable)).await;
        assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn panicking_logger_keeps_the_error_response() {
        let handler = ErrorHandler::new().logger(|_, _| panic!("logger broke"));
        let res = run(handler, Arc::new(unavailable)).await;
        assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.body().as_ref(), br#"{"error":"Down"}"#);
    }

    #[tokio::test]
    async fn map_turns_failures_into_http_errors() {
        let handler = ErrorHandler::new()
            .map(|err, _| Ok(err.is::<Boom>().then(|| HttpError::new(418, "teapot").into())));
        let res = run(handler, Arc::new(boom)).await;
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn failing_map_keeps_the_original_error() {
        let (handler, seen) = recording();
        let handler = handler.map(|_, _| Err(Error::msg("mapper broke")));
        let res = run(handler, Arc::new(boom)).await;

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(*seen.lock().unwrap(), vec!["mapper broke".to_owned(), "boom".to_owned()]);
    }
}
