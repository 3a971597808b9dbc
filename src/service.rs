//! hyper integration.
//!
//! [`RouterService`] is what a hyper connection calls once per request. The
//! error type is [`Infallible`]: every failure has already been turned into a
//! response by the router, so hyper never sees one.
//!
//! ```rust,no_run
//! use hyper_util::rt::{TokioExecutor, TokioIo};
//! use hyper_util::server::conn::auto::Builder;
//! use runway::Router;
//! use tokio::net::TcpListener;
//!
//! # async fn run() -> std::io::Result<()> {
//! let service = Router::new().into_service();
//! let listener = TcpListener::bind("127.0.0.1:3000").await?;
//! loop {
//!     let (stream, _) = listener.accept().await?;
//!     let service = service.clone();
//!     tokio::spawn(async move {
//!         let _ = Builder::new(TokioExecutor::new())
//!             .serve_connection(TokioIo::new(stream), service)
//!             .await;
//!     });
//! }
//! # }
//! ```

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body::Body;
use http_body_util::Full;
use hyper::service::Service;

use crate::error::BoxError;
use crate::handler::BoxFuture;
use crate::router::Router;

/// A [`Router`] shared behind an `Arc`. Cloning is cheap.
#[derive(Clone)]
pub struct RouterService {
    router: Arc<Router>,
}

impl RouterService {
    pub fn new(router: Router) -> Self {
        Self { router: Arc::new(router) }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }
}

impl<B> Service<http::Request<B>> for RouterService
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Infallible>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let router = Arc::clone(&self.router);
        Box::pin(async move { Ok(router.dispatch(req).await.into_inner()) })
    }
}

impl Router {
    /// Wraps the router for use as a hyper service.
    pub fn into_service(self) -> RouterService {
        RouterService::new(self)
    }
}
