//! The per-request context threaded through the pipeline.

use bytes::Bytes;
use http_body::Body;

use crate::body::box_body;
use crate::config::BodyParserConfig;
use crate::error::BoxError;
use crate::request::Request;
use crate::response::{Response, ResponseBuilder};

/// Everything one dispatch owns: the request view and the response builder.
///
/// A context is created fresh for each matched request and never shared.
///
/// ```rust,no_run
/// use runway::{Context, Next, Error, Response};
///
/// async fn show(ctx: &mut Context, _next: Next<'_>) -> Result<Response, Error> {
///     let id = ctx.req.param("id").unwrap_or("unknown").to_owned();
///     ctx.res.json(&serde_json::json!({ "id": id }))
/// }
/// ```
pub struct Context {
    pub req: Request,
    pub res: ResponseBuilder,
    captured: Option<Response>,
}

impl Context {
    /// Wraps `req`, seeding its body parser with `parser`.
    pub fn new<B>(req: http::Request<B>, parser: BodyParserConfig) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        Self {
            req: Request::new(parts, box_body(body), parser),
            res: ResponseBuilder::new(),
            captured: None,
        }
    }

    /// Records a response a handler returned. The latest capture wins.
    pub(crate) fn capture(&mut self, response: Response) {
        self.captured = Some(response);
    }

    /// The response this dispatch ends with: the captured one, else the
    /// builder's last, else an empty `200`. Header annotations are written
    /// over it last.
    pub(crate) fn finalize(mut self) -> Response {
        let response = self.captured.take()
            .or_else(|| self.res.take_last())
            .unwrap_or_default();
        if self.req.annotations().is_empty() {
            response
        } else {
            response.with_headers(self.req.annotations())
        }
    }
}
