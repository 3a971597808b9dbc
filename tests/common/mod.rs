#![allow(dead_code)]

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context as TaskContext, Poll};

use bytes::Bytes;
use http_body::{Body, Frame};
use http_body_util::Full;
use runway::{Response, Router};
use serde_json::Value;

pub fn get(uri: &str) -> http::Request<Full<Bytes>> {
    http::Request::get(uri).body(Full::default()).unwrap()
}

pub fn post(uri: &str, content_type: &str, body: impl Into<Bytes>) -> http::Request<Full<Bytes>> {
    http::Request::post(uri)
        .header("content-type", content_type)
        .body(Full::new(body.into()))
        .unwrap()
}

pub async fn send(app: &Router, req: http::Request<Full<Bytes>>) -> Response {
    app.dispatch(req).await
}

pub fn json_of(res: &Response) -> Value {
    serde_json::from_slice(res.body()).expect("response body is JSON")
}

/// A single-frame body that counts how often it is polled for data.
pub struct CountingBody {
    data: Option<Bytes>,
    polls: Arc<AtomicUsize>,
}

impl CountingBody {
    pub fn new(data: &'static str) -> (Self, Arc<AtomicUsize>) {
        let polls = Arc::new(AtomicUsize::new(0));
        (Self { data: Some(Bytes::from_static(data.as_bytes())), polls: polls.clone() }, polls)
    }
}

impl Body for CountingBody {
    type Data = Bytes;
    type Error = std::convert::Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(self.data.take().map(|d| Ok(Frame::data(d))))
    }
}
