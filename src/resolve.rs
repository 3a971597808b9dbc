//! Turning failures into responses.
//!
//! Structured errors keep the status, headers and body their creator chose.
//! Everything else becomes a fixed `500 Internal Server Error`; the original
//! failure is logged and never sent.
//!
//! The representation is negotiated from `Accept`: JSON unless the client
//! lists `text/plain` ahead of any JSON type.

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::error;

use crate::error::{Error, ErrorBody, HttpError};
use crate::request::Request;
use crate::response::{ContentType, Response};

/// Whether a client sending `accept` should get JSON.
///
/// Media ranges are scanned in the order given: the first JSON type
/// (`application/json` or any `+json`) wins for JSON, the first `text/plain`
/// wins for text. With neither present, any `*/*` means JSON. A missing
/// header means JSON.
pub fn prefers_json(accept: Option<&str>) -> bool {
    let Some(accept) = accept else { return true };
    if accept == "*/*" {
        return true;
    }
    for media in accept.split(',') {
        let media = media.trim().to_ascii_lowercase();
        if media.is_empty() {
            continue;
        }
        if media.contains("application/json") || media.contains("+json") {
            return true;
        }
        if media.contains("text/plain") {
            return false;
        }
    }
    accept.contains("*/*")
}

/// Resolves any pipeline failure against the request that caused it.
pub fn resolve_error(err: Error, req: &Request) -> Response {
    let http = match err.into_http() {
        Ok(http) => {
            if http.status().is_server_error() {
                error!(status = http.status().as_u16(), error = %http, "request failed");
            }
            http
        }
        Err(other) => {
            error!(method = %req.method(), path = req.path(), error = ?other, "unhandled failure");
            HttpError::internal().with_source(other.into_inner())
        }
    };
    build_error_response(http, req)
}

/// Renders a structured error for `req`.
pub fn build_error_response(err: HttpError, req: &Request) -> Response {
    render(err, req.headers().get(ACCEPT).and_then(|v| v.to_str().ok()))
}

fn render(err: HttpError, accept: Option<&str>) -> Response {
    let (status, message, extra, body) = err.into_parts();

    if let Some(ErrorBody::Response(base)) = body {
        let mut headers = base.headers;
        for (name, value) in extra {
            headers.insert(name, value);
        }
        return Response::from_parts(status, headers, base.body);
    }

    let wants_json = prefers_json(accept);
    let (payload, content_type) = match body {
        Some(ErrorBody::Text(text)) => (Bytes::from(text), ContentType::Text),
        Some(ErrorBody::Json(value)) if wants_json => match serde_json::to_vec(&value) {
            Ok(json) => (Bytes::from(json), ContentType::Json),
            Err(_) => (Bytes::from(coerce(&value)), ContentType::Text),
        },
        Some(ErrorBody::Json(value)) => {
            let text = match value {
                Value::Object(_) | Value::Array(_) => message,
                other => coerce(&other),
            };
            (Bytes::from(text), ContentType::Text)
        }
        None if wants_json => {
            let json = serde_json::json!({ "error": message }).to_string();
            (Bytes::from(json), ContentType::Json)
        }
        None | Some(ErrorBody::Response(_)) => (Bytes::from(message), ContentType::Text),
    };

    let mut headers = HeaderMap::new();
    for (name, value) in extra {
        headers.insert(name, value);
    }
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
    }
    Response::from_parts(status, headers, payload)
}

/// String form of a scalar payload: strings bare, everything else as JSON text.
fn coerce(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
