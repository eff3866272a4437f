//! Response adaptation: the two wire shapes handed back to the client.
//!
//! Buffered replies are the upstream's final JSON verbatim plus one added
//! field carrying the realized conversation trace. Streamed replies are a
//! byte-for-byte relay of the upstream SSE body with hop-by-hop headers
//! rewritten; streaming clients have no place to consume a trace mid-stream,
//! so none is injected.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;

use crate::providers::UpstreamStream;

/// Top-level field added to buffered replies with the conversation trace
/// (steering prompt excluded). Clients may ignore it.
pub const TRACE_FIELD: &str = "__react_messages";

/// Upstream headers dropped on relay: the client authenticates against the
/// gateway, not the upstream, and the relayed body is already decoded.
const STRIPPED_HEADERS: &[&str] = &["www-authenticate", "content-encoding"];

/// Emit the upstream's final JSON with the trace field added.
pub fn buffered_response(mut upstream: Value, trace: Vec<Value>) -> axum::response::Response {
    if let Value::Object(map) = &mut upstream {
        map.insert(TRACE_FIELD.to_string(), Value::Array(trace));
    }
    (StatusCode::OK, Json(upstream)).into_response()
}

/// Relay the final upstream SSE response: status copied, headers rewritten,
/// body forwarded unchanged.
pub fn stream_response(upstream: UpstreamStream) -> axum::response::Response {
    let status =
        StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let headers = relay_headers(&upstream.headers);

    let mut response = Response::builder()
        .status(status)
        .body(Body::from_stream(upstream.body))
        .unwrap_or_else(|_| Response::new(Body::empty()));
    response.headers_mut().extend(headers);
    response
}

/// Header hygiene for the streamed turn: drop `www-authenticate` and any
/// upstream `content-encoding`, pin the event-stream content type, and defeat
/// reverse-proxy buffering in front of the client.
fn relay_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len() + 2);
    for (name, value) in upstream {
        if STRIPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers.insert("content-type", HeaderValue::from_static("text/event-stream"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    headers
}
