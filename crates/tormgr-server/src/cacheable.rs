//! HTTP rendering of cached query results.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tormgr_cache::{Cacheable, Conditional, respond};

pub const CACHE_CONTROL_VALUE: &str = "private, no-cache";

/// Answer a read with `304 Not Modified` when the client's `If-None-Match`
/// matches the stored version, with the JSON payload otherwise.
pub fn conditional_response(request_headers: &HeaderMap, cached: Cacheable) -> Response {
    let client = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());

    let (status, body, version) = match respond(cached.etag.as_str(), client, cached.bytes) {
        Conditional::NotModified => (
            StatusCode::NOT_MODIFIED,
            Body::empty(),
            cached.etag.as_str().to_string(),
        ),
        Conditional::Fresh { payload, version } => (StatusCode::OK, Body::from(payload), version),
    };

    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    if status == StatusCode::OK {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL_VALUE),
    );
    // Weak: the compression layer re-encodes the body per Accept-Encoding.
    if !version.is_empty()
        && let Ok(value) = HeaderValue::from_str(&format!("W/\"{version}\""))
    {
        headers.insert(header::ETAG, value);
    }
    response
}
