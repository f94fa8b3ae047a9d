//! Inbound request handling.
//!
//! - Request IDs (UUID v4) are assigned before anything else runs.
//! - [`prerender_view`] builds the read-only view the prerender core decides on.

use axum::http::header::{HeaderValue, HOST};
use axum::http::uri::Scheme;
use axum::http::{HeaderName, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::prerender::PrerenderRequest;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates a fresh UUID v4 for every request lacking an `x-request-id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Extract the request ID set by the request-id layer, if any.
pub fn request_id<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
}

/// Build the prerender view of an inbound request.
///
/// HTTP/2 requests carry the host in the URI authority rather than a `Host`
/// header, so it is copied over when missing.
pub fn prerender_view<B>(request: &Request<B>) -> PrerenderRequest {
    let uri = request.uri();
    let url = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut headers = request.headers().clone();
    if !headers.contains_key(HOST) {
        if let Some(value) = uri
            .authority()
            .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        {
            headers.insert(HOST, value);
        }
    }

    PrerenderRequest {
        method: request.method().clone(),
        url,
        headers,
        encrypted: uri.scheme() == Some(&Scheme::HTTPS),
    }
}
