//! Conversion of rendered pages into client responses.

use axum::body::Body;
use axum::response::Response;

use crate::prerender::fetcher::HOP_BY_HOP;
use crate::prerender::RenderedResponse;

/// Write a rendered page as-is: status, headers and body.
///
/// Hop-by-hop headers belong to the rendering service connection and are
/// dropped.
pub fn into_response(rendered: RenderedResponse) -> Response {
    let RenderedResponse {
        status,
        mut headers,
        body,
    } = rendered;

    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
