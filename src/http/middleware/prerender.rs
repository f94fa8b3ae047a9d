//! Prerender middleware.
//! Answers eligible crawler requests with a rendered snapshot; everything
//! else continues down the stack untouched.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::request::{prerender_view, request_id};
use crate::http::response::into_response;
use crate::prerender::Prerender;

pub async fn prerender_middleware(
    State(prerender): State<Prerender>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let view = prerender_view(&req);
    let id = request_id(&req).unwrap_or("unknown").to_string();
    let (request_id, url) = (id.as_str(), view.url.as_str());

    let result = prerender
        .handle(
            &view,
            move |rendered| {
                tracing::debug!(
                    request_id = %request_id,
                    url = %url,
                    status = %rendered.status,
                    "Serving prerendered page"
                );
                into_response(rendered)
            },
            move |error| async move {
                if let Some(e) = error {
                    tracing::warn!(
                        request_id = %request_id,
                        url = %url,
                        kind = e.kind(),
                        error = %e,
                        "Prerender failed, passing through"
                    );
                }
                next.run(req).await
            },
        )
        .await;

    match result {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, url = %url, error = %e, "Prerender hook failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Prerender hook failed").into_response()
        }
    }
}
