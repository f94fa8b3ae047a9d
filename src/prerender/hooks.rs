//! Caller-supplied extension points around a render.
//!
//! Both hooks are optional and invoked at most once per request:
//! - `BeforeRender` may answer from a cache before the rendering service is called.
//! - `AfterRender` sees the fetch result and may cancel the prerendered answer.

use axum::http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use axum::http::StatusCode;
use futures_util::future::BoxFuture;

use crate::error::{HookError, RenderError};
use crate::prerender::fetcher::RenderedResponse;
use crate::prerender::request::PrerenderRequest;

/// A previously rendered page returned by a `BeforeRender` hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedRender {
    /// HTML served with status 200. An empty string counts as a miss.
    Html(String),
    /// Explicit status (default 200) and body (default empty).
    Page {
        status: Option<StatusCode>,
        body: Option<String>,
    },
}

impl CachedRender {
    /// Convert into the response written to the client, `None` on a miss.
    pub fn into_response(self) -> Option<RenderedResponse> {
        let (status, body) = match self {
            CachedRender::Html(html) if html.is_empty() => return None,
            CachedRender::Html(html) => (StatusCode::OK, html),
            CachedRender::Page { status, body } => {
                (status.unwrap_or(StatusCode::OK), body.unwrap_or_default())
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        Some(RenderedResponse::new(status, headers, body))
    }
}

/// What to do after a render attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfterRenderAction {
    /// Serve the rendered page, or pass through if the fetch failed.
    #[default]
    Continue,
    /// Discard the result and pass through to normal handling.
    CancelRender,
}

/// Cache lookup before rendering.
pub trait BeforeRender: Send + Sync {
    fn before_render<'a>(
        &'a self,
        request: &'a PrerenderRequest,
    ) -> BoxFuture<'a, Result<Option<CachedRender>, HookError>>;
}

/// Inspection of a render result.
pub trait AfterRender: Send + Sync {
    fn after_render(
        &self,
        error: Option<&RenderError>,
        request: &PrerenderRequest,
        response: Option<&RenderedResponse>,
    ) -> Result<AfterRenderAction, HookError>;
}

impl<F> AfterRender for F
where
    F: Fn(Option<&RenderError>, &PrerenderRequest, Option<&RenderedResponse>) -> Result<AfterRenderAction, HookError>
        + Send
        + Sync,
{
    fn after_render(
        &self,
        error: Option<&RenderError>,
        request: &PrerenderRequest,
        response: Option<&RenderedResponse>,
    ) -> Result<AfterRenderAction, HookError> {
        self(error, request, response)
    }
}
