//! Per-request pipeline.
//!
//! # Flow
//! ```text
//! snapshot policy
//!     → classify ──── not eligible ──────────────→ passthrough(None)
//!     → before_render ── cached page ────────────→ respond(cached)
//!     → fetch
//!     → after_render ─── cancel ─────────────────→ passthrough(None)
//!                   └─── error ──────────────────→ Err(HookFailure)
//!     → fetch ok ────────────────────────────────→ respond(rendered)
//!     → fetch failed ────────────────────────────→ passthrough(Some(err))
//! ```
//! Exactly one of the two continuations runs, and at most once.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{PrerenderError, RenderError};
use crate::observability::metrics;
use crate::prerender::classifier::should_prerender;
use crate::prerender::fetcher::{RenderFetcher, RenderedResponse};
use crate::prerender::hooks::{AfterRender, AfterRenderAction, BeforeRender};
use crate::prerender::policy::Policy;
use crate::prerender::request::PrerenderRequest;

/// Result of the pipeline for one request.
#[derive(Debug)]
pub enum Outcome {
    /// Write this response to the client.
    Render(RenderedResponse),
    /// Continue with normal handling. Carries the fetch error, if any.
    Passthrough(Option<RenderError>),
}

/// Prerender middleware core, cheap to clone and share across tasks.
#[derive(Clone)]
pub struct Prerender {
    policy: Arc<Policy>,
    fetcher: RenderFetcher,
    before_render: Option<Arc<dyn BeforeRender>>,
    after_render: Option<Arc<dyn AfterRender>>,
}

impl std::fmt::Debug for Prerender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prerender")
            .field("policy", &self.policy)
            .field("before_render", &self.before_render.is_some())
            .field("after_render", &self.after_render.is_some())
            .finish()
    }
}

impl Prerender {
    pub fn new(policy: Arc<Policy>, fetcher: RenderFetcher) -> Self {
        Self {
            policy,
            fetcher,
            before_render: None,
            after_render: None,
        }
    }

    pub fn with_before_render(mut self, hook: impl BeforeRender + 'static) -> Self {
        self.before_render = Some(Arc::new(hook));
        self
    }

    pub fn with_after_render(mut self, hook: impl AfterRender + 'static) -> Self {
        self.after_render = Some(Arc::new(hook));
        self
    }

    /// The live policy. Mutations apply to requests that start afterwards.
    pub fn policy(&self) -> &Arc<Policy> {
        &self.policy
    }

    /// Classify `request` against the current policy.
    pub fn should_prerender(&self, request: &PrerenderRequest) -> bool {
        should_prerender(request, &self.policy.snapshot())
    }

    /// Run the pipeline and report which way the request should go.
    pub async fn decide(&self, request: &PrerenderRequest) -> Result<Outcome, PrerenderError> {
        let policy = self.policy.snapshot();

        let eligible = should_prerender(request, &policy);
        metrics::record_decision(eligible);
        if !eligible {
            return Ok(Outcome::Passthrough(None));
        }

        if let Some(hook) = &self.before_render {
            match hook.before_render(request).await {
                Ok(Some(cached)) => {
                    if let Some(response) = cached.into_response() {
                        tracing::debug!(url = %request.url, "Serving prerendered page from cache");
                        metrics::record_cache_hit();
                        return Ok(Outcome::Render(response));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(url = %request.url, error = %e, "Cache hook failed, rendering instead");
                }
            }
        }

        let start = Instant::now();
        let result = self.fetcher.fetch(request, &policy).await;
        match &result {
            Ok(response) => metrics::record_render(response.status.as_u16(), start),
            Err(e) => metrics::record_render_failure(e.kind(), start),
        }

        if let Some(hook) = &self.after_render {
            let (error, response) = match &result {
                Ok(response) => (None, Some(response)),
                Err(e) => (Some(e), None),
            };
            if hook.after_render(error, request, response)? == AfterRenderAction::CancelRender {
                tracing::debug!(url = %request.url, "Render cancelled by hook");
                return Ok(Outcome::Passthrough(None));
            }
        }

        Ok(match result {
            Ok(response) => Outcome::Render(response),
            Err(e) => Outcome::Passthrough(Some(e)),
        })
    }

    /// Run the pipeline and invoke exactly one continuation.
    ///
    /// `respond` receives the page to write; `passthrough` continues with
    /// normal handling and receives the fetch error, if there was one. On
    /// `Err` neither continuation has run.
    pub async fn handle<T, R, P, Fut>(
        &self,
        request: &PrerenderRequest,
        respond: R,
        passthrough: P,
    ) -> Result<T, PrerenderError>
    where
        R: FnOnce(RenderedResponse) -> T,
        P: FnOnce(Option<RenderError>) -> Fut,
        Fut: Future<Output = T>,
    {
        match self.decide(request).await? {
            Outcome::Render(response) => Ok(respond(response)),
            Outcome::Passthrough(error) => Ok(passthrough(error).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HookError;
    use crate::prerender::hooks::CachedRender;
    use axum::http::header::{HeaderValue, HOST, USER_AGENT};
    use axum::http::{Method, StatusCode};
    use futures_util::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedCache(Option<CachedRender>);

    impl BeforeRender for FixedCache {
        fn before_render<'a>(
            &'a self,
            _request: &'a PrerenderRequest,
        ) -> BoxFuture<'a, Result<Option<CachedRender>, HookError>> {
            let hit = self.0.clone();
            Box::pin(async move { Ok(hit) })
        }
    }

    struct FailingCache;

    impl BeforeRender for FailingCache {
        fn before_render<'a>(
            &'a self,
            _request: &'a PrerenderRequest,
        ) -> BoxFuture<'a, Result<Option<CachedRender>, HookError>> {
            Box::pin(async { Err(HookError::new("cache offline")) })
        }
    }

    /// Service URL nothing listens on.
    fn unreachable_prerender() -> Prerender {
        let policy = Policy::default();
        policy.set_service_url("http://127.0.0.1:1/").unwrap();
        let client = RenderFetcher::client_builder(Duration::from_secs(2))
            .no_proxy()
            .build()
            .unwrap();
        let fetcher = RenderFetcher::new(client);
        Prerender::new(Arc::new(policy), fetcher)
    }

    fn bot_request() -> PrerenderRequest {
        PrerenderRequest::new(Method::GET, "/about")
            .with_header(USER_AGENT, HeaderValue::from_static("Googlebot/2.1"))
            .with_header(HOST, HeaderValue::from_static("site.example"))
    }

    fn human_request() -> PrerenderRequest {
        PrerenderRequest::new(Method::GET, "/about")
            .with_header(USER_AGENT, HeaderValue::from_static("Mozilla/5.0 Firefox/120.0"))
            .with_header(HOST, HeaderValue::from_static("site.example"))
    }

    #[tokio::test]
    async fn test_not_eligible_passes_through_without_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let prerender = unreachable_prerender().with_after_render(
            move |_: Option<&RenderError>, _: &PrerenderRequest, _: Option<&RenderedResponse>|
                  -> Result<AfterRenderAction, HookError> {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(AfterRenderAction::Continue)
            },
        );

        let outcome = prerender.decide(&human_request()).await.unwrap();
        assert!(matches!(outcome, Outcome::Passthrough(None)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let prerender = unreachable_prerender()
            .with_before_render(FixedCache(Some(CachedRender::Html("<p>cached</p>".into()))))
            .with_after_render(
                move |_: Option<&RenderError>, _: &PrerenderRequest, _: Option<&RenderedResponse>|
                      -> Result<AfterRenderAction, HookError> {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(AfterRenderAction::Continue)
                },
            );

        match prerender.decide(&bot_request()).await.unwrap() {
            Outcome::Render(res) => {
                assert_eq!(res.status, StatusCode::OK);
                assert_eq!(res.text(), "<p>cached</p>");
            }
            other => panic!("expected cached render, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_and_cache_error_fall_back_to_fetch() {
        for prerender in [
            unreachable_prerender().with_before_render(FixedCache(None)),
            unreachable_prerender().with_before_render(FixedCache(Some(CachedRender::Html(String::new())))),
            unreachable_prerender().with_before_render(FailingCache),
        ] {
            let outcome = prerender.decide(&bot_request()).await.unwrap();
            assert!(matches!(
                outcome,
                Outcome::Passthrough(Some(RenderError::UpstreamUnreachable(_)))
            ));
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_reaches_after_render() {
        let saw_error = Arc::new(AtomicUsize::new(0));
        let seen = saw_error.clone();
        let prerender = unreachable_prerender().with_after_render(
            move |error: Option<&RenderError>, _: &PrerenderRequest, response: Option<&RenderedResponse>|
                  -> Result<AfterRenderAction, HookError> {
                if error.is_some() && response.is_none() {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                Ok(AfterRenderAction::Continue)
            },
        );

        let outcome = prerender.decide(&bot_request()).await.unwrap();
        assert!(matches!(outcome, Outcome::Passthrough(Some(_))));
        assert_eq!(saw_error.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_passes_through_without_error() {
        let prerender = unreachable_prerender().with_after_render(
            |_: Option<&RenderError>, _: &PrerenderRequest, _: Option<&RenderedResponse>|
             -> Result<AfterRenderAction, HookError> { Ok(AfterRenderAction::CancelRender) },
        );

        let outcome = prerender.decide(&bot_request()).await.unwrap();
        assert!(matches!(outcome, Outcome::Passthrough(None)));
    }

    #[tokio::test]
    async fn test_hook_failure_runs_no_continuation() {
        let prerender = unreachable_prerender().with_after_render(
            |_: Option<&RenderError>, _: &PrerenderRequest, _: Option<&RenderedResponse>|
             -> Result<AfterRenderAction, HookError> { Err(HookError::new("boom")) },
        );

        let continuations = AtomicUsize::new(0);
        let counter = &continuations;
        let result = prerender
            .handle(
                &bot_request(),
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                move |_| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            )
            .await;

        assert!(matches!(result, Err(PrerenderError::HookFailure(_))));
        assert_eq!(continuations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handle_routes_to_one_continuation() {
        let prerender = unreachable_prerender()
            .with_before_render(FixedCache(Some(CachedRender::Page {
                status: Some(StatusCode::NOT_FOUND),
                body: Some("missing".into()),
            })));

        let status = prerender
            .handle(&bot_request(), |res| res.status, |_| async { StatusCode::IM_A_TEAPOT })
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let status = prerender
            .handle(&human_request(), |res| res.status, |error| async move {
                assert!(error.is_none());
                StatusCode::IM_A_TEAPOT
            })
            .await
            .unwrap();
        assert_eq!(status, StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn test_policy_mutation_affects_later_decisions() {
        let prerender = unreachable_prerender();
        assert!(!prerender.should_prerender(&human_request()));
        prerender.policy().add_user_agents(["firefox"]).unwrap();
        assert!(prerender.should_prerender(&human_request()));
    }
}
