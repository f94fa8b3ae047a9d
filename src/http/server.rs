//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router and wire middleware (request ID, tracing, timeout)
//! - Run the prerender middleware in front of every request
//! - Forward passthrough traffic to the origin
//! - Apply `[prerender]` config reloads to the live policy

use axum::{
    body::Body,
    extract::State,
    http::{uri::PathAndQuery, Request, StatusCode, Uri, Version},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::ServerError;
use crate::http::middleware::prerender_middleware;
use crate::http::request::{request_id, UuidRequestId, X_REQUEST_ID};
use crate::prerender::{Policy, Prerender, RenderFetcher};

/// Application state injected into the origin handler.
#[derive(Clone)]
pub struct AppState {
    /// `host:port` of the application behind the proxy.
    pub origin: Arc<str>,
    pub client: Client<HttpConnector, Body>,
}

/// HTTP server: prerender middleware in front of a plain origin proxy.
pub struct HttpServer {
    router: Router,
    prerender: Prerender,
}

impl HttpServer {
    /// Build the server and its prerender core from `config`.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let policy = Arc::new(Policy::from_config(&config.prerender)?);
        let fetcher =
            RenderFetcher::with_connect_timeout(Duration::from_secs(config.timeouts.connect_secs))?;
        Ok(Self::with_prerender(config, Prerender::new(policy, fetcher)))
    }

    /// Build the server around an existing prerender core, e.g. one with hooks.
    pub fn with_prerender(config: ProxyConfig, prerender: Prerender) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState {
            origin: Arc::from(config.origin.address.as_str()),
            client,
        };

        let router = Self::build_router(&config, state, prerender.clone());
        Self { router, prerender }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState, prerender: Prerender) -> Router {
        Router::new()
            .fallback(origin_handler)
            .with_state(state)
            .layer(middleware::from_fn_with_state(prerender, prerender_middleware))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    pub fn prerender(&self) -> &Prerender {
        &self.prerender
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Every config revision received on `config_updates` is applied to the
    /// prerender policy; a revision the policy rejects leaves it unchanged.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let policy = self.prerender.policy().clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match policy.reconfigure(&config.prerender) {
                    Ok(()) => tracing::info!("Prerender policy reloaded"),
                    Err(e) => {
                        tracing::error!(error = %e, "Rejected prerender config, keeping current policy")
                    }
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Forward a request the prerender middleware passed through to the origin.
async fn origin_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request_id(&request).unwrap_or("unknown").to_string();
    let (mut parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    let uri = match Uri::builder()
        .scheme("http")
        .authority(state.origin.as_ref())
        .path_and_query(path_and_query)
        .build()
    {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, origin = %state.origin, error = %e, "Invalid origin address");
            return (StatusCode::BAD_GATEWAY, "Invalid origin address").into_response();
        }
    };

    parts.uri = uri;
    parts.version = Version::HTTP_11;

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, origin = %state.origin, error = %e, "Origin request failed");
            (StatusCode::BAD_GATEWAY, "Origin request failed").into_response()
        }
    }
}
