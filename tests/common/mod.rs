//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use prerender_proxy::config::ProxyConfig;
use prerender_proxy::http::HttpServer;
use prerender_proxy::lifecycle::Shutdown;
use prerender_proxy::prerender::{Policy, Prerender, RenderFetcher};

/// A request as received by a mock server.
#[derive(Debug, Clone)]
pub struct Captured {
    pub uri: String,
    pub headers: HeaderMap,
}

/// What a mock server answers with.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl MockReply {
    pub fn html(body: &str) -> Self {
        Self {
            status: StatusCode::OK,
            headers: vec![(
                axum::http::header::CONTENT_TYPE,
                HeaderValue::from_static("text/html"),
            )],
            body: body.as_bytes().to_vec(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.push((name, HeaderValue::from_static(value)));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone)]
struct MockState {
    reply: MockReply,
    captured: Arc<Mutex<Vec<Captured>>>,
}

/// A running mock server and everything it has received so far.
pub struct MockServer {
    pub addr: SocketAddr,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl MockServer {
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.captured.lock().unwrap().len()
    }
}

async fn reply(State(state): State<MockState>, request: Request<Body>) -> Response {
    state.captured.lock().unwrap().push(Captured {
        uri: request.uri().to_string(),
        headers: request.headers().clone(),
    });

    if !state.reply.delay.is_zero() {
        tokio::time::sleep(state.reply.delay).await;
    }

    let mut response = Response::new(Body::from(state.reply.body.clone()));
    *response.status_mut() = state.reply.status;
    for (name, value) in &state.reply.headers {
        response.headers_mut().append(name.clone(), value.clone());
    }
    response
}

/// Start a mock server on an ephemeral port answering every request with `reply`.
pub async fn start_mock_server(reply_with: MockReply) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));

    let app = Router::new().fallback(reply).with_state(MockState {
        reply: reply_with,
        captured: captured.clone(),
    });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockServer { addr, captured }
}

/// Fetcher whose client ignores proxy environment variables.
pub fn test_fetcher() -> RenderFetcher {
    let client = RenderFetcher::client_builder(Duration::from_secs(2))
        .no_proxy()
        .build()
        .unwrap();
    RenderFetcher::new(client)
}

/// Prerender core pointed at `service_url`.
pub fn prerender_for(service_url: &str) -> Prerender {
    let policy = Policy::default();
    policy.set_service_url(service_url).unwrap();
    Prerender::new(Arc::new(policy), test_fetcher())
}

/// HTTP client for talking to the proxy under test.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// A proxy running in the background.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub config_updates: mpsc::UnboundedSender<ProxyConfig>,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the full server with `prerender` in front of `origin`.
pub async fn start_proxy(origin: SocketAddr, prerender: Prerender) -> RunningProxy {
    let mut config = ProxyConfig::default();
    config.origin.address = origin.to_string();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_updates, rx) = mpsc::unbounded_channel();
    let server = HttpServer::with_prerender(config, prerender);
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, rx, server_shutdown).await;
    });

    RunningProxy {
        addr,
        shutdown,
        config_updates,
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..40 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
