//! Snapshot fetch against the rendering service.
//!
//! # Protocol
//! ```text
//! GET <service_url>[/]<scheme>://<host><path?query>
//!     headers: upstream extras → forwarded inbound (minus Host) →
//!              User-Agent, X-Prerender-Int-Type, Accept-Encoding: gzip →
//!              X-Prerender-Token (when configured)
//!
//! response: status + headers relayed as-is,
//!           gzip bodies inflated and Content-Encoding/Content-Length dropped
//! ```
//!
//! Exactly one request per call. Redirects are relayed, not followed.

use std::io::Read;
use std::time::Duration;
use axum::body::Bytes;
use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, HOST,
    USER_AGENT,
};
use axum::http::StatusCode;
use flate2::read::MultiGzDecoder;
use serde::Deserialize;
use url::Url;

use crate::error::RenderError;
use crate::prerender::policy::PolicySnapshot;
use crate::prerender::request::{PrerenderRequest, CF_VISITOR, X_FORWARDED_HOST, X_FORWARDED_PROTO};

/// Upper bound on a decompressed snapshot.
pub const MAX_INFLATED_BODY: u64 = 32 * 1024 * 1024;

pub const X_PRERENDER_TOKEN: HeaderName = HeaderName::from_static("x-prerender-token");
pub const X_PRERENDER_INT_TYPE: HeaderName = HeaderName::from_static("x-prerender-int-type");

/// Value of `X-Prerender-Int-Type` identifying this integration.
pub const INTEGRATION_TYPE: &str = "Rust";

/// Connection-scoped headers; never copied between hops.
pub static HOP_BY_HOP: [HeaderName; 7] = [
    HeaderName::from_static("connection"),
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    HeaderName::from_static("te"),
    HeaderName::from_static("trailer"),
    HeaderName::from_static("transfer-encoding"),
    HeaderName::from_static("upgrade"),
];

/// A page as returned by the rendering service.
#[derive(Debug, Clone)]
pub struct RenderedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RenderedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Issues snapshot requests to the rendering service.
#[derive(Debug, Clone)]
pub struct RenderFetcher {
    client: reqwest::Client,
}

impl RenderFetcher {
    /// Use a preconfigured client. It should not follow redirects; see
    /// [`RenderFetcher::client_builder`].
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Client builder with the settings the fetcher relies on.
    pub fn client_builder(connect_timeout: Duration) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::new(Self::client_builder(connect_timeout).build()?))
    }

    /// Fetch the rendered snapshot of `request`.
    pub async fn fetch(
        &self,
        request: &PrerenderRequest,
        policy: &PolicySnapshot,
    ) -> Result<RenderedResponse, RenderError> {
        let target = build_api_url(request, policy)?;
        tracing::debug!(target = %target, "Fetching prerendered page");

        let mut call = self
            .client
            .get(target)
            .headers(upstream_headers(request, policy));
        if let Some(timeout) = policy.upstream().timeout {
            call = call.timeout(timeout);
        }

        let response = call.send().await.map_err(RenderError::UpstreamUnreachable)?;
        let status = response.status();
        let mut headers = response.headers().clone();
        let raw = response
            .bytes()
            .await
            .map_err(RenderError::UpstreamUnreachable)?;

        let body = if is_gzip(&headers) {
            let inflated = tokio::task::spawn_blocking(move || gunzip(&raw, MAX_INFLATED_BODY))
                .await
                .map_err(std::io::Error::other)
                .and_then(|inflated| inflated)
                .map_err(RenderError::UpstreamDecodeFailure)?;
            headers.remove(CONTENT_ENCODING);
            headers.remove(CONTENT_LENGTH);
            Bytes::from(inflated)
        } else {
            raw
        };

        Ok(RenderedResponse {
            status,
            headers,
            body,
        })
    }
}

/// Build `<service_url>[/]<protocol>://<host><url>`.
pub fn build_api_url(request: &PrerenderRequest, policy: &PolicySnapshot) -> Result<Url, RenderError> {
    let base = policy.service_url();
    let separator = if base.ends_with('/') { "" } else { "/" };
    let protocol = resolve_protocol(request, policy);
    let host = resolve_host(request, policy).ok_or(RenderError::MissingHost)?;

    let raw = format!("{}{}{}://{}{}", base, separator, protocol, host, request.url);
    Url::parse(&raw).map_err(|source| RenderError::InvalidUrl { url: raw, source })
}

#[derive(Deserialize)]
struct CfVisitor {
    scheme: String,
}

/// Protocol of the original URL, lowest to highest priority: transport,
/// `CF-Visitor`, `X-Forwarded-Proto`, policy override.
fn resolve_protocol(request: &PrerenderRequest, policy: &PolicySnapshot) -> String {
    if let Some(protocol) = policy.protocol() {
        return protocol.to_string();
    }

    if let Some(forwarded) = request.header(X_FORWARDED_PROTO) {
        let first = forwarded.split(',').next().unwrap_or_default().trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    if let Some(visitor) = request.header(CF_VISITOR) {
        if let Ok(CfVisitor { scheme }) = serde_json::from_str::<CfVisitor>(&visitor) {
            if scheme == "http" || scheme == "https" {
                return scheme;
            }
        }
    }

    let transport = if request.encrypted { "https" } else { "http" };
    transport.to_string()
}

fn resolve_host(request: &PrerenderRequest, policy: &PolicySnapshot) -> Option<String> {
    policy
        .host()
        .map(str::to_string)
        .or_else(|| request.header(X_FORWARDED_HOST).map(|h| h.into_owned()))
        .or_else(|| request.header(HOST).map(|h| h.into_owned()))
        .filter(|h| !h.is_empty())
}

/// Headers sent to the rendering service.
pub fn upstream_headers(request: &PrerenderRequest, policy: &PolicySnapshot) -> HeaderMap {
    let mut headers = policy.upstream().headers.clone();

    if policy.forward_headers() {
        for name in request.headers.keys() {
            // the original Host can break services that route or verify on it
            if name == HOST || name == CONTENT_LENGTH || HOP_BY_HOP.contains(name) {
                continue;
            }
            headers.remove(name);
            for value in request.headers.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
    }

    match request.headers.get(USER_AGENT) {
        Some(user_agent) => {
            headers.insert(USER_AGENT, user_agent.clone());
        }
        None => {
            headers.remove(USER_AGENT);
        }
    }
    headers.insert(X_PRERENDER_INT_TYPE, HeaderValue::from_static(INTEGRATION_TYPE));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

    if let Some(token) = policy.token() {
        headers.insert(X_PRERENDER_TOKEN, token.clone());
    }

    headers
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"))
}

/// Inflate every gzip member of `compressed`, failing once the output
/// exceeds `limit` bytes.
fn gunzip(compressed: &[u8], limit: u64) -> std::io::Result<Vec<u8>> {
    let mut inflated = Vec::with_capacity(compressed.len().saturating_mul(4).min(limit as usize));
    MultiGzDecoder::new(compressed)
        .take(limit.saturating_add(1))
        .read_to_end(&mut inflated)?;
    if inflated.len() as u64 > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("inflated body exceeds {} bytes", limit),
        ));
    }
    Ok(inflated)
}
