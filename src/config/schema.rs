//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default rendering service.
pub const DEFAULT_SERVICE_URL: &str = "https://service.prerender.io/";

/// Root configuration for the prerender proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Application that serves regular (non-prerendered) traffic.
    pub origin: OriginConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Classification policy and rendering service settings.
    pub prerender: PrerenderConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Origin application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Origin address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connect timeout towards the rendering service and the origin, in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human readable or JSON lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Classification policy and rendering service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PrerenderConfig {
    /// Base URL of the rendering service.
    pub service_url: String,

    /// Token sent as `X-Prerender-Token`.
    pub token: Option<String>,

    /// Forced protocol of the original URL ("http" or "https").
    pub protocol: Option<String>,

    /// Forced host of the original URL.
    pub host: Option<String>,

    /// Forward the inbound request headers (except `Host`) to the rendering service.
    pub forward_headers: bool,

    /// Crawler signatures added on top of the built-in list.
    pub crawler_user_agents: Vec<String>,

    /// Replaces the built-in list of ignored path extensions when set.
    pub ignored_extensions: Option<Vec<String>>,

    /// Regex fragments; when non-empty, a URL must match one of them.
    pub whitelist: Vec<String>,

    /// Regex fragments; a match on the URL or the referer excludes the request.
    pub blacklist: Vec<String>,

    /// Options merged into every call to the rendering service.
    pub upstream: UpstreamOptions,
}

impl Default for PrerenderConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            token: None,
            protocol: None,
            host: None,
            forward_headers: false,
            crawler_user_agents: Vec::new(),
            ignored_extensions: None,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            upstream: UpstreamOptions::default(),
        }
    }
}

/// Extra HTTP options for calls to the rendering service.
///
/// Unknown keys are rejected at load time.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamOptions {
    /// Headers added to every upstream request.
    pub headers: BTreeMap<String, String>,

    /// Total per-call timeout in seconds.
    pub timeout_secs: Option<u64>,
}
