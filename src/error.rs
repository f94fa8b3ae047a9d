//! Error types shared across the prerender pipeline.

use thiserror::Error;

/// Failure of a single fetch against the rendering service.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Connect, DNS, timeout or body read failure.
    #[error("rendering service unreachable: {0}")]
    UpstreamUnreachable(#[source] reqwest::Error),

    /// The gzip body returned by the rendering service is corrupt or truncated.
    #[error("failed to decode gzip body from rendering service: {0}")]
    UpstreamDecodeFailure(#[source] std::io::Error),

    /// The assembled upstream URL does not parse.
    #[error("invalid upstream url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Neither a host override, `X-Forwarded-Host` nor `Host` is available.
    #[error("cannot resolve the original host of the request")]
    MissingHost,
}

impl RenderError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::UpstreamUnreachable(e) if e.is_timeout() => "timeout",
            RenderError::UpstreamUnreachable(_) => "unreachable",
            RenderError::UpstreamDecodeFailure(_) => "decode",
            RenderError::InvalidUrl { .. } => "invalid_url",
            RenderError::MissingHost => "missing_host",
        }
    }
}

/// Error raised by a caller-supplied hook.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error surfaced to the caller of `Prerender::handle`.
#[derive(Debug, Error)]
pub enum PrerenderError {
    /// The post-render hook failed; this is a configuration bug on the caller's side.
    #[error("post-render hook failed: {0}")]
    HookFailure(#[from] HookError),
}

/// Rejected policy mutation. The live policy is left unchanged.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid rendering service url '{url}': {source}")]
    InvalidServiceUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported protocol '{0}', expected http or https")]
    InvalidProtocol(String),

    #[error("invalid upstream header '{0}'")]
    InvalidHeader(String),
}

/// Failure while assembling the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid prerender settings: {0}")]
    Policy(#[from] PolicyError),

    #[error("failed to build rendering service client: {0}")]
    Client(#[from] reqwest::Error),
}
