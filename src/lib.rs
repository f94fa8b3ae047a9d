//! Prerender middleware and proxy.
//!
//! Requests from search engine crawlers and link-preview bots are answered
//! with a snapshot fetched from a rendering service; everything else passes
//! through to the origin application.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod prerender;

pub use config::schema::ProxyConfig;
pub use error::{HookError, PolicyError, PrerenderError, RenderError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use prerender::{Outcome, Policy, Prerender, PrerenderRequest, RenderFetcher, RenderedResponse};
