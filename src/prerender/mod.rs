//! Prerender subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request (PrerenderRequest view)
//!     → orchestrator.rs (one policy snapshot per request)
//!         → classifier.rs (bot? asset? white/blacklisted?)
//!         → hooks.rs (BeforeRender cache lookup)
//!         → fetcher.rs (rendering service call, gzip handling)
//!         → hooks.rs (AfterRender inspection / cancel)
//!     → respond(RenderedResponse) | passthrough(Option<RenderError>)
//!
//! policy.rs: live, atomically swapped configuration
//!     agents.rs (crawler signatures) + extensions.rs (static assets)
//! ```

pub mod agents;
pub mod classifier;
pub mod extensions;
pub mod fetcher;
pub mod hooks;
pub mod orchestrator;
pub mod policy;
pub mod request;

pub use classifier::should_prerender;
pub use fetcher::{RenderFetcher, RenderedResponse};
pub use hooks::{AfterRender, AfterRenderAction, BeforeRender, CachedRender};
pub use orchestrator::{Outcome, Prerender};
pub use policy::{Policy, PolicySnapshot};
pub use request::PrerenderRequest;
