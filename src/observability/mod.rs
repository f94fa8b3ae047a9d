//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! prerender pipeline, http layer, config reloads
//!     → logging.rs (tracing subscriber: pretty or JSON)
//!     → metrics.rs (decision, cache and render counters)
//!
//! Consumers:
//!     → stdout log aggregation
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! Request IDs are attached by the http layer and show up on every span
//! emitted by `TraceLayer`.

pub mod logging;
pub mod metrics;
