//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → middleware/prerender.rs
//!         → request.rs (PrerenderRequest view)
//!         → prerender core decides
//!         → response.rs (rendered page → client)   [respond]
//!     → server.rs origin handler (→ origin app)    [passthrough]
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use middleware::prerender_middleware;
pub use request::{prerender_view, UuidRequestId, X_REQUEST_ID};
pub use server::HttpServer;
