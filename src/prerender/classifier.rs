//! Request classification.
//!
//! # Decision order
//! ```text
//! no User-Agent            → no
//! not GET/HEAD             → no
//! X-Prerender present      → no
//! wants = _escaped_fragment_ | crawler UA | X-Bufferbot
//! static asset extension   → no
//! whitelist set, no match  → no
//! blacklist hit (url|ref)  → no
//! otherwise                → wants
//! ```

use axum::http::header::{REFERER, USER_AGENT};
use axum::http::Method;

use crate::prerender::policy::PolicySnapshot;
use crate::prerender::request::{PrerenderRequest, X_BUFFERBOT, X_PRERENDER};

/// Decide whether `request` should be answered with a prerendered page.
pub fn should_prerender(request: &PrerenderRequest, policy: &PolicySnapshot) -> bool {
    let user_agent = match request.header(USER_AGENT) {
        Some(ua) if !ua.is_empty() => ua,
        _ => return false,
    };

    if request.method != Method::GET && request.method != Method::HEAD {
        return false;
    }

    // the rendering service fetching our own page
    if request.headers.contains_key(X_PRERENDER) {
        return false;
    }

    let wants_prerender = request.has_escaped_fragment()
        || policy.crawlers().is_match(&user_agent)
        || request.headers.contains_key(X_BUFFERBOT);

    if policy.ignored_extensions().is_match(request.path()) {
        return false;
    }

    let whitelist = policy.whitelist();
    if !whitelist.is_empty() && !whitelist.iter().any(|re| re.is_match(&request.url)) {
        return false;
    }

    let referer = request.header(REFERER);
    let blacklisted = policy.blacklist().iter().any(|re| {
        re.is_match(&request.url) || referer.as_deref().is_some_and(|r| re.is_match(r))
    });
    if blacklisted {
        return false;
    }

    wants_prerender
}
