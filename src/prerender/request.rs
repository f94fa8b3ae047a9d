//! Read-only request view consumed by the classifier and the fetcher.

use std::borrow::Cow;
use axum::http::header::{AsHeaderName, HeaderName, HeaderValue, HeaderMap};
use axum::http::Method;

/// Marks requests issued by the rendering service itself.
pub const X_PRERENDER: HeaderName = HeaderName::from_static("x-prerender");

/// Sent by Buffer's link preview bot.
pub const X_BUFFERBOT: HeaderName = HeaderName::from_static("x-bufferbot");

pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Cloudflare visitor scheme, e.g. `{"scheme":"https"}`.
pub const CF_VISITOR: HeaderName = HeaderName::from_static("cf-visitor");

/// Legacy AJAX crawling query parameter.
pub const ESCAPED_FRAGMENT: &str = "_escaped_fragment_";

/// An inbound request as seen by the prerender core.
#[derive(Debug, Clone)]
pub struct PrerenderRequest {
    pub method: Method,
    /// Path and query exactly as received.
    pub url: String,
    pub headers: HeaderMap,
    /// Whether the client connection was TLS.
    pub encrypted: bool,
}

impl PrerenderRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            encrypted: false,
        }
    }

    /// Builder-style header append.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// First value of a header, lossily decoded.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<Cow<'_, str>> {
        self.headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
    }

    /// The URL without its query string.
    pub fn path(&self) -> &str {
        match self.url.split_once('?') {
            Some((path, _)) => path,
            None => &self.url,
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, query)| query)
    }

    /// True when the query carries `_escaped_fragment_`, with or without a value.
    pub fn has_escaped_fragment(&self) -> bool {
        self.query().is_some_and(|query| {
            url::form_urlencoded::parse(query.as_bytes()).any(|(key, _)| key == ESCAPED_FRAGMENT)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_and_query_split() {
        let req = PrerenderRequest::new(Method::GET, "/p/a.html?q=1&x=2");
        assert_eq!(req.path(), "/p/a.html");
        assert_eq!(req.query(), Some("q=1&x=2"));

        let req = PrerenderRequest::new(Method::GET, "/plain");
        assert_eq!(req.path(), "/plain");
        assert_eq!(req.query(), None);
    }

    #[test]
    fn test_escaped_fragment_detection() {
        assert!(PrerenderRequest::new(Method::GET, "/?_escaped_fragment_=").has_escaped_fragment());
        assert!(PrerenderRequest::new(Method::GET, "/?a=1&_escaped_fragment_").has_escaped_fragment());
        assert!(PrerenderRequest::new(Method::GET, "/?%5Fescaped_fragment_=x").has_escaped_fragment());
        assert!(!PrerenderRequest::new(Method::GET, "/?escaped_fragment=1").has_escaped_fragment());
        assert!(!PrerenderRequest::new(Method::GET, "/_escaped_fragment_").has_escaped_fragment());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = PrerenderRequest::new(Method::GET, "/")
            .with_header(HeaderName::from_static("user-agent"), HeaderValue::from_static("Bot"));
        assert_eq!(req.header("User-Agent").as_deref(), Some("Bot"));
        assert_eq!(req.header("USER-AGENT").as_deref(), Some("Bot"));
        assert!(req.header("referer").is_none());
    }
}
