//! Classification policy and rendering service settings.
//!
//! # Concurrency
//! ```text
//! readers:  Policy::snapshot() → Arc<PolicySnapshot> (lock-free load)
//! writers:  lock → clone current → mutate → validate → atomic store
//! ```
//! A request keeps the snapshot it loaded for its whole lifetime, so a
//! concurrent mutation never changes a decision already in flight and no
//! reader can observe a half-built matcher.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use arc_swap::ArcSwap;
use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use regex::Regex;

use crate::config::schema::{PrerenderConfig, UpstreamOptions, DEFAULT_SERVICE_URL};
use crate::error::PolicyError;
use crate::prerender::agents::CrawlerSignatures;
use crate::prerender::extensions::{default_ignored_extensions, ignored_extensions_pattern};

/// Upstream options resolved into header and duration types.
#[derive(Debug, Clone, Default)]
pub struct UpstreamSettings {
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
}

impl TryFrom<&UpstreamOptions> for UpstreamSettings {
    type Error = PolicyError;

    fn try_from(options: &UpstreamOptions) -> Result<Self, Self::Error> {
        let mut headers = HeaderMap::with_capacity(options.headers.len());
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| PolicyError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| PolicyError::InvalidHeader(name.to_string()))?;
            headers.append(name, value);
        }

        Ok(Self {
            headers,
            timeout: options.timeout_secs.map(Duration::from_secs),
        })
    }
}

/// Immutable view of the policy used for one request.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    crawlers: CrawlerSignatures,
    ignored_extensions: Regex,
    whitelist: Vec<Regex>,
    blacklist: Vec<Regex>,
    service_url: String,
    token: Option<HeaderValue>,
    protocol: Option<String>,
    host: Option<String>,
    forward_headers: bool,
    upstream: UpstreamSettings,
}

impl Default for PolicySnapshot {
    fn default() -> Self {
        Self {
            crawlers: CrawlerSignatures::default(),
            ignored_extensions: default_ignored_extensions(),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            service_url: DEFAULT_SERVICE_URL.to_string(),
            token: None,
            protocol: None,
            host: None,
            forward_headers: false,
            upstream: UpstreamSettings::default(),
        }
    }
}

impl PolicySnapshot {
    pub fn crawlers(&self) -> &CrawlerSignatures {
        &self.crawlers
    }

    pub fn ignored_extensions(&self) -> &Regex {
        &self.ignored_extensions
    }

    /// Empty means unrestricted.
    pub fn whitelist(&self) -> &[Regex] {
        &self.whitelist
    }

    /// Empty means unrestricted.
    pub fn blacklist(&self) -> &[Regex] {
        &self.blacklist
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn token(&self) -> Option<&HeaderValue> {
        self.token.as_ref()
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn forward_headers(&self) -> bool {
        self.forward_headers
    }

    pub fn upstream(&self) -> &UpstreamSettings {
        &self.upstream
    }

    /// Apply every field of `config` except crawler signatures, which only grow.
    fn apply(&mut self, config: &PrerenderConfig) -> Result<(), PolicyError> {
        self.set_service_url(&config.service_url)?;
        self.set_token(config.token.as_deref())?;
        self.set_protocol(config.protocol.as_deref())?;
        self.host = forced_host(config.host.as_deref());
        self.forward_headers = config.forward_headers;
        self.upstream = UpstreamSettings::try_from(&config.upstream)?;
        self.whitelist = compile_patterns(&config.whitelist)?;
        self.blacklist = compile_patterns(&config.blacklist)?;
        self.ignored_extensions = match &config.ignored_extensions {
            Some(list) => ignored_extensions_pattern(list)?,
            None => default_ignored_extensions(),
        };
        if let Some(grown) = self.crawlers.with_added(&config.crawler_user_agents)? {
            self.crawlers = grown;
        }
        Ok(())
    }

    fn set_service_url(&mut self, service_url: &str) -> Result<(), PolicyError> {
        url::Url::parse(service_url).map_err(|source| PolicyError::InvalidServiceUrl {
            url: service_url.to_string(),
            source,
        })?;
        self.service_url = service_url.to_string();
        Ok(())
    }

    fn set_token(&mut self, token: Option<&str>) -> Result<(), PolicyError> {
        self.token = match token {
            Some(token) => {
                let mut value = HeaderValue::from_str(token)
                    .map_err(|_| PolicyError::InvalidHeader("x-prerender-token".into()))?;
                value.set_sensitive(true);
                Some(value)
            }
            None => None,
        };
        Ok(())
    }

    fn set_protocol(&mut self, protocol: Option<&str>) -> Result<(), PolicyError> {
        match protocol {
            Some(p) if p != "http" && p != "https" => {
                Err(PolicyError::InvalidProtocol(p.to_string()))
            }
            _ => {
                self.protocol = protocol.map(str::to_string);
                Ok(())
            }
        }
    }
}

fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>, PolicyError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p.as_ref()).map_err(|source| PolicyError::InvalidPattern {
                pattern: p.as_ref().to_string(),
                source,
            })
        })
        .collect()
}

/// Shared, live policy.
#[derive(Debug)]
pub struct Policy {
    current: ArcSwap<PolicySnapshot>,
    /// Serializes writers; readers never take it.
    write: Mutex<()>,
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(PolicySnapshot::default())
    }
}

impl Policy {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
            write: Mutex::new(()),
        }
    }

    /// Build a policy from the built-in defaults plus `config`.
    pub fn from_config(config: &PrerenderConfig) -> Result<Self, PolicyError> {
        let mut snapshot = PolicySnapshot::default();
        snapshot.apply(config)?;
        Ok(Self::new(snapshot))
    }

    /// The policy as of now. Hold on to it for the duration of one request.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.current.load_full()
    }

    fn update<F>(&self, mutate: F) -> Result<(), PolicyError>
    where
        F: FnOnce(&mut PolicySnapshot) -> Result<(), PolicyError>,
    {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = PolicySnapshot::clone(&self.current.load());
        mutate(&mut next)?;
        self.current.store(Arc::new(next));
        Ok(())
    }

    /// Add crawler signatures. Returns whether the set changed; the matcher is
    /// only rebuilt and republished in that case.
    pub fn add_user_agents<I, S>(&self, agents: I) -> Result<bool, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.current.load_full();
        match current.crawlers.with_added(agents)? {
            Some(crawlers) => {
                let mut next = PolicySnapshot::clone(&current);
                next.crawlers = crawlers;
                tracing::debug!(signatures = next.crawlers.len(), "Crawler signatures updated");
                self.current.store(Arc::new(next));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace the whitelist. An empty list removes the restriction.
    pub fn set_whitelist<S: AsRef<str>>(&self, patterns: &[S]) -> Result<(), PolicyError> {
        let compiled = compile_patterns(patterns)?;
        self.update(|p| {
            p.whitelist = compiled;
            Ok(())
        })
    }

    /// Replace the blacklist. An empty list removes the restriction.
    pub fn set_blacklist<S: AsRef<str>>(&self, patterns: &[S]) -> Result<(), PolicyError> {
        let compiled = compile_patterns(patterns)?;
        self.update(|p| {
            p.blacklist = compiled;
            Ok(())
        })
    }

    pub fn set_ignored_extensions<S: AsRef<str>>(&self, extensions: &[S]) -> Result<(), PolicyError> {
        let compiled = ignored_extensions_pattern(extensions)?;
        self.update(|p| {
            p.ignored_extensions = compiled;
            Ok(())
        })
    }

    pub fn set_service_url(&self, service_url: &str) -> Result<(), PolicyError> {
        self.update(|p| p.set_service_url(service_url))
    }

    pub fn set_token(&self, token: Option<&str>) -> Result<(), PolicyError> {
        self.update(|p| p.set_token(token))
    }

    /// Force the protocol of the original URL; `None` restores detection.
    pub fn set_protocol(&self, protocol: Option<&str>) -> Result<(), PolicyError> {
        self.update(|p| p.set_protocol(protocol))
    }

    /// Force the host of the original URL; `None` or a blank host restores detection.
    pub fn set_host(&self, host: Option<&str>) -> Result<(), PolicyError> {
        self.update(|p| {
            p.host = forced_host(host);
            Ok(())
        })
    }

    pub fn set_forward_headers(&self, forward: bool) -> Result<(), PolicyError> {
        self.update(|p| {
            p.forward_headers = forward;
            Ok(())
        })
    }

    pub fn set_upstream_options(&self, options: &UpstreamOptions) -> Result<(), PolicyError> {
        let settings = UpstreamSettings::try_from(options)?;
        self.update(|p| {
            p.upstream = settings;
            Ok(())
        })
    }

    /// Apply a reloaded `[prerender]` section in one atomic step.
    ///
    /// Crawler signatures are merged, never removed. On error the live policy
    /// is left untouched.
    pub fn reconfigure(&self, config: &PrerenderConfig) -> Result<(), PolicyError> {
        self.update(|p| p.apply(config))
    }
}

fn forced_host(host: Option<&str>) -> Option<String> {
    host.map(str::trim).filter(|h| !h.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = Policy::default();
        let snap = policy.snapshot();
        assert_eq!(snap.service_url(), DEFAULT_SERVICE_URL);
        assert!(snap.whitelist().is_empty());
        assert!(snap.blacklist().is_empty());
        assert!(!snap.forward_headers());
        assert!(snap.crawlers().is_match("Googlebot/2.1"));
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_mutation() {
        let policy = Policy::default();
        let before = policy.snapshot();

        policy.set_whitelist(&["^/blog"]).unwrap();
        policy.add_user_agents(["my-crawler"]).unwrap();

        assert!(before.whitelist().is_empty());
        assert!(!before.crawlers().is_match("my-crawler"));

        let after = policy.snapshot();
        assert_eq!(after.whitelist().len(), 1);
        assert!(after.crawlers().is_match("My-Crawler"));
    }

    #[test]
    fn test_add_user_agents_reports_change() {
        let policy = Policy::default();
        assert!(policy.add_user_agents(["custombot"]).unwrap());
        let pattern = policy.snapshot().crawlers().pattern().map(str::to_string);
        let before = policy.snapshot();

        assert!(!policy.add_user_agents(["CustomBot"]).unwrap());
        // unchanged set: same snapshot still published
        assert!(Arc::ptr_eq(&before, &policy.snapshot()));
        assert_eq!(policy.snapshot().crawlers().pattern().map(str::to_string), pattern);
    }

    #[test]
    fn test_invalid_pattern_leaves_policy_unchanged() {
        let policy = Policy::default();
        policy.set_blacklist(&["/admin"]).unwrap();

        let err = policy.set_blacklist(&["/ok", "("]).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidPattern { .. }));
        assert_eq!(policy.snapshot().blacklist()[0].as_str(), "/admin");
    }

    #[test]
    fn test_protocol_and_service_url_validation() {
        let policy = Policy::default();
        assert!(matches!(
            policy.set_protocol(Some("ftp")),
            Err(PolicyError::InvalidProtocol(_))
        ));
        assert!(policy.set_protocol(Some("https")).is_ok());
        assert_eq!(policy.snapshot().protocol(), Some("https"));

        assert!(matches!(
            policy.set_service_url("::nope"),
            Err(PolicyError::InvalidServiceUrl { .. })
        ));
        assert!(policy.set_service_url("http://render.local:3000").is_ok());
        assert_eq!(policy.snapshot().service_url(), "http://render.local:3000");
    }

    #[test]
    fn test_token_is_sensitive() {
        let policy = Policy::default();
        policy.set_token(Some("secret")).unwrap();
        let snap = policy.snapshot();
        let token = snap.token().unwrap();
        assert!(token.is_sensitive());
        assert_eq!(token, "secret");

        policy.set_token(None).unwrap();
        assert!(policy.snapshot().token().is_none());
    }

    #[test]
    fn test_blank_host_restores_detection() {
        let policy = Policy::default();
        policy.set_host(Some("canonical.example")).unwrap();
        assert_eq!(policy.snapshot().host(), Some("canonical.example"));

        policy.set_host(Some("  ")).unwrap();
        assert!(policy.snapshot().host().is_none());

        let mut config = PrerenderConfig::default();
        config.host = Some(String::new());
        policy.reconfigure(&config).unwrap();
        assert!(policy.snapshot().host().is_none());
    }

    #[test]
    fn test_reconfigure_merges_signatures_and_replaces_the_rest() {
        let policy = Policy::default();
        policy.add_user_agents(["runtime-bot"]).unwrap();
        policy.set_whitelist(&["^/old"]).unwrap();

        let mut config = PrerenderConfig::default();
        config.service_url = "http://render.local/".into();
        config.crawler_user_agents = vec!["file-bot".into()];
        config.blacklist = vec!["/admin".into()];
        config.forward_headers = true;
        config.upstream.timeout_secs = Some(7);
        policy.reconfigure(&config).unwrap();

        let snap = policy.snapshot();
        assert!(snap.crawlers().is_match("runtime-bot"));
        assert!(snap.crawlers().is_match("file-bot"));
        assert!(snap.whitelist().is_empty());
        assert_eq!(snap.blacklist().len(), 1);
        assert!(snap.forward_headers());
        assert_eq!(snap.upstream().timeout, Some(Duration::from_secs(7)));
        assert_eq!(snap.service_url(), "http://render.local/");
    }

    #[test]
    fn test_upstream_headers_are_parsed() {
        let mut options = UpstreamOptions::default();
        options.headers.insert("X-Tenant".into(), "acme".into());
        let policy = Policy::default();
        policy.set_upstream_options(&options).unwrap();
        assert_eq!(policy.snapshot().upstream().headers["x-tenant"], "acme");

        options.headers.insert("bad name".into(), "x".into());
        assert!(matches!(
            policy.set_upstream_options(&options),
            Err(PolicyError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let policy = Arc::new(Policy::default());
        let writer = {
            let policy = policy.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    policy.add_user_agents([format!("bot-{}", i)]).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let policy = policy.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let snap = policy.snapshot();
                        let crawlers = snap.crawlers();
                        // every published signature is also covered by the published matcher
                        assert!(crawlers.is_match("googlebot"));
                        if crawlers.contains("bot-0") {
                            assert!(crawlers.is_match("bot-0"));
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert!(policy.snapshot().crawlers().is_match("bot-199"));
    }
}
