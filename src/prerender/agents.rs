//! Crawler signature set.
//!
//! Signatures are stored lowercased and deduplicated. The compiled matcher is
//! a single case-insensitive alternation of escaped literals, rebuilt only
//! when the set actually changes.

use std::collections::BTreeSet;
use std::sync::LazyLock;
use regex::{Regex, RegexBuilder};

use crate::error::PolicyError;

/// User-agent fragments of well-known crawlers and link-preview bots.
pub const DEFAULT_CRAWLER_USER_AGENTS: &[&str] = &[
    "googlebot",
    "Yahoo! Slurp",
    "bingbot",
    "yandex",
    "baiduspider",
    "facebookexternalhit",
    "twitterbot",
    "rogerbot",
    "linkedinbot",
    "embedly",
    "quora link preview",
    "showyoubot",
    "outbrain",
    "pinterest/0.",
    "developers.google.com/+/web/snippet",
    "slackbot",
    "vkShare",
    "W3C_Validator",
    "redditbot",
    "Applebot",
    "WhatsApp",
    "flipboard",
    "tumblr",
    "bitlybot",
    "SkypeUriPreview",
    "nuzzel",
    "Discordbot",
    "Google Page Speed",
    "Qwantify",
    "pinterestbot",
    "Bitrix link preview",
    "XING-contenttabreceiver",
    "Chrome-Lighthouse",
    "TelegramBot",
    "SeznamBot",
    "screaming frog SEO spider",
    "AhrefsBot",
    "Google-InspectionTool",
];

static DEFAULT_SIGNATURES: LazyLock<CrawlerSignatures> = LazyLock::new(|| {
    CrawlerSignatures::empty()
        .with_added(DEFAULT_CRAWLER_USER_AGENTS)
        .expect("built-in crawler list compiles")
        .unwrap_or_else(CrawlerSignatures::empty)
});

/// Deduplicated crawler signatures plus their compiled matcher.
#[derive(Debug, Clone)]
pub struct CrawlerSignatures {
    agents: BTreeSet<String>,
    /// `None` while the set is empty: nothing matches.
    matcher: Option<Regex>,
}

impl CrawlerSignatures {
    /// A set that matches nothing.
    pub fn empty() -> Self {
        Self {
            agents: BTreeSet::new(),
            matcher: None,
        }
    }

    /// Build a set from arbitrary signatures.
    pub fn new<I, S>(agents: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::empty().with_added(agents)?.unwrap_or_else(Self::empty))
    }

    /// Return a new set including `agents`, or `None` if nothing new was added.
    ///
    /// Entries are trimmed; empty ones are skipped. Comparison is case-insensitive.
    pub fn with_added<I, S>(&self, agents: I) -> Result<Option<Self>, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut next = self.agents.clone();
        let mut changed = false;

        for raw in agents {
            let key = raw.as_ref().trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            changed |= next.insert(key);
        }

        if !changed {
            return Ok(None);
        }

        let matcher = compile(&next)?;
        Ok(Some(Self {
            agents: next,
            matcher,
        }))
    }

    pub fn is_match(&self, user_agent: &str) -> bool {
        self.matcher
            .as_ref()
            .is_some_and(|re| re.is_match(user_agent))
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.agents.contains(&agent.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Source of the compiled matcher, if any.
    pub fn pattern(&self) -> Option<&str> {
        self.matcher.as_ref().map(Regex::as_str)
    }
}

impl Default for CrawlerSignatures {
    fn default() -> Self {
        DEFAULT_SIGNATURES.clone()
    }
}

fn compile(agents: &BTreeSet<String>) -> Result<Option<Regex>, PolicyError> {
    if agents.is_empty() {
        return Ok(None);
    }

    let alternation = agents
        .iter()
        .map(|agent| regex::escape(agent))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!("(?:{})", alternation);

    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|source| PolicyError::InvalidPattern { pattern, source })
}
