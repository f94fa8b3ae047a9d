//! Static asset extensions that are never prerendered.

use std::sync::LazyLock;
use regex::{Regex, RegexBuilder};

use crate::error::PolicyError;

pub const DEFAULT_IGNORED_EXTENSIONS: &[&str] = &[
    "js", "css", "xml", "less", "png", "jpg", "jpeg", "gif", "pdf", "doc", "txt", "ico", "rss",
    "zip", "mp3", "rar", "exe", "wmv", "avi", "ppt", "mpg", "mpeg", "tif", "wav", "mov", "psd",
    "ai", "xls", "mp4", "m4a", "swf", "dat", "dmg", "iso", "flv", "m4v", "torrent", "woff",
    "woff2", "ttf", "eot", "svg", "webp", "avif", "webmanifest", "map",
];

static DEFAULT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    ignored_extensions_pattern(DEFAULT_IGNORED_EXTENSIONS)
        .expect("built-in extension list compiles")
});

/// Pattern used when no extension list is configured.
pub fn default_ignored_extensions() -> Regex {
    DEFAULT_PATTERN.clone()
}

/// Compile a case-insensitive "path ends with one of these extensions" pattern.
///
/// A leading dot on an entry is optional. An empty list yields a pattern
/// that never matches.
pub fn ignored_extensions_pattern<I, S>(extensions: I) -> Result<Regex, PolicyError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = extensions
        .into_iter()
        .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_string())
        .filter(|ext| !ext.is_empty())
        .map(|ext| regex::escape(&ext))
        .collect();

    let pattern = if parts.is_empty() {
        // end of text followed by a character: never matches
        r"\z.".to_string()
    } else {
        format!(r"\.(?:{})$", parts.join("|"))
    };

    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| PolicyError::InvalidPattern { pattern, source })
}
