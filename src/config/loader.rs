//! Configuration loading from disk.

use std::path::Path;
use std::fs;
use crate::config::schema::{ProxyConfig, DEFAULT_SERVICE_URL};
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding the default rendering service URL.
pub const ENV_SERVICE_URL: &str = "PRERENDER_SERVICE_URL";

/// Environment variable supplying the token when the config has none.
pub const ENV_TOKEN: &str = "PRERENDER_TOKEN";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Parse, apply environment defaults and validate configuration text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let mut config: ProxyConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    apply_env_defaults(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply command-line overrides and validate the result again.
pub fn apply_overrides(
    config: &mut ProxyConfig,
    bind: Option<String>,
    origin: Option<String>,
) -> Result<(), ConfigError> {
    if let Some(bind) = bind {
        config.listener.bind_address = bind;
    }
    if let Some(origin) = origin {
        config.origin.address = origin;
    }
    validate_config(config).map_err(ConfigError::Validation)
}

/// Fill rendering service settings the file left unset from the environment.
///
/// An explicit `service_url` or `token` in the file always wins.
pub fn apply_env_defaults<F>(config: &mut ProxyConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if config.prerender.service_url == DEFAULT_SERVICE_URL {
        if let Some(url) = lookup(ENV_SERVICE_URL).filter(|v| !v.is_empty()) {
            config.prerender.service_url = url;
        }
    }

    if config.prerender.token.is_none() {
        config.prerender.token = lookup(ENV_TOKEN).filter(|v| !v.is_empty());
    }
}
