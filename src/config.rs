use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::debug;

use crate::paths::config_file_path;

pub(crate) const API_KEY_ENV: &str = "TMDB_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    pub(crate) catalog: CatalogConfig,
    pub(crate) player: PlayerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CatalogConfig {
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) language: String,
    pub(crate) connect_timeout_ms: u64,
    pub(crate) read_timeout_ms: u64,
    pub(crate) attempts: usize,
    pub(crate) retry_delay_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".to_string(),
            api_key: None,
            language: "en-US".to_string(),
            connect_timeout_ms: 3_000,
            read_timeout_ms: 6_000,
            attempts: 3,
            retry_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct PlayerConfig {
    pub(crate) embed_base_url: String,
    /// Program used to open embed URLs; platform opener when unset.
    pub(crate) open_command: Option<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            embed_base_url: "https://megaembed.com/embed".to_string(),
            open_command: None,
        }
    }
}

impl Config {
    /// Loads the config file when it exists, then applies env overrides.
    pub(crate) fn load() -> Result<Self> {
        let path = config_file_path()?;
        let mut config = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides(env::var(API_KEY_ENV).ok());
        Ok(config)
    }

    pub(crate) fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    pub(crate) fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|err| anyhow!("{err}"))?;
        if config.catalog.attempts == 0 {
            return Err(anyhow!("catalog.attempts must be at least 1"));
        }
        Ok(config)
    }

    pub(crate) fn apply_env_overrides(&mut self, api_key: Option<String>) {
        if let Some(key) = api_key.filter(|key| !key.trim().is_empty()) {
            self.catalog.api_key = Some(key);
        }
    }
}
