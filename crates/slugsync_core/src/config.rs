use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost";
pub const DEFAULT_ARTICLE_PATH: &str = "/$1";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteConfig {
    #[serde(default)]
    pub site: SiteSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteSection {
    pub base_url: Option<String>,
    pub article_path: Option<String>,
}

impl SiteConfig {
    /// Resolve the site base URL: env SLUGSYNC_BASE_URL > config > DEFAULT_BASE_URL.
    pub fn base_url(&self) -> String {
        if let Ok(value) = env::var("SLUGSYNC_BASE_URL") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.site
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// Resolve article path: config > DEFAULT_ARTICLE_PATH. `$1` stands for the slug.
    pub fn article_path(&self) -> &str {
        // Can't do env for borrowed return; check config then default.
        self.site
            .article_path
            .as_deref()
            .unwrap_or(DEFAULT_ARTICLE_PATH)
    }

    /// Resolve article path with env override (owned): env SLUGSYNC_ARTICLE_PATH
    /// > config > DEFAULT_ARTICLE_PATH.
    pub fn article_path_owned(&self) -> String {
        if let Ok(value) = env::var("SLUGSYNC_ARTICLE_PATH") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.article_path().to_string()
    }

    /// Public URL for an item slug: base URL (trailing slash trimmed) with the
    /// article path appended, every `$1` replaced by the slug.
    pub fn permalink(&self, slug: &str) -> String {
        let base = self.base_url();
        let base = base.trim_end_matches('/');
        format!("{base}{}", self.article_path_owned().replace("$1", slug))
    }
}

/// Load and parse a SiteConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SiteConfig> {
    if !config_path.exists() {
        return Ok(SiteConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SiteConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}
