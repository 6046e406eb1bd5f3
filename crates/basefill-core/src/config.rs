use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Root configuration, loaded from `~/.config/basefill/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub index: IndexConfig,
    pub scrape: ScrapeConfig,
    pub bulk: BulkConfig,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub url: String,
    pub index_name: String,
    pub type_name: String,
    /// Retries on connection failures and timeouts before a request is fatal.
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub search_timeout_secs: u64,
    pub scroll_keep_alive: String,
    pub scroll_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Concurrent record scrapes. 0 means one per CPU.
    pub workers: usize,
    pub record_timeout_secs: u64,
    pub fanout_deadline_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    pub threads: usize,
    pub chunk_size: usize,
    pub backfill_flush_every: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub json: bool,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index_name: crate::INDEX_NAME.to_string(),
            type_name: crate::TYPE_NAME.to_string(),
            max_retries: 100,
            request_timeout_secs: 60,
            search_timeout_secs: 10_000,
            scroll_keep_alive: "5m".to_string(),
            scroll_size: 1000,
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            record_timeout_secs: 30,
            fanout_deadline_secs: 30,
            user_agent: "basefill/0.1".to_string(),
            max_retries: 1,
        }
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            chunk_size: 100,
            backfill_flush_every: 1000,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ─── Load ──────────────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/basefill/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("BASEFILL_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("basefill")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}

impl IndexConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}

impl ScrapeConfig {
    pub fn record_timeout(&self) -> Duration {
        Duration::from_secs(self.record_timeout_secs)
    }

    pub fn fanout_deadline(&self) -> Duration {
        Duration::from_secs(self.fanout_deadline_secs)
    }
}
