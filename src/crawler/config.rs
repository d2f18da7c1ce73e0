//! # Crawler Configuration Module
//!
//! This module provides configuration options for the crawl-and-cache
//! pipeline: how long a stored page stays fresh, how long acquisition may take,
//! and where data and logs live. It uses a builder pattern for flexible
//! configuration and can be read from a JSON file at any time, so a running
//! service can pick up changes without a restart.
//!
//! ## Key Components
//!
//! - `CrawlerConfig`: The main configuration struct with pipeline parameters
//! - `CrawlerConfigBuilder`: Builder pattern implementation for easier configuration
//!
//! ## Example file
//!
//! ```json
//! {
//!   "threshold_days": 30,
//!   "browser_timeout_secs": 45,
//!   "settle_delay_secs": 2,
//!   "database_path": "data/crawled_data.db",
//!   "lang": "en"
//! }
//! ```
//!
//! Missing keys fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::crawler::acquisition::RenderOptions;
use crate::crawler::freshness::DEFAULT_THRESHOLD_DAYS;
use crate::crawler::normalize::Lang;
use crate::error::{Error, Result};

/// Longest accepted page load timeout
pub const MAX_BROWSER_TIMEOUT_SECS: u64 = 3_600;

/// Longest accepted post-load settle delay
pub const MAX_SETTLE_DELAY_SECS: u64 = 600;

/// Configuration for the crawl-and-cache pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Days a stored page is served before it is refreshed
    pub threshold_days: u32,

    /// Page load timeout in seconds
    pub browser_timeout_secs: u64,

    /// Seconds to wait after a page has loaded
    pub settle_delay_secs: u64,

    /// User agent to use for requests
    pub user_agent: String,

    /// Path of the page database
    pub database_path: String,

    /// Directory for rotated log files
    pub log_dir: PathBuf,

    /// Punctuation conventions for text normalization
    pub lang: Lang,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            threshold_days: DEFAULT_THRESHOLD_DAYS,
            browser_timeout_secs: 60,
            settle_delay_secs: 3,
            user_agent: format!("pagekeep/{}", env!("CARGO_PKG_VERSION")),
            database_path: "data/crawled_data.db".to_string(),
            log_dir: PathBuf::from("logs"),
            lang: Lang::En,
        }
    }
}

/// Builder for CrawlerConfig
#[derive(Debug, Default)]
pub struct CrawlerConfigBuilder {
    config: CrawlerConfig,
}

impl CrawlerConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: CrawlerConfig) -> Self {
        Self { config }
    }

    /// Set the staleness window in days
    pub fn threshold_days(mut self, threshold_days: u32) -> Self {
        self.config.threshold_days = threshold_days;
        self
    }

    /// Set the page load timeout in seconds
    pub fn browser_timeout_secs(mut self, browser_timeout_secs: u64) -> Self {
        self.config.browser_timeout_secs = browser_timeout_secs;
        self
    }

    /// Set the post-load settle delay in seconds
    pub fn settle_delay_secs(mut self, settle_delay_secs: u64) -> Self {
        self.config.settle_delay_secs = settle_delay_secs;
        self
    }

    /// Set the user agent to use for requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the path of the page database
    pub fn database_path(mut self, database_path: impl Into<String>) -> Self {
        self.config.database_path = database_path.into();
        self
    }

    /// Set the log directory
    pub fn log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = log_dir.into();
        self
    }

    /// Set the normalization language
    pub fn lang(mut self, lang: Lang) -> Self {
        self.config.lang = lang;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlerConfig {
        self.config
    }
}

impl CrawlerConfig {
    /// Create a new builder
    pub fn builder() -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::new()
    }

    /// Read a configuration from a JSON file
    pub async fn read_config(path: impl AsRef<Path>) -> Result<Self> {
        let config = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&config)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file if it exists, otherwise use the defaults
    pub async fn read_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if tokio::fs::try_exists(path.as_ref()).await? {
            Self::read_config(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.browser_timeout_secs == 0 {
            return Err(Error::Config(
                "browser_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.browser_timeout_secs > MAX_BROWSER_TIMEOUT_SECS {
            return Err(Error::Config(format!(
                "browser_timeout_secs must be at most {}",
                MAX_BROWSER_TIMEOUT_SECS
            )));
        }
        if self.settle_delay_secs > MAX_SETTLE_DELAY_SECS {
            return Err(Error::Config(format!(
                "settle_delay_secs must be at most {}",
                MAX_SETTLE_DELAY_SECS
            )));
        }
        if self.database_path.trim().is_empty() {
            return Err(Error::Config("database_path must not be empty".to_string()));
        }
        Ok(())
    }

    /// Get the page load timeout as a Duration
    pub fn browser_timeout(&self) -> Duration {
        Duration::from_secs(self.browser_timeout_secs)
    }

    /// Get the settle delay as a Duration
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// Options passed to the acquisition backend
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            timeout: self.browser_timeout(),
            settle_delay: self.settle_delay(),
        }
    }
}
