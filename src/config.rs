//! Runtime configuration.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults, which reproduce a plain run with no arguments
//! 2. An optional YAML file passed with `--config`
//! 3. Command-line flags
//!
//! ```yaml
//! index_url: https://cn.nytimes.com/async/mostviewed/all/?lang=zh-hans
//! scratch_dir: /tmp
//! language: zh
//! request_timeout_secs: 30
//! fail_fast: false
//! retry:
//!   max_retries: 3
//!   base_delay_ms: 1000
//! ```

use crate::cli::Cli;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// The most viewed feed of the simplified Chinese edition.
pub const DEFAULT_INDEX_URL: &str = "https://cn.nytimes.com/async/mostviewed/all/?lang=zh-hans";

/// Article body paragraphs on an article page.
pub const DEFAULT_CONTENT_SELECTOR: &str = ".article-partial .article-paragraph";

/// Settings for one run.
///
/// Built from defaults, then an optional YAML file (`--config`), then CLI
/// flags. Every field may be omitted from the file.
///
/// ```yaml
/// scratch_dir: ./books
/// fail_fast: false
/// retry:
///   max_retries: 3
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Most viewed feed to read.
    pub index_url: String,
    /// Flat directory receiving snapshots, covers and e-books.
    pub scratch_dir: PathBuf,
    /// Locale code declared by every generated e-book.
    pub language: String,
    /// CSS selector matching the body paragraphs of an article page.
    pub content_selector: String,
    /// Per-request timeout; `None` leaves requests unbounded.
    pub request_timeout_secs: Option<u64>,
    /// Write the per-article JSON debug snapshot.
    pub write_snapshots: bool,
    /// Abort the whole run on the first per-article failure.
    pub fail_fast: bool,
    pub retry: RetryConfig,
}

/// Backoff policy for transient fetch failures.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Extra attempts after the first; 0 disables retrying.
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            scratch_dir: std::env::temp_dir(),
            language: "zh".to_string(),
            content_selector: DEFAULT_CONTENT_SELECTOR.to_string(),
            request_timeout_secs: None,
            write_snapshots: true,
            fail_fast: false,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl Config {
    /// Parse a YAML document; missing keys keep their defaults.
    pub fn from_yaml(yaml: &str, path: &Path) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the file named by `--config` (if any) and apply CLI overrides.
    #[instrument(level = "info", skip_all)]
    pub async fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let yaml = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| Error::io(path, e))?;
                let config = Self::from_yaml(&yaml, path)?;
                info!(path = %path.display(), "Loaded configuration file");
                config
            }
            None => Self::default(),
        };
        config.apply_cli(cli);
        Ok(config)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(url) = &cli.index_url {
            self.index_url = url.clone();
        }
        if let Some(dir) = &cli.scratch_dir {
            self.scratch_dir = dir.clone();
        }
        if let Some(max_retries) = cli.max_retries {
            self.retry.max_retries = max_retries;
        }
        if cli.fail_fast {
            self.fail_fast = true;
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
