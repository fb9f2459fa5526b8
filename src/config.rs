//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.camara-digest.toml` files.

use crate::client::{FetchPolicy, ParamNames};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".camara-digest.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Upstream API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Pagination and retry settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path. Empty means stdout.
    #[serde(default)]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of queries fetched concurrently when fanning out.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: String::new(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Upstream API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every endpoint is resolved against.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Client-identifying User-Agent sent on every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-attempt request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Largest page size the upstream accepts.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Query parameter carrying the page number.
    #[serde(default = "default_page_param")]
    pub page_param: String,

    /// Query parameter carrying the page size.
    #[serde(default = "default_page_size_param")]
    pub page_size_param: String,

    /// Query parameter carrying the sort field.
    #[serde(default = "default_sort_param")]
    pub sort_param: String,

    /// Query parameter carrying the sort direction.
    #[serde(default = "default_order_param")]
    pub order_param: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout_seconds: default_timeout(),
            max_page_size: default_max_page_size(),
            page_param: default_page_param(),
            page_size_param: default_page_size_param(),
            sort_param: default_sort_param(),
            order_param: default_order_param(),
        }
    }
}

fn default_base_url() -> String {
    "https://dadosabertos.camara.leg.br/api/v2".to_string()
}

fn default_user_agent() -> String {
    format!("camara-digest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout() -> u64 {
    30
}

fn default_max_page_size() -> usize {
    100
}

fn default_page_param() -> String {
    "pagina".to_string()
}

fn default_page_size_param() -> String {
    "itens".to_string()
}

fn default_sort_param() -> String {
    "ordenarPor".to_string()
}

fn default_order_param() -> String {
    "ordem".to_string()
}

/// Pagination and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Records requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Ceiling on pages fetched per query.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Attempts per page before the fetch fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay between attempts at the same page, in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Delay between successful page requests, in milliseconds.
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
            page_delay_ms: default_page_delay(),
        }
    }
}

fn default_page_size() -> usize {
    100
}

fn default_max_pages() -> usize {
    50
}

fn default_max_attempts() -> usize {
    3
}

fn default_retry_delay() -> u64 {
    1200
}

fn default_page_delay() -> u64 {
    200
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output format: "markdown" or "json".
    #[serde(default = "default_format")]
    pub format: String,

    /// Maximum rows per summary table (0 keeps all).
    #[serde(default)]
    pub top: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            top: 0,
        }
    }
}

fn default_format() -> String {
    "markdown".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.camara-digest.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref base_url) = args.base_url {
            self.api.base_url = base_url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.api.timeout_seconds = timeout;
        }

        if let Some(page_size) = args.page_size {
            self.fetch.page_size = page_size;
        }
        if let Some(max_pages) = args.max_pages {
            self.fetch.max_pages = max_pages;
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        if let Some(format) = args.format {
            self.report.format = format.to_string();
        }
        if let Some(top) = args.top {
            self.report.top = top;
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Fetch policy derived from the `[api]` and `[fetch]` sections.
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            base_url: self.api.base_url.clone(),
            max_page_size: self.api.max_page_size,
            max_attempts: self.fetch.max_attempts,
            retry_delay: Duration::from_millis(self.fetch.retry_delay_ms),
            page_delay: Duration::from_millis(self.fetch.page_delay_ms),
            params: ParamNames {
                page: self.api.page_param.clone(),
                page_size: self.api.page_size_param.clone(),
                sort_field: self.api.sort_param.clone(),
                sort_direction: self.api.order_param.clone(),
            },
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "https://dadosabertos.camara.leg.br/api/v2");
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.fetch.page_size, 100);
        assert!(config.api.user_agent.starts_with("camara-digest/"));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
concurrency = 2

[api]
base_url = "http://localhost:8080/api"
timeout_seconds = 10

[fetch]
max_pages = 5
retry_delay_ms = 0
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.concurrency, 2);
        assert_eq!(config.api.base_url, "http://localhost:8080/api");
        assert_eq!(config.api.timeout_seconds, 10);
        assert_eq!(config.api.page_param, "pagina");
        assert_eq!(config.fetch.max_pages, 5);
        assert_eq!(config.fetch.page_size, 100);

        let policy = config.fetch_policy();
        assert_eq!(policy.retry_delay, Duration::ZERO);
        assert_eq!(policy.page_delay, Duration::from_millis(200));
        assert_eq!(policy.params.page_size, "itens");
    }

    #[test]
    fn test_verbose_from_file_survives_merge() {
        use clap::Parser;

        let mut config: Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        let args = crate::cli::Args::try_parse_from(["camara-digest", "-e", "deputados"]).unwrap();
        config.merge_with_args(&args);

        assert!(config.general.verbose);
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::DEBUG);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[api]"));
        assert!(toml_str.contains("[fetch]"));
        assert!(toml_str.contains("[report]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.fetch.max_pages, 50);
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from_dir(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(CONFIG_FILE), "[fetch]\nmax_pages = 7\n").unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(config.fetch.max_pages, 7);

        std::fs::write(dir.path().join(CONFIG_FILE), "[fetch\n").unwrap();
        assert!(Config::load_from_dir(dir.path()).is_err());
    }
}
