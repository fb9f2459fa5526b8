//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::SortDirection;
use clap::Parser;
use std::fmt;
use std::path::PathBuf;

/// camara-digest - paginated fetch-and-aggregate for the Chamber of Deputies open-data API
///
/// Fetches every page of a resource, then groups the records by a field
/// and writes count and sum tables as Markdown or JSON.
///
/// Examples:
///   camara-digest -e deputados --group-by siglaUf
///   camara-digest -e deputados -f siglaPartido=PT --group-by siglaUf --top 5
///   camara-digest -e deputados/204554/despesas --each ano=2022,2023,2024 \
///       --group-by tipoDespesa --sum valorLiquido --format json
///   camara-digest -e deputados/204554 --detail
///   camara-digest --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Resource path relative to the API base URL
    #[arg(short, long, value_name = "PATH", required_unless_present = "init_config")]
    pub endpoint: Option<String>,

    /// Filter parameter sent with every page request (repeatable)
    ///
    /// Example: -f siglaUf=SP -f siglaPartido=PT
    #[arg(short, long = "filter", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub filters: Vec<(String, String)>,

    /// Field the upstream should sort by
    #[arg(long, value_name = "FIELD")]
    pub sort: Option<String>,

    /// Sort direction (used with --sort)
    #[arg(long, value_name = "DIR", requires = "sort")]
    pub order: Option<SortDirection>,

    /// Run one query per value of a parameter, concurrently
    ///
    /// Example: --each ano=2022,2023,2024
    #[arg(long, value_name = "PARAM=V1,V2", value_parser = parse_fan_out)]
    pub each: Option<(String, Vec<String>)>,

    /// Field to group records by (dotted paths reach nested objects)
    #[arg(short, long, value_name = "FIELD")]
    pub group_by: Option<String>,

    /// Numeric field to sum, per group and overall
    #[arg(short, long, value_name = "FIELD")]
    pub sum: Option<String>,

    /// Fetch a single-entity resource and print it as JSON
    #[arg(long, conflicts_with_all = ["each", "group_by", "sum"])]
    pub detail: bool,

    /// Records per page (capped to the upstream maximum)
    #[arg(long, value_name = "COUNT")]
    pub page_size: Option<usize>,

    /// Maximum pages fetched per query
    #[arg(long, value_name = "COUNT")]
    pub max_pages: Option<usize>,

    /// Queries fetched at once with --each
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// API base URL
    #[arg(long, value_name = "URL", env = "CAMARA_DIGEST_BASE_URL")]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Keep only the first N rows of each summary table
    #[arg(long, value_name = "N")]
    pub top: Option<usize>,

    /// Include the fetched records in JSON reports
    #[arg(long)]
    pub include_records: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .camara-digest.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only, no progress spinner)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .camara-digest.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

fn parse_fan_out(s: &str) -> Result<(String, Vec<String>), String> {
    let (key, values) = parse_key_value(s)?;
    let values: Vec<String> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect();
    if values.is_empty() {
        return Err(format!("no values given for '{}'", key));
    }
    Ok((key, values))
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The endpoint, or an empty string when only --init-config was given.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.endpoint().trim().is_empty() {
            return Err("Endpoint must not be empty".to_string());
        }

        if let Some(ref url) = self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        for (name, value) in [
            ("Page size", self.page_size),
            ("Max pages", self.max_pages),
            ("Concurrency", self.concurrency),
        ] {
            if value == Some(0) {
                return Err(format!("{} must be at least 1", name));
            }
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let Some(ref field) = self.group_by {
            if field.trim().is_empty() {
                return Err("--group-by needs a field name".to_string());
            }
        }
        if let Some(ref field) = self.sum {
            if field.trim().is_empty() {
                return Err("--sum needs a field name".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `verbose_by_default` is the config file's `general.verbose`; `--quiet`
    /// still wins over it.
    pub fn log_level(&self, verbose_by_default: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || verbose_by_default {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
