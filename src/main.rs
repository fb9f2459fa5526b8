//! camara-digest - paginated fetch-and-aggregate CLI
//!
//! Fetches every page of an open-data API resource, groups the records and
//! writes count and sum tables as a Markdown or JSON report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (invalid arguments, config, fetch failure, etc.)

use anyhow::{anyhow, Context, Result};
use camara_digest::analysis;
use camara_digest::cli::{Args, OutputFormat};
use camara_digest::config::{Config, CONFIG_FILE};
use camara_digest::models::{
    FetchResult, Query, QueryOutcome, Record, Report, ReportMetadata, SortDirection, SummaryTable,
};
use camara_digest::report;
use camara_digest::{Fetcher, HttpTransport};
use chrono::Utc;
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is read before logging so `general.verbose` can set the level
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("camara-digest v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Config: {:?}", config);

    if let Err(e) = run(args, config).await {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .camara-digest.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    Ok(())
}

/// Initialize logging based on verbosity settings. `RUST_LOG` wins when set.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems go straight to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load {}: {:#}. Using defaults.", CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}

/// Run the complete fetch, aggregate and report workflow.
async fn run(args: Args, config: Config) -> Result<()> {
    let start_time = Instant::now();

    let transport = HttpTransport::new(
        &config.api.user_agent,
        Duration::from_secs(config.api.timeout_seconds),
    )
    .context("Failed to create HTTP client")?;

    let progress = (!args.quiet).then(spinner);
    let mut fetcher = Fetcher::new(transport, config.fetch_policy());
    if let Some(ref pb) = progress {
        fetcher = fetcher.with_progress(pb.clone());
    }

    if args.detail {
        let record = fetcher.fetch_one(args.endpoint()).await;
        if let Some(ref pb) = progress {
            pb.finish_and_clear();
        }
        let output = serde_json::to_string_pretty(&record?)?;
        return write_output(&config.general.output, &output);
    }

    let base = build_query(&args);
    let page_size = config.fetch.page_size;
    let max_pages = config.fetch.max_pages;

    let (labels, results) = match args.each {
        Some((ref param, ref values)) => {
            info!("Fanning out over {} = {:?}", param, values);
            let queries = base.fan_out(param, values);
            let results = fetcher
                .fetch_many(&queries, page_size, max_pages, config.general.concurrency)
                .await;
            (values.clone(), results)
        }
        None => {
            let result = fetcher.fetch_all(&base, page_size, max_pages).await;
            (vec![base.endpoint.clone()], result.map(|r| vec![r]))
        }
    };
    if let Some(ref pb) = progress {
        pb.finish_and_clear();
    }
    let results = results.with_context(|| format!("Failed to fetch {}", base.endpoint))?;

    let report = build_report(&args, &config, &base, labels, results, start_time)?;

    let format = OutputFormat::from_str(&config.report.format, true)
        .map_err(|e| anyhow!("Invalid report format '{}': {}", config.report.format, e))?;
    let output = match format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    write_output(&config.general.output, &output)?;

    if !args.quiet && !config.general.output.is_empty() {
        println!(
            "📊 {} records from {} pages in {:.1}s",
            report.metadata.records_fetched,
            report.metadata.pages_fetched,
            report.metadata.duration_seconds
        );
        println!("✅ Report saved to: {}", config.general.output);
    }

    Ok(())
}

/// Build the base query from endpoint, filters and sort flags.
fn build_query(args: &Args) -> Query {
    let mut query = Query::new(args.endpoint().trim());
    for (key, value) in &args.filters {
        query = query.with_filter(key.clone(), value.clone());
    }
    if let Some(ref field) = args.sort {
        query = query.with_sort(field.clone(), args.order.unwrap_or(SortDirection::Asc));
    }
    query
}

/// Aggregate the fetched records into the report structure.
fn build_report(
    args: &Args,
    config: &Config,
    base: &Query,
    labels: Vec<String>,
    results: Vec<FetchResult>,
    start_time: Instant,
) -> Result<Report> {
    let top = (config.report.top > 0).then_some(config.report.top);
    let sum_field = args.sum.as_deref();

    let mut queries = Vec::with_capacity(results.len());
    let mut records: Vec<Record> = Vec::new();
    let mut pages_fetched = 0;

    for (label, result) in labels.into_iter().zip(results) {
        let total = sum_field
            .map(|field| analysis::total(&result.records, field))
            .transpose()?;
        queries.push(QueryOutcome {
            label,
            records: result.len(),
            pages: result.pages,
            stop: result.stop,
            total,
        });
        pages_fetched += result.pages;
        records.extend(result.into_records());
    }

    let counts = match args.group_by {
        Some(ref key) => {
            let rows = analysis::group_count(&records, key)?;
            Some(SummaryTable::new(key, None, rows, top))
        }
        None => None,
    };

    let sums = match (args.group_by.as_deref(), sum_field) {
        (Some(key), Some(value)) => {
            let rows = analysis::group_sum(&records, key, value)?;
            let table = SummaryTable::new(key, Some(value), rows, top);
            if table.degraded() > 0 {
                warn!(
                    "{} records had no numeric '{}' and were summed as 0",
                    table.degraded(),
                    value
                );
            }
            Some(table)
        }
        _ => None,
    };

    let total = sum_field
        .map(|field| analysis::total(&records, field))
        .transpose()?;

    let metadata = ReportMetadata {
        base_url: config.api.base_url.clone(),
        endpoint: base.endpoint.clone(),
        filters: base
            .active_filters()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        fan_out: args.each.as_ref().map(|(param, _)| param.clone()),
        pages_fetched,
        records_fetched: records.len(),
        generated_at: Utc::now(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    Ok(Report {
        metadata,
        queries,
        counts,
        sums,
        total,
        records: args.include_records.then_some(records),
    })
}

/// Write to the configured file, or stdout when none is set.
fn write_output(path: &str, content: &str) -> Result<()> {
    if path.is_empty() {
        println!("{}", content);
        return Ok(());
    }

    std::fs::write(path, content).with_context(|| format!("Failed to write report to {}", path))
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
