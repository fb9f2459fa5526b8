//! Report generation.
//!
//! This module renders a [`Report`] as Markdown or pretty-printed JSON.

use crate::models::{QueryOutcome, Report, ReportMetadata, SummaryTable, Total};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# camara-digest Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));

    if report.queries.len() > 1 {
        output.push_str(&generate_queries_section(&report.queries));
    }

    if let Some(ref total) = report.total {
        output.push_str(&generate_total_section(total));
    }
    if let Some(ref counts) = report.counts {
        output.push_str(&generate_table_section(counts));
    }
    if let Some(ref sums) = report.sums {
        output.push_str(&generate_table_section(sums));
    }

    output.push_str(&generate_footer());
    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** {}\n", metadata.base_url));
    section.push_str(&format!("- **Endpoint:** `{}`\n", metadata.endpoint));
    if !metadata.filters.is_empty() {
        let filters: Vec<String> = metadata
            .filters
            .iter()
            .map(|(k, v)| format!("`{}={}`", k, v))
            .collect();
        section.push_str(&format!("- **Filters:** {}\n", filters.join(", ")));
    }
    if let Some(ref param) = metadata.fan_out {
        section.push_str(&format!("- **One query per:** `{}`\n", param));
    }
    section.push_str(&format!("- **Pages Fetched:** {}\n", metadata.pages_fetched));
    section.push_str(&format!("- **Records:** {}\n", metadata.records_fetched));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Duration:** {:.1}s\n\n", metadata.duration_seconds));

    section
}

/// Per-query breakdown of a fanned-out run.
fn generate_queries_section(queries: &[QueryOutcome]) -> String {
    let mut section = String::new();
    let with_totals = queries.iter().any(|q| q.total.is_some());

    section.push_str("## Queries\n\n");
    if with_totals {
        section.push_str("| Query | Records | Pages | Stopped on | Total |\n");
        section.push_str("|:---|---:|---:|:---|---:|\n");
    } else {
        section.push_str("| Query | Records | Pages | Stopped on |\n");
        section.push_str("|:---|---:|---:|:---|\n");
    }

    for query in queries {
        section.push_str(&format!(
            "| {} | {} | {} | {} |",
            query.label, query.records, query.pages, query.stop
        ));
        if with_totals {
            let total = query
                .total
                .map(|t| format!("{:.2}", t.sum))
                .unwrap_or_default();
            section.push_str(&format!(" {} |", total));
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

fn generate_total_section(total: &Total) -> String {
    let mut section = String::new();

    section.push_str("## Total\n\n");
    section.push_str(&format!(
        "**{:.2}** over {} records",
        total.sum, total.records
    ));
    if total.degraded > 0 {
        section.push_str(&format!(
            " ({} without a numeric value, counted as 0)",
            total.degraded
        ));
    }
    section.push_str("\n\n");

    section
}

/// Generate a count or sum table.
fn generate_table_section(table: &SummaryTable) -> String {
    let mut section = String::new();

    match table.value_field {
        Some(ref value_field) => {
            section.push_str(&format!(
                "## Sum of `{}` by `{}`\n\n",
                value_field, table.key_field
            ));
            section.push_str("| Key | Sum | Records | Degraded |\n");
            section.push_str("|:---|---:|---:|---:|\n");
            for row in &table.rows {
                section.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    escape_cell(&row.key.to_string()),
                    row.metric,
                    row.records,
                    row.degraded
                ));
            }
        }
        None => {
            section.push_str(&format!("## Count by `{}`\n\n", table.key_field));
            section.push_str("| Key | Count |\n");
            section.push_str("|:---|---:|\n");
            for row in &table.rows {
                section.push_str(&format!(
                    "| {} | {} |\n",
                    escape_cell(&row.key.to_string()),
                    row.metric
                ));
            }
        }
    }

    if table.rows.is_empty() {
        section.push_str("\n*No records.*\n");
    }
    if table.omitted > 0 {
        section.push_str(&format!("\n*{} more rows omitted.*\n", table.omitted));
    }
    section.push('\n');

    section
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Data: Câmara dos Deputados open-data API. Generated by camara-digest.*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
