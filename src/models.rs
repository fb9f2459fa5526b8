//! Data models for the fetch-and-aggregate pipeline.
//!
//! This module contains the core data structures shared by the fetcher,
//! the aggregator and the report generator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// One entity as returned by the upstream API.
///
/// No schema is enforced; fields are only looked at when they are used as
/// aggregation keys or values.
pub type Record = Map<String, Value>;

/// Sort direction understood by the upstream `ordem` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Sort field plus direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// A logical query against one resource endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Resource path relative to the API base URL, e.g. `deputados`.
    pub endpoint: String,
    /// Filter parameters. `None` and blank values are never sent.
    pub filters: BTreeMap<String, Option<String>>,
    /// Optional server-side ordering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
}

impl Query {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Add a filter that is always present.
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), Some(value.into()));
        self
    }

    /// Add a filter that may be absent; absent filters are omitted from the request.
    pub fn with_optional_filter(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.filters.insert(key.into(), value);
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            direction,
        });
        self
    }

    /// Filters that will actually be sent, in key order.
    pub fn active_filters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.filters.iter().filter_map(|(key, value)| {
            let value = value.as_deref()?.trim();
            if value.is_empty() {
                None
            } else {
                Some((key.as_str(), value))
            }
        })
    }

    /// Derive one query per value of `param`, e.g. one expense query per year.
    ///
    /// The derived queries keep the order of `values`.
    pub fn fan_out(&self, param: &str, values: &[String]) -> Vec<Query> {
        values
            .iter()
            .map(|value| self.clone().with_filter(param, value.clone()))
            .collect()
    }
}

/// Continuation signal extracted from a page's `links` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Continuation {
    /// A `rel = "next"` link is present.
    More,
    /// A links list is present but has no `next` entry.
    Last,
    /// The response carried no links list at all.
    Unknown,
}

/// One page of records from one HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based page number.
    pub number: usize,
    pub records: Vec<Record>,
    pub continuation: Continuation,
}

/// Why pagination stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The upstream returned a page with no records.
    EmptyPage,
    /// The last page carried no `next` link.
    NoNextPage,
    /// The page ceiling was reached; more data may exist upstream.
    PageCeiling,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EmptyPage => write!(f, "empty page"),
            StopReason::NoNextPage => write!(f, "no next page"),
            StopReason::PageCeiling => write!(f, "page ceiling"),
        }
    }
}

/// All records fetched for one logical query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    pub endpoint: String,
    /// Records in page order, within-page order preserved.
    pub records: Vec<Record>,
    /// Number of non-empty pages appended.
    pub pages: usize,
    pub stop: StopReason,
}

impl FetchResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Bucket a record falls into during aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum GroupKey {
    Known(String),
    /// The key field was missing, null or blank.
    Unknown,
}

impl GroupKey {
    pub fn known(value: impl Into<String>) -> Self {
        GroupKey::Known(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GroupKey::Known(value) => Some(value),
            GroupKey::Unknown => None,
        }
    }
}

impl From<Option<String>> for GroupKey {
    fn from(value: Option<String>) -> Self {
        value.map_or(GroupKey::Unknown, GroupKey::Known)
    }
}

impl From<GroupKey> for Option<String> {
    fn from(key: GroupKey) -> Self {
        match key {
            GroupKey::Known(value) => Some(value),
            GroupKey::Unknown => None,
        }
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (GroupKey::Known(a), GroupKey::Known(b)) => a.cmp(b),
            (GroupKey::Known(_), GroupKey::Unknown) => Ordering::Less,
            (GroupKey::Unknown, GroupKey::Known(_)) => Ordering::Greater,
            (GroupKey::Unknown, GroupKey::Unknown) => Ordering::Equal,
        }
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Known(value) => write!(f, "{}", value),
            GroupKey::Unknown => write!(f, "(unknown)"),
        }
    }
}

/// Aggregated value of one summary row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Count(usize),
    Sum(f64),
}

impl Metric {
    pub fn count(&self) -> Option<usize> {
        match self {
            Metric::Count(n) => Some(*n),
            Metric::Sum(_) => None,
        }
    }

    pub fn sum(&self) -> Option<f64> {
        match self {
            Metric::Sum(v) => Some(*v),
            Metric::Count(_) => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Count(n) => write!(f, "{}", n),
            Metric::Sum(v) => write!(f, "{:.2}", v),
        }
    }
}

/// One aggregated output row; unique per key within a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub key: GroupKey,
    pub metric: Metric,
    /// Records that fell into this group.
    pub records: usize,
    /// Records whose value field was missing or not a number.
    pub degraded: usize,
}

/// Overall sum of one value field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Total {
    pub sum: f64,
    pub records: usize,
    pub degraded: usize,
}

/// A titled summary table in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub key_field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_field: Option<String>,
    pub rows: Vec<SummaryRow>,
    /// Rows dropped by the `top` limit.
    pub omitted: usize,
}

impl SummaryTable {
    /// Keep at most `top` rows (`None` keeps all).
    pub fn new(
        key_field: &str,
        value_field: Option<&str>,
        mut rows: Vec<SummaryRow>,
        top: Option<usize>,
    ) -> Self {
        let mut omitted = 0;
        if let Some(limit) = top {
            if rows.len() > limit {
                omitted = rows.len() - limit;
                rows.truncate(limit);
            }
        }
        Self {
            key_field: key_field.to_string(),
            value_field: value_field.map(String::from),
            rows,
            omitted,
        }
    }

    pub fn degraded(&self) -> usize {
        self.rows.iter().map(|r| r.degraded).sum()
    }
}

/// Outcome of one query in a (possibly fanned-out) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    /// Fan-out value, or the endpoint for a single query.
    pub label: String,
    pub records: usize,
    pub pages: usize,
    pub stop: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<Total>,
}

/// Metadata about a report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub base_url: String,
    pub endpoint: String,
    /// Filters actually sent.
    pub filters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_out: Option<String>,
    pub pages_fetched: usize,
    pub records_fetched: usize,
    pub generated_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// The complete digest report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub queries: Vec<QueryOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<SummaryTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sums: Option<SummaryTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<Total>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<Record>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_key_ordering() {
        assert!(GroupKey::known("RJ") < GroupKey::known("SP"));
        assert!(GroupKey::known("ZZ") < GroupKey::Unknown);
        assert_eq!(GroupKey::Unknown.cmp(&GroupKey::Unknown), Ordering::Equal);
    }

    #[test]
    fn test_group_key_serializes_unknown_as_null() {
        let json = serde_json::to_string(&vec![GroupKey::known("SP"), GroupKey::Unknown]).unwrap();
        assert_eq!(json, r#"["SP",null]"#);

        let back: Vec<GroupKey> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![GroupKey::known("SP"), GroupKey::Unknown]);
    }

    #[test]
    fn test_active_filters_skip_absent_and_blank() {
        let query = Query::new("deputados")
            .with_filter("siglaUf", "SP")
            .with_optional_filter("siglaPartido", None)
            .with_filter("nome", "   ")
            .with_optional_filter("idLegislatura", Some("57".to_string()));

        let active: Vec<_> = query.active_filters().collect();
        assert_eq!(active, vec![("idLegislatura", "57"), ("siglaUf", "SP")]);
    }

    #[test]
    fn test_fan_out_keeps_value_order() {
        let base = Query::new("deputados/204554/despesas").with_sort("dataDocumento", SortDirection::Desc);
        let years: Vec<String> = vec!["2023".into(), "2021".into(), "2022".into()];

        let queries = base.fan_out("ano", &years);
        let values: Vec<_> = queries
            .iter()
            .map(|q| q.filters.get("ano").cloned().flatten().unwrap())
            .collect();

        assert_eq!(values, years);
        assert!(queries.iter().all(|q| q.sort == base.sort));
    }

    #[test]
    fn test_summary_table_top_limit() {
        let rows: Vec<SummaryRow> = ["A", "B", "C"]
            .iter()
            .map(|k| SummaryRow {
                key: GroupKey::known(*k),
                metric: Metric::Count(1),
                records: 1,
                degraded: 0,
            })
            .collect();

        let table = SummaryTable::new("uf", None, rows.clone(), Some(2));
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.omitted, 1);

        let table = SummaryTable::new("uf", None, rows, None);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.omitted, 0);
    }

    #[test]
    fn test_metric_display() {
        assert_eq!(Metric::Count(3).to_string(), "3");
        assert_eq!(Metric::Sum(15.5).to_string(), "15.50");
        assert_eq!(Metric::Sum(15.5).count(), None);
    }
}
