//! Record aggregation and summary statistics.
//!
//! This module groups fetched records by a key field and computes counts or
//! sums per group. Output ordering is fully deterministic: metric
//! descending, then key ascending.
//!
//! Sums are accumulated as exact decimals, so `"10.10" + "20.20"` ties with
//! `"30.30"` and the result does not depend on record order.

use crate::error::{Error, Result};
use crate::models::{GroupKey, Metric, Record, SummaryRow, Total};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

/// Count records per distinct value of `key_field`.
pub fn group_count(records: &[Record], key_field: &str) -> Result<Vec<SummaryRow>> {
    check_field(key_field)?;

    let mut grouped: HashMap<GroupKey, usize> = HashMap::new();
    for record in records {
        *grouped.entry(key_of(record, key_field)).or_default() += 1;
    }

    let mut rows: Vec<SummaryRow> = grouped
        .into_iter()
        .map(|(key, count)| SummaryRow {
            key,
            metric: Metric::Count(count),
            records: count,
            degraded: 0,
        })
        .collect();

    rows.sort_by(|a, b| b.records.cmp(&a.records).then_with(|| a.key.cmp(&b.key)));
    Ok(rows)
}

/// Sum `value_field` per distinct value of `key_field`.
///
/// Missing or non-numeric values add 0 and are counted in the row's
/// `degraded` tally; they never abort the aggregation.
pub fn group_sum(records: &[Record], key_field: &str, value_field: &str) -> Result<Vec<SummaryRow>> {
    check_field(key_field)?;
    check_field(value_field)?;

    let mut grouped: HashMap<GroupKey, Tally> = HashMap::new();
    for record in records {
        grouped
            .entry(key_of(record, key_field))
            .or_default()
            .add(lookup(record, value_field));
    }

    let mut rows: Vec<(GroupKey, Tally)> = grouped.into_iter().collect();
    rows.sort_by(|a, b| b.1.sum.cmp(&a.1.sum).then_with(|| a.0.cmp(&b.0)));

    Ok(rows
        .into_iter()
        .map(|(key, tally)| {
            let total = tally.into_total();
            SummaryRow {
                key,
                metric: Metric::Sum(total.sum),
                records: total.records,
                degraded: total.degraded,
            }
        })
        .collect())
}

/// Overall sum of `value_field` across all records.
pub fn total(records: &[Record], value_field: &str) -> Result<Total> {
    check_field(value_field)?;

    let mut tally = Tally::default();
    for record in records {
        tally.add(lookup(record, value_field));
    }
    Ok(tally.into_total())
}

/// The group a record belongs to under `key_field`.
///
/// Null, missing and blank values all map to [`GroupKey::Unknown`].
pub fn key_of(record: &Record, key_field: &str) -> GroupKey {
    match lookup(record, key_field) {
        None | Some(Value::Null) => GroupKey::Unknown,
        Some(Value::String(s)) if s.trim().is_empty() => GroupKey::Unknown,
        Some(Value::String(s)) => GroupKey::Known(s.clone()),
        Some(other) => GroupKey::Known(other.to_string()),
    }
}

/// Look up a field, following dots into nested objects (`ultimoStatus.siglaUf`).
///
/// A top-level field whose name contains a dot wins over the nested path.
pub fn lookup<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(field) {
        return Some(value);
    }

    let mut parts = field.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Parse a JSON number or a numeric string into an exact decimal.
///
/// Returns `None` for anything else, including `NaN`, infinities and values
/// outside the decimal range.
pub fn parse_number(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s.trim()),
        _ => None,
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Running sum of one group.
#[derive(Debug, Default)]
struct Tally {
    sum: Decimal,
    records: usize,
    degraded: usize,
}

impl Tally {
    fn add(&mut self, value: Option<&Value>) {
        self.records += 1;
        match parse_number(value).and_then(|v| self.sum.checked_add(v)) {
            Some(sum) => self.sum = sum,
            None => self.degraded += 1,
        }
    }

    fn into_total(self) -> Total {
        Total {
            sum: self.sum.to_f64().unwrap_or_default(),
            records: self.records,
            degraded: self.degraded,
        }
    }
}

fn check_field(field: &str) -> Result<()> {
    if field.trim().is_empty() {
        Err(Error::InvalidKeyField)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Vec<Value>) -> Vec<Record> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn pairs(rows: &[SummaryRow]) -> Vec<(String, String)> {
        rows.iter()
            .map(|r| (r.key.to_string(), r.metric.to_string()))
            .collect()
    }

    #[test]
    fn test_group_count_by_state() {
        let input = records(vec![
            json!({"uf": "SP"}),
            json!({"uf": "SP"}),
            json!({"uf": "RJ"}),
        ]);

        let rows = group_count(&input, "uf").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, GroupKey::known("SP"));
        assert_eq!(rows[0].metric, Metric::Count(2));
        assert_eq!(rows[1].key, GroupKey::known("RJ"));
        assert_eq!(rows[1].metric, Metric::Count(1));
    }

    #[test]
    fn test_group_count_tie_break_is_lexicographic() {
        let input = records(vec![
            json!({"partido": "PT"}),
            json!({"partido": "MDB"}),
            json!({"partido": "PL"}),
            json!({"partido": "PL"}),
            json!({"partido": "NOVO"}),
        ]);

        let rows = group_count(&input, "partido").unwrap();
        assert_eq!(
            pairs(&rows),
            vec![
                ("PL".to_string(), "2".to_string()),
                ("MDB".to_string(), "1".to_string()),
                ("NOVO".to_string(), "1".to_string()),
                ("PT".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_keys_go_to_unknown_bucket() {
        let input = records(vec![
            json!({"uf": "SP"}),
            json!({"nome": "sem uf"}),
            json!({"uf": null}),
            json!({"uf": "  "}),
        ]);

        let rows = group_count(&input, "uf").unwrap();

        assert_eq!(rows[0].key, GroupKey::Unknown);
        assert_eq!(rows[0].metric, Metric::Count(3));
        assert_eq!(rows[1].key, GroupKey::known("SP"));
        let total: usize = rows.iter().map(|r| r.records).sum();
        assert_eq!(total, input.len());
    }

    #[test]
    fn test_unknown_sorts_after_known_on_ties() {
        let input = records(vec![json!({}), json!({"uf": "AC"})]);
        let rows = group_count(&input, "uf").unwrap();
        assert_eq!(rows[0].key, GroupKey::known("AC"));
        assert_eq!(rows[1].key, GroupKey::Unknown);
    }

    #[test]
    fn test_group_count_is_idempotent() {
        let input = records(vec![
            json!({"uf": "MG", "id": 1}),
            json!({"uf": "BA", "id": 2}),
            json!({"uf": "MG", "id": 3}),
        ]);
        let before = input.clone();

        let first = group_count(&input, "uf").unwrap();
        let second = group_count(&input, "uf").unwrap();

        assert_eq!(first, second);
        assert_eq!(input, before);
    }

    #[test]
    fn test_group_sum_degrades_bad_values() {
        let input = records(vec![
            json!({"tipoDespesa": "COMBUSTÍVEIS", "valorLiquido": "10.50"}),
            json!({"tipoDespesa": "COMBUSTÍVEIS", "valorLiquido": "bad"}),
            json!({"tipoDespesa": "COMBUSTÍVEIS", "valorLiquido": null}),
            json!({"tipoDespesa": "COMBUSTÍVEIS", "valorLiquido": "5.00"}),
        ]);

        let rows = group_sum(&input, "tipoDespesa", "valorLiquido").unwrap();

        assert_eq!(rows.len(), 1);
        let sum = rows[0].metric.sum().unwrap();
        assert!((sum - 15.50).abs() < 1e-9);
        assert_eq!(rows[0].records, 4);
        assert_eq!(rows[0].degraded, 2);
    }

    #[test]
    fn test_group_sum_ordering() {
        let input = records(vec![
            json!({"tipo": "TELEFONIA", "valor": 30.0}),
            json!({"tipo": "PASSAGEM", "valor": 120.25}),
            json!({"tipo": "CORREIOS", "valor": "30"}),
            json!({"tipo": "PASSAGEM", "valor": 9.75}),
        ]);

        let rows = group_sum(&input, "tipo", "valor").unwrap();
        assert_eq!(
            pairs(&rows),
            vec![
                ("PASSAGEM".to_string(), "130.00".to_string()),
                ("CORREIOS".to_string(), "30.00".to_string()),
                ("TELEFONIA".to_string(), "30.00".to_string()),
            ]
        );
        assert!(rows.iter().all(|r| r.degraded == 0));
    }

    #[test]
    fn test_nested_and_numeric_keys() {
        let input = records(vec![
            json!({"ultimoStatus": {"siglaUf": "PE"}, "ano": 2023}),
            json!({"ultimoStatus": {"siglaUf": "PE"}, "ano": 2024}),
            json!({"ultimoStatus": {}, "ano": 2024}),
        ]);

        let by_state = group_count(&input, "ultimoStatus.siglaUf").unwrap();
        assert_eq!(by_state[0].key, GroupKey::known("PE"));
        assert_eq!(by_state[1].key, GroupKey::Unknown);

        let by_year = group_count(&input, "ano").unwrap();
        assert_eq!(by_year[0].key, GroupKey::known("2024"));
        assert_eq!(by_year[0].records, 2);
    }

    #[test]
    fn test_empty_input_and_invalid_field() {
        assert!(group_count(&[], "uf").unwrap().is_empty());
        assert!(group_sum(&[], "uf", "valor").unwrap().is_empty());
        assert!(matches!(group_count(&[], ""), Err(Error::InvalidKeyField)));
        assert!(matches!(
            group_sum(&[], "uf", " "),
            Err(Error::InvalidKeyField)
        ));
    }

    #[test]
    fn test_total() {
        let input = records(vec![
            json!({"valorLiquido": 100.0}),
            json!({"valorLiquido": "23.45"}),
            json!({"valorLiquido": "n/a"}),
        ]);

        let t = total(&input, "valorLiquido").unwrap();
        assert!((t.sum - 123.45).abs() < 1e-9);
        assert_eq!(t.records, 3);
        assert_eq!(t.degraded, 1);
    }

    #[test]
    fn test_equal_decimal_sums_tie_on_key() {
        let input = records(vec![
            json!({"k": "B", "v": "30.30"}),
            json!({"k": "A", "v": "10.10"}),
            json!({"k": "A", "v": "20.20"}),
        ]);

        let rows = group_sum(&input, "k", "v").unwrap();
        assert_eq!(rows[0].key, GroupKey::known("A"));
        assert_eq!(rows[1].key, GroupKey::known("B"));
        assert_eq!(rows[0].metric, rows[1].metric);
    }

    #[test]
    fn test_group_sum_ignores_record_order() {
        let forward = records(vec![
            json!({"k": "X", "v": 0.1}),
            json!({"k": "X", "v": 0.2}),
            json!({"k": "X", "v": 0.3}),
            json!({"k": "W", "v": 0.6}),
        ]);
        let backward = records(vec![
            json!({"k": "W", "v": 0.6}),
            json!({"k": "X", "v": 0.3}),
            json!({"k": "X", "v": 0.2}),
            json!({"k": "X", "v": 0.1}),
        ]);

        let a = group_sum(&forward, "k", "v").unwrap();
        let b = group_sum(&backward, "k", "v").unwrap();

        assert_eq!(a, b);
        assert_eq!(a[0].key, GroupKey::known("W"));
        assert_eq!(a[1].key, GroupKey::known("X"));
        assert_eq!(a[1].metric, Metric::Sum(0.6));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(Some(&json!(" 7.5 "))), Some(Decimal::new(75, 1)));
        assert_eq!(parse_number(Some(&json!(3))), Some(Decimal::from(3)));
        assert_eq!(parse_number(Some(&json!("1e3"))), Some(Decimal::from(1000)));
        assert_eq!(parse_number(Some(&json!("NaN"))), None);
        assert_eq!(parse_number(Some(&json!("inf"))), None);
        assert_eq!(parse_number(Some(&json!(true))), None);
        assert_eq!(parse_number(None), None);
    }
}
