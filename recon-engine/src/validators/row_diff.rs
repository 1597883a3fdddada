//! Row-diff validator
//!
//! Fetches a bounded result from both systems and compares it row by row.
//! With key columns, rows are paired by key; without, results are compared
//! as ordered sequences and, failing that, as multisets so that a pure
//! ordering difference is told apart from a data difference.

use async_trait::async_trait;
use recon_core::domain::step::DifferenceType;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::{StepContext, Validator, Verdict, canonical, display_canonical, parse_config, percentage, require_non_empty};
use crate::error::ValidationError;
use crate::pool::RowSet;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RowDiffConfig {
    pub query: String,
    #[serde(default)]
    pub target_query: Option<String>,
    /// Columns identifying a row; empty means compare in result order
    #[serde(default)]
    pub key_columns: Vec<String>,
    #[serde(default)]
    pub row_cap: Option<usize>,
    #[serde(default)]
    pub sample_size: Option<usize>,
}

pub struct RowDiffValidator;

#[async_trait]
impl Validator for RowDiffValidator {
    fn check_config(&self, config: &Value) -> Result<(), String> {
        let config: RowDiffConfig = parse_config(config)?;
        require_non_empty("query", &config.query)?;
        if config.row_cap == Some(0) {
            return Err("row_cap must be greater than 0".to_string());
        }
        for key in &config.key_columns {
            require_non_empty("key_columns entry", key)?;
        }
        Ok(())
    }

    async fn validate(&self, ctx: &StepContext) -> Result<Verdict, ValidationError> {
        let config: RowDiffConfig = ctx.config()?;
        let target_query = config.target_query.as_deref().unwrap_or(&config.query);
        let row_cap = config.row_cap.unwrap_or(ctx.row_cap);
        let sample_size = config.sample_size.unwrap_or(ctx.sample_size);

        let (source, target) = ctx.fetch_both(&config.query, target_query, Some(row_cap)).await?;
        diff_rows(&source, &target, &config.key_columns, sample_size)
    }
}

type CanonicalRow = Vec<String>;

/// Accumulates the outcome of a pairing pass
#[derive(Default)]
struct Diff {
    matched: u64,
    missing_in_target: u64,
    missing_in_source: u64,
    value_mismatches: u64,
    affected: BTreeSet<usize>,
    samples: Vec<Value>,
}

impl Diff {
    fn differing(&self) -> u64 {
        self.missing_in_target + self.missing_in_source + self.value_mismatches
    }

    fn sample(&mut self, limit: usize, sample: impl FnOnce() -> Value) {
        if self.samples.len() < limit {
            self.samples.push(sample());
        }
    }
}

pub(crate) fn diff_rows(
    source: &RowSet,
    target: &RowSet,
    key_columns: &[String],
    sample_size: usize,
) -> Result<Verdict, ValidationError> {
    for (side, rows) in [("source", source), ("target", target)] {
        if let Some(name) = duplicate_column(&rows.columns) {
            return Err(ValidationError::Config(format!(
                "{} result has more than one column named '{}'; alias the columns so names are unique",
                side, name
            )));
        }
    }

    let (source_len, target_len) = (source.len() as u64, target.len() as u64);
    let truncated = source.truncated || target.truncated;

    if source.is_empty() && target.is_empty() {
        return Ok(Verdict::passed(100.0).with_counts(0, 0).with_comparison(json!({
            "differing_rows_count": 0,
            "truncated": truncated,
        })));
    }

    let columns = if source.columns.is_empty() { &target.columns } else { &source.columns };

    // Pair target columns with source columns by name; an empty side has nothing to align
    let (missing_in_target, missing_in_source) = column_differences(source, target);
    if !missing_in_target.is_empty() || !missing_in_source.is_empty() {
        let affected = missing_in_target.iter().chain(&missing_in_source).cloned().collect();
        return Ok(Verdict::failed(DifferenceType::ShapeMismatch, 0.0)
            .with_counts(source_len, target_len)
            .with_affected_columns(affected)
            .with_comparison(json!({
                "missing_columns_in_target": missing_in_target,
                "missing_columns_in_source": missing_in_source,
                "differing_rows_count": source_len.max(target_len),
                "truncated": truncated,
            })));
    }

    let source_rows: Vec<CanonicalRow> = source
        .rows
        .iter()
        .map(|r| r.iter().enumerate().map(|(i, v)| canonical(v, source.is_numeric(i))).collect())
        .collect();
    let target_rows = aligned_rows(columns, target);

    let (diff, total, duplicate_keys, verdict_kind) = if key_columns.is_empty() {
        let (diff, kind) = diff_unkeyed(columns, &source_rows, &target_rows, sample_size);
        (diff, source_len.max(target_len), 0, kind)
    } else {
        let key_idx = key_columns
            .iter()
            .map(|key| {
                columns
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(key))
                    .ok_or_else(|| ValidationError::Config(format!("key column '{}' is not in the result", key)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let (diff, total, duplicates) = diff_keyed(columns, &key_idx, &source_rows, &target_rows, sample_size);
        let kind = if diff.differing() == 0 && duplicates == 0 {
            DifferenceType::None
        } else {
            DifferenceType::DataMismatch
        };
        (diff, total, duplicates, kind)
    };

    let differing = diff.differing();
    let affected: Vec<String> = diff.affected.iter().filter_map(|i| columns.get(*i).cloned()).collect();

    let verdict = match verdict_kind {
        DifferenceType::None => Verdict::passed(100.0),
        DifferenceType::RowOrder => {
            let in_place = source_rows.iter().zip(&target_rows).filter(|(s, t)| s == t).count();
            Verdict::warning(DifferenceType::RowOrder, percentage(in_place as u64, source_len))
        }
        kind => Verdict::failed(kind, percentage(diff.matched, total)),
    };

    Ok(verdict
        .with_counts(source_len, target_len)
        .with_affected_columns(affected)
        .with_comparison(json!({
            "key_columns": key_columns,
            "matched_rows": diff.matched,
            "differing_rows_count": differing,
            "missing_in_target": diff.missing_in_target,
            "missing_in_source": diff.missing_in_source,
            "value_mismatches": diff.value_mismatches,
            "duplicate_keys": duplicate_keys,
            "truncated": truncated,
            "samples": diff.samples,
        })))
}

fn duplicate_column(columns: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    columns
        .iter()
        .find(|c| !seen.insert(c.to_ascii_lowercase()))
        .map(String::as_str)
}

fn column_differences(source: &RowSet, target: &RowSet) -> (Vec<String>, Vec<String>) {
    if source.columns.is_empty() || target.columns.is_empty() {
        return (Vec::new(), Vec::new());
    }
    (absent_from(&source.columns, &target.columns), absent_from(&target.columns, &source.columns))
}

/// Names in `names` with no case-insensitive counterpart in `other`
fn absent_from(names: &[String], other: &[String]) -> Vec<String> {
    names
        .iter()
        .filter(|name| !other.iter().any(|o| o.eq_ignore_ascii_case(name)))
        .cloned()
        .collect()
}

/// Target rows with their cells reordered into the reference column order
fn aligned_rows(columns: &[String], target: &RowSet) -> Vec<CanonicalRow> {
    let order: Option<Vec<usize>> = (!target.columns.is_empty()).then(|| {
        columns
            .iter()
            .filter_map(|c| target.columns.iter().position(|t| t.eq_ignore_ascii_case(c)))
            .collect()
    });

    target
        .rows
        .iter()
        .map(|row| match &order {
            Some(order) => order
                .iter()
                .map(|i| row.get(*i).map(|v| canonical(v, target.is_numeric(*i))).unwrap_or_default())
                .collect(),
            None => row.iter().enumerate().map(|(i, v)| canonical(v, target.is_numeric(i))).collect(),
        })
        .collect()
}

fn diff_keyed(
    columns: &[String],
    key_idx: &[usize],
    source: &[CanonicalRow],
    target: &[CanonicalRow],
    sample_size: usize,
) -> (Diff, u64, u64) {
    let mut duplicates = 0u64;
    let source_map = index_by_key(source, key_idx, &mut duplicates);
    let target_map = index_by_key(target, key_idx, &mut duplicates);

    let key_object = |key: &CanonicalRow| -> Value {
        let names: Vec<String> = key_idx.iter().map(|i| columns.get(*i).cloned().unwrap_or_default()).collect();
        row_object(&names, key)
    };

    let mut diff = Diff::default();
    for (key, source_row) in &source_map {
        match target_map.get(key) {
            None => {
                diff.missing_in_target += 1;
                diff.sample(sample_size, || {
                    json!({"kind": "missing_in_target", "key": key_object(key), "source": row_object(columns, source_row)})
                });
            }
            Some(target_row) => {
                let differing: Vec<usize> = (0..source_row.len().max(target_row.len()))
                    .filter(|i| source_row.get(*i) != target_row.get(*i))
                    .collect();
                if differing.is_empty() {
                    diff.matched += 1;
                    continue;
                }
                diff.value_mismatches += 1;
                diff.affected.extend(differing.iter().copied());
                diff.sample(sample_size, || {
                    let names: Vec<&String> = differing.iter().filter_map(|i| columns.get(*i)).collect();
                    json!({
                        "kind": "value_mismatch",
                        "key": key_object(key),
                        "columns": names,
                        "source": row_object(columns, source_row),
                        "target": row_object(columns, target_row),
                    })
                });
            }
        }
    }

    let mut only_in_target = 0u64;
    for (key, target_row) in &target_map {
        if source_map.contains_key(key) {
            continue;
        }
        only_in_target += 1;
        diff.missing_in_source += 1;
        diff.sample(sample_size, || {
            json!({"kind": "missing_in_source", "key": key_object(key), "target": row_object(columns, target_row)})
        });
    }

    let total = source_map.len() as u64 + only_in_target;
    (diff, total, duplicates)
}

fn index_by_key<'a>(
    rows: &'a [CanonicalRow],
    key_idx: &[usize],
    duplicates: &mut u64,
) -> BTreeMap<CanonicalRow, &'a CanonicalRow> {
    let mut map = BTreeMap::new();
    for row in rows {
        let key: CanonicalRow = key_idx.iter().map(|i| row.get(*i).cloned().unwrap_or_default()).collect();
        if map.insert(key, row).is_some() {
            *duplicates += 1;
        }
    }
    map
}

fn diff_unkeyed(
    columns: &[String],
    source: &[CanonicalRow],
    target: &[CanonicalRow],
    sample_size: usize,
) -> (Diff, DifferenceType) {
    let mut diff = Diff::default();
    if source == target {
        diff.matched = source.len() as u64;
        return (diff, DifferenceType::None);
    }

    let mut remaining: HashMap<&CanonicalRow, usize> = HashMap::new();
    for row in target {
        *remaining.entry(row).or_default() += 1;
    }

    let mut unmatched_source = Vec::new();
    for row in source {
        match remaining.get_mut(row) {
            Some(n) if *n > 0 => {
                *n -= 1;
                diff.matched += 1;
            }
            _ => unmatched_source.push(row),
        }
    }

    let mut unmatched_target = Vec::new();
    for row in target {
        if let Some(n) = remaining.get_mut(row)
            && *n > 0
        {
            *n -= 1;
            unmatched_target.push(row);
        }
    }

    if unmatched_source.is_empty() && unmatched_target.is_empty() {
        diff.matched = source.len() as u64;
        return (diff, DifferenceType::RowOrder);
    }

    // Pair leftovers in sorted order to estimate which columns drifted
    unmatched_source.sort();
    unmatched_target.sort();
    for (s, t) in unmatched_source.iter().zip(&unmatched_target) {
        diff.affected
            .extend((0..s.len().max(t.len())).filter(|i| s.get(*i) != t.get(*i)));
    }

    diff.missing_in_target = unmatched_source.len() as u64;
    diff.missing_in_source = unmatched_target.len() as u64;
    for row in &unmatched_source {
        diff.sample(sample_size, || json!({"kind": "missing_in_target", "source": row_object(columns, row)}));
    }
    for row in &unmatched_target {
        diff.sample(sample_size, || json!({"kind": "missing_in_source", "target": row_object(columns, row)}));
    }

    (diff, DifferenceType::DataMismatch)
}

fn row_object(columns: &[String], row: &[String]) -> Value {
    let mut object = Map::new();
    for (idx, cell) in row.iter().enumerate() {
        let name = columns.get(idx).cloned().unwrap_or_else(|| format!("column_{}", idx + 1));
        object.insert(name, display_canonical(cell));
    }
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::domain::step::StepStatus;

    fn rows(columns: &[&str], data: Vec<Vec<Value>>) -> RowSet {
        RowSet::new(columns.iter().map(|c| c.to_string()).collect(), data)
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_identical_results_pass() {
        let source = rows(&["id", "name"], vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]]);
        let target = rows(&["ID", "NAME"], vec![vec![json!("1"), json!("a")], vec![json!(2), json!("b")]]);
        let verdict = diff_rows(&source, &target, &[], 10).unwrap();
        assert_eq!(verdict.status, StepStatus::Passed);
        assert_eq!(verdict.match_percentage, 100.0);
    }

    #[test]
    fn test_order_only_difference_without_key() {
        let source = rows(&["id"], vec![vec![json!(1)], vec![json!(2)], vec![json!(3)], vec![json!(4)]]);
        let target = rows(&["id"], vec![vec![json!(2)], vec![json!(1)], vec![json!(3)], vec![json!(4)]]);
        let verdict = diff_rows(&source, &target, &[], 10).unwrap();
        assert_eq!(verdict.status, StepStatus::Warning);
        assert_eq!(verdict.difference_type, DifferenceType::RowOrder);
        assert_eq!(verdict.match_percentage, 50.0);
    }

    #[test]
    fn test_order_is_irrelevant_with_key() {
        let source = rows(&["id"], vec![vec![json!(1)], vec![json!(2)]]);
        let target = rows(&["id"], vec![vec![json!(2)], vec![json!(1)]]);
        let verdict = diff_rows(&source, &target, &keys(&["id"]), 10).unwrap();
        assert_eq!(verdict.status, StepStatus::Passed);
    }

    #[test]
    fn test_keyed_value_and_missing_rows() {
        let source = rows(
            &["id", "amount"],
            vec![
                vec![json!(1), json!(10)],
                vec![json!(2), json!(20)],
                vec![json!(3), json!(30)],
                vec![json!(4), json!(40)],
            ],
        );
        let target = rows(
            &["id", "amount"],
            vec![vec![json!(1), json!(10)], vec![json!(2), json!(21)], vec![json!(3), json!(30)]],
        );
        let verdict = diff_rows(&source, &target, &keys(&["id"]), 1).unwrap();
        assert_eq!(verdict.status, StepStatus::Failed);
        assert_eq!(verdict.difference_type, DifferenceType::DataMismatch);
        assert_eq!(verdict.match_percentage, 50.0);
        assert_eq!(verdict.affected_columns, vec!["amount"]);
        assert_eq!(verdict.comparison["differing_rows_count"], json!(2));
        assert_eq!(verdict.comparison["samples"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_keys_fail() {
        let source = rows(&["id"], vec![vec![json!(1)], vec![json!(1)]]);
        let target = rows(&["id"], vec![vec![json!(1)]]);
        let verdict = diff_rows(&source, &target, &keys(&["id"]), 10).unwrap();
        assert_eq!(verdict.status, StepStatus::Failed);
        assert_eq!(verdict.comparison["duplicate_keys"], json!(1));
        assert!(verdict.match_percentage < 100.0);
    }

    #[test]
    fn test_unkeyed_data_mismatch() {
        let source = rows(&["id", "v"], vec![vec![json!(1), json!("x")], vec![json!(2), json!("y")]]);
        let target = rows(&["id", "v"], vec![vec![json!(1), json!("x")], vec![json!(2), json!("z")]]);
        let verdict = diff_rows(&source, &target, &[], 10).unwrap();
        assert_eq!(verdict.difference_type, DifferenceType::DataMismatch);
        assert_eq!(verdict.affected_columns, vec!["v"]);
        assert_eq!(verdict.match_percentage, 50.0);
    }

    #[test]
    fn test_unknown_key_column_is_a_config_error() {
        let source = rows(&["id"], vec![vec![json!(1)]]);
        let err = diff_rows(&source, &source, &keys(&["missing"]), 10).unwrap_err();
        assert!(matches!(err, ValidationError::Config(_)));
    }

    #[test]
    fn test_truncation_is_flagged_without_failing() {
        let mut source = rows(&["id"], vec![vec![json!(1)]]);
        source.truncated = true;
        let verdict = diff_rows(&source, &source.clone(), &[], 10).unwrap();
        assert_eq!(verdict.status, StepStatus::Passed);
        assert_eq!(verdict.comparison["truncated"], json!(true));
    }

    #[test]
    fn test_bigint_keys_stay_distinct() {
        let data = vec![
            vec![json!(9_007_199_254_740_992_i64), json!("a")],
            vec![json!(9_007_199_254_740_993_i64), json!("b")],
        ];
        let source = rows(&["id", "v"], data.clone());
        let target = rows(&["id", "v"], data);
        let verdict = diff_rows(&source, &target, &keys(&["id"]), 10).unwrap();
        assert_eq!(verdict.status, StepStatus::Passed);
        assert_eq!(verdict.comparison["duplicate_keys"], json!(0));
    }

    #[test]
    fn test_high_precision_decimals_differ() {
        let source = rows(&["id", "amount"], vec![vec![json!(1), json!("12345678901234567.89")]])
            .with_numeric_columns(&["amount"]);
        let target = rows(&["id", "amount"], vec![vec![json!(1), json!("12345678901234567.01")]])
            .with_numeric_columns(&["amount"]);
        let verdict = diff_rows(&source, &target, &keys(&["id"]), 10).unwrap();
        assert_eq!(verdict.status, StepStatus::Failed);
        assert_eq!(verdict.affected_columns, vec!["amount"]);

        let padded = rows(&["id", "amount"], vec![vec![json!(1), json!("12345678901234567.890")]])
            .with_numeric_columns(&["amount"]);
        let verdict = diff_rows(&source, &padded, &keys(&["id"]), 10).unwrap();
        assert_eq!(verdict.status, StepStatus::Passed);
    }

    #[test]
    fn test_leading_zeros_in_text_are_a_mismatch() {
        let source = rows(&["code"], vec![vec![json!("00123")]]);
        let target = rows(&["code"], vec![vec![json!("123")]]);
        let verdict = diff_rows(&source, &target, &[], 10).unwrap();
        assert_eq!(verdict.status, StepStatus::Failed);
        assert_eq!(verdict.difference_type, DifferenceType::DataMismatch);
        assert_eq!(verdict.affected_columns, vec!["code"]);
    }

    #[test]
    fn test_duplicate_column_names_are_rejected() {
        let source = rows(&["id", "ID"], vec![vec![json!(1), json!(2)]]);
        let target = rows(&["id", "name"], vec![vec![json!(1), json!("a")]]);
        let err = diff_rows(&source, &target, &keys(&["id"]), 10).unwrap_err();
        assert!(matches!(&err, ValidationError::Config(m) if m.contains("source result")));
        let err = diff_rows(&target, &source, &[], 10).unwrap_err();
        assert!(matches!(&err, ValidationError::Config(m) if m.contains("target result")));
    }

    #[test]
    fn test_missing_column_is_a_shape_mismatch() {
        let source = rows(&["id", "extra"], vec![vec![json!(1), json!(2)]]);
        let target = rows(&["id"], vec![vec![json!(1)]]);
        let verdict = diff_rows(&source, &target, &[], 10).unwrap();
        assert_eq!(verdict.difference_type, DifferenceType::ShapeMismatch);
        assert_eq!(verdict.affected_columns, vec!["extra"]);
    }
}
