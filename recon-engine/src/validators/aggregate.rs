//! Aggregate validator
//!
//! Runs an aggregate query (sums, min/max, distinct counts) on both systems
//! and compares the first result row column by column.

use async_trait::async_trait;
use recon_core::domain::step::DifferenceType;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{StepContext, Tolerance, Validator, Verdict, as_decimal, canonical, parse_config, percentage, require_non_empty};
use crate::error::ValidationError;
use crate::pool::RowSet;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregateConfig {
    pub query: String,
    /// Defaults to `query`; rewritten before execution either way
    #[serde(default)]
    pub target_query: Option<String>,
    #[serde(default)]
    pub tolerance: Option<Tolerance>,
}

pub struct AggregateValidator;

#[async_trait]
impl Validator for AggregateValidator {
    fn check_config(&self, config: &Value) -> Result<(), String> {
        let config: AggregateConfig = parse_config(config)?;
        require_non_empty("query", &config.query)?;
        if let Some(tolerance) = &config.tolerance {
            tolerance.check()?;
        }
        Ok(())
    }

    async fn validate(&self, ctx: &StepContext) -> Result<Verdict, ValidationError> {
        let config: AggregateConfig = ctx.config()?;
        let target_query = config.target_query.as_deref().unwrap_or(&config.query);

        let (source, target) = ctx.fetch_both(&config.query, target_query, Some(1)).await?;
        Ok(compare_aggregates(&source, &target, config.tolerance.as_ref()))
    }
}

pub(crate) fn compare_aggregates(source: &RowSet, target: &RowSet, tolerance: Option<&Tolerance>) -> Verdict {
    let (source_row, target_row) = match (source.rows.first(), target.rows.first()) {
        (None, None) => {
            return Verdict::passed(100.0).with_comparison(json!({ "columns": [], "empty": true }));
        }
        (Some(s), Some(t)) => (s, t),
        (s, t) => {
            return Verdict::failed(DifferenceType::DataMismatch, 0.0).with_comparison(json!({
                "source_empty": s.is_none(),
                "target_empty": t.is_none(),
            }));
        }
    };

    if source_row.len() != target_row.len() {
        return Verdict::failed(DifferenceType::ShapeMismatch, 0.0).with_comparison(json!({
            "source_columns": source_row.len(),
            "target_columns": target_row.len(),
        }));
    }

    let mut details = Vec::with_capacity(source_row.len());
    let mut affected = Vec::new();
    let mut matched = 0u64;

    for (idx, (s, t)) in source_row.iter().zip(target_row).enumerate() {
        let column = source
            .columns
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("column_{}", idx + 1));

        let (equal, delta) = match (as_decimal(s, source.is_numeric(idx)), as_decimal(t, target.is_numeric(idx))) {
            (Some(a), Some(b)) => (
                a == b || within_tolerance(tolerance, a, b),
                b.checked_sub(a).map(|d| d.normalize().to_string()),
            ),
            _ => (canonical(s, source.is_numeric(idx)) == canonical(t, target.is_numeric(idx)), None),
        };

        if equal {
            matched += 1;
        } else {
            affected.push(column.clone());
        }
        details.push(json!({
            "column": column,
            "source": s,
            "target": t,
            "delta": delta,
            "matched": equal,
        }));
    }

    let match_pct = percentage(matched, source_row.len() as u64);
    let verdict = if affected.is_empty() {
        Verdict::passed(match_pct)
    } else {
        Verdict::failed(DifferenceType::DataMismatch, match_pct)
    };

    verdict
        .with_affected_columns(affected)
        .with_comparison(json!({ "columns": details, "tolerance": tolerance }))
}

/// Tolerance arithmetic runs in floating point; exact equality never does
fn within_tolerance(tolerance: Option<&Tolerance>, a: Decimal, b: Decimal) -> bool {
    match (tolerance, a.to_f64(), b.to_f64()) {
        (Some(tolerance), Some(a), Some(b)) => tolerance.allows(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::domain::step::StepStatus;

    fn row(columns: &[&str], values: Vec<Value>) -> RowSet {
        RowSet::new(columns.iter().map(|c| c.to_string()).collect(), vec![values])
    }

    #[test]
    fn test_matching_aggregates_pass() {
        let source = row(&["total", "region"], vec![json!("1250.50"), json!("EU")]).with_numeric_columns(&["total"]);
        let target = row(&["TOTAL", "REGION"], vec![json!(1250.5), json!("EU")]);
        let verdict = compare_aggregates(&source, &target, None);
        assert_eq!(verdict.status, StepStatus::Passed);
        assert_eq!(verdict.match_percentage, 100.0);
    }

    #[test]
    fn test_breach_outside_tolerance() {
        let source = row(&["total", "n"], vec![json!(1000.0), json!(10)]);
        let target = row(&["total", "n"], vec![json!(1000.5), json!(10)]);
        let tolerance = Tolerance::Absolute { value: 0.1 };
        let verdict = compare_aggregates(&source, &target, Some(&tolerance));
        assert_eq!(verdict.status, StepStatus::Failed);
        assert_eq!(verdict.difference_type, DifferenceType::DataMismatch);
        assert_eq!(verdict.affected_columns, vec!["total"]);
        assert_eq!(verdict.match_percentage, 50.0);
    }

    #[test]
    fn test_within_tolerance_passes() {
        let source = row(&["total"], vec![json!(1000.0)]);
        let target = row(&["total"], vec![json!(1000.05)]);
        let tolerance = Tolerance::Absolute { value: 0.1 };
        let verdict = compare_aggregates(&source, &target, Some(&tolerance));
        assert_eq!(verdict.status, StepStatus::Passed);
    }

    #[test]
    fn test_exact_comparison_keeps_full_precision() {
        let source = row(&["total"], vec![json!("12345678901234567.89")]).with_numeric_columns(&["total"]);
        let target = row(&["total"], vec![json!("12345678901234567.01")]).with_numeric_columns(&["total"]);
        let verdict = compare_aggregates(&source, &target, None);
        assert_eq!(verdict.status, StepStatus::Failed);
        assert_eq!(verdict.comparison["columns"][0]["delta"], json!("-0.88"));

        let tolerance = Tolerance::Absolute { value: 1.0 };
        let verdict = compare_aggregates(&source, &target, Some(&tolerance));
        assert_eq!(verdict.status, StepStatus::Passed);
    }

    #[test]
    fn test_non_numeric_mismatch_fails() {
        let source = row(&["max_code", "n"], vec![json!("00123"), json!(3)]);
        let target = row(&["max_code", "n"], vec![json!("123"), json!(3)]);
        let verdict = compare_aggregates(&source, &target, Some(&Tolerance::Absolute { value: 1000.0 }));
        assert_eq!(verdict.status, StepStatus::Failed);
        assert_eq!(verdict.difference_type, DifferenceType::DataMismatch);
        assert_eq!(verdict.affected_columns, vec!["max_code"]);
        assert_eq!(verdict.match_percentage, 50.0);
    }

    #[test]
    fn test_one_side_empty_fails() {
        let source = row(&["total"], vec![json!(1)]);
        let verdict = compare_aggregates(&source, &RowSet::default(), None);
        assert_eq!(verdict.status, StepStatus::Failed);
        assert_eq!(verdict.match_percentage, 0.0);
    }
}
