//! Row-count validator
//!
//! Compares `COUNT(*)` of a table (optionally filtered) on both systems.

use async_trait::async_trait;
use recon_core::domain::step::DifferenceType;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{StepContext, Tolerance, Validator, Verdict, count_ratio, parse_config, require_non_empty};
use crate::error::ValidationError;
use crate::pool::RowSet;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RowCountConfig {
    pub source_table: String,
    /// Defaults to `source_table`; rewritten like any target-side name
    #[serde(default)]
    pub target_table: Option<String>,
    /// SQL predicate applied on both sides
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub tolerance: Option<Tolerance>,
}

impl RowCountConfig {
    fn query(&self, table: &str) -> String {
        match self.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            Some(filter) => format!("SELECT COUNT(*) FROM {} WHERE {}", table, filter),
            None => format!("SELECT COUNT(*) FROM {}", table),
        }
    }
}

pub struct RowCountValidator;

#[async_trait]
impl Validator for RowCountValidator {
    fn check_config(&self, config: &Value) -> Result<(), String> {
        let config: RowCountConfig = parse_config(config)?;
        require_non_empty("source_table", &config.source_table)?;
        if let Some(tolerance) = &config.tolerance {
            tolerance.check()?;
        }
        Ok(())
    }

    async fn validate(&self, ctx: &StepContext) -> Result<Verdict, ValidationError> {
        let config: RowCountConfig = ctx.config()?;
        let target_table = config.target_table.as_deref().unwrap_or(&config.source_table);

        let (source, target) = ctx
            .fetch_both(&config.query(&config.source_table), &config.query(target_table), None)
            .await?;
        let source_count = read_count(&source, "source")?;
        let target_count = read_count(&target, "target")?;

        Ok(compare_counts(source_count, target_count, config.tolerance.as_ref()))
    }
}

pub(crate) fn compare_counts(source: u64, target: u64, tolerance: Option<&Tolerance>) -> Verdict {
    let comparison = json!({
        "source_count": source,
        "target_count": target,
        "difference": target as i64 - source as i64,
        "tolerance": tolerance,
    });

    let verdict = if source == target {
        Verdict::passed(100.0)
    } else if super::within(tolerance, source as f64, target as f64) {
        Verdict::passed(count_ratio(source, target))
    } else {
        Verdict::failed(DifferenceType::CountMismatch, count_ratio(source, target))
    };

    verdict.with_counts(source, target).with_comparison(comparison)
}

fn read_count(rows: &RowSet, side: &str) -> Result<u64, ValidationError> {
    rows.first_value()
        .and_then(|value| super::as_decimal(value, true))
        .filter(|n| n.fract().is_zero())
        .and_then(|n| n.to_u64())
        .ok_or_else(|| {
            ValidationError::ResultShape(format!("{} count query did not return a single non-negative integer", side))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::domain::step::StepStatus;

    #[test]
    fn test_count_mismatch() {
        let verdict = compare_counts(1000, 985, None);
        assert_eq!(verdict.status, StepStatus::Failed);
        assert_eq!(verdict.difference_type, DifferenceType::CountMismatch);
        assert_eq!(verdict.match_percentage, 98.5);
        assert_eq!(verdict.comparison["difference"], json!(-15));
    }

    #[test]
    fn test_counts_within_tolerance_pass() {
        let tolerance = Tolerance::Relative { value: 0.02 };
        let verdict = compare_counts(1000, 985, Some(&tolerance));
        assert_eq!(verdict.status, StepStatus::Passed);
        assert_eq!(verdict.difference_type, DifferenceType::None);
        assert_eq!(verdict.match_percentage, 98.5);
    }

    #[test]
    fn test_both_empty_is_a_match() {
        let verdict = compare_counts(0, 0, None);
        assert_eq!(verdict.status, StepStatus::Passed);
        assert_eq!(verdict.match_percentage, 100.0);
    }

    #[test]
    fn test_read_count_is_exact() {
        let big = RowSet::scalar("count", 9_007_199_254_740_993_u64);
        assert_eq!(read_count(&big, "source").unwrap(), 9_007_199_254_740_993);
        assert_eq!(read_count(&RowSet::scalar("count", "42"), "source").unwrap(), 42);
        assert!(read_count(&RowSet::scalar("count", -1), "source").is_err());
        assert!(read_count(&RowSet::scalar("count", 1.5), "source").is_err());
        assert!(read_count(&RowSet::default(), "target").is_err());
    }

    #[test]
    fn test_query_text() {
        let config: RowCountConfig = serde_json::from_value(json!({
            "source_table": "SALES.ORDERS",
            "filter": "status = 'open'"
        }))
        .unwrap();
        assert_eq!(
            config.query("SALES.ORDERS"),
            "SELECT COUNT(*) FROM SALES.ORDERS WHERE status = 'open'"
        );
    }

    #[test]
    fn test_check_config_rejects_missing_table() {
        assert!(RowCountValidator.check_config(&json!({})).is_err());
        assert!(RowCountValidator.check_config(&json!({"source_table": " "})).is_err());
        assert!(RowCountValidator.check_config(&json!({"source_table": "T"})).is_ok());
    }
}
