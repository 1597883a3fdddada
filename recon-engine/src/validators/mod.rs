//! Validators
//!
//! The closed set of comparison primitives. Each validator receives a
//! [`StepContext`] (its step, the run's connection pool and the schema
//! mapping) and returns a [`Verdict`], or a [`ValidationError`] when it
//! could not compare at all.
//!
//! Source queries are sent verbatim; target queries always go through the
//! schema rewriter first.

pub mod aggregate;
pub mod row_count;
pub mod row_diff;
pub mod schema_shape;

use async_trait::async_trait;
use recon_core::domain::mapping::{SchemaMapping, SystemId};
use recon_core::domain::pipeline::{Step, ValidatorType};
use recon_core::domain::step::{DifferenceType, StepResult, StepStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ValidationError;
use crate::pool::{ColumnSpec, ConnectionPool, RowSet};
use crate::rewriter;

pub use aggregate::AggregateValidator;
pub use row_count::RowCountValidator;
pub use row_diff::RowDiffValidator;
pub use schema_shape::SchemaShapeValidator;

/// Highest percentage a non-identical comparison may report
const BELOW_FULL_MATCH: f64 = 99.99;

#[async_trait]
pub trait Validator: Send + Sync {
    /// Checks a step's configuration without touching any system
    fn check_config(&self, config: &Value) -> Result<(), String>;

    async fn validate(&self, ctx: &StepContext) -> Result<Verdict, ValidationError>;
}

/// Resolves the implementation for a validator type
pub fn validator_for(kind: ValidatorType) -> &'static dyn Validator {
    match kind {
        ValidatorType::RowCount => &RowCountValidator,
        ValidatorType::SchemaShape => &SchemaShapeValidator,
        ValidatorType::Aggregate => &AggregateValidator,
        ValidatorType::RowDiff => &RowDiffValidator,
    }
}

// ============================================================================
// Step context
// ============================================================================

/// Everything a validator may touch while executing one step
pub struct StepContext {
    pub step: Step,
    pub pool: Arc<ConnectionPool>,
    pub mapping: Arc<SchemaMapping>,
    pub timeout: Duration,
    /// Row cap for steps that do not configure one
    pub row_cap: usize,
    /// Sample size for steps that do not configure one
    pub sample_size: usize,
}

impl StepContext {
    /// Deserializes the step's validator configuration
    pub fn config<T: DeserializeOwned>(&self) -> Result<T, ValidationError> {
        parse_config(&self.step.config).map_err(ValidationError::Config)
    }

    /// Query text as it will be sent to the target
    pub fn for_target(&self, query: &str) -> String {
        rewriter::rewrite(query, &self.mapping, SystemId::Target)
    }

    /// Runs a query pair, the target side rewritten, both bounded by the step timeout
    pub async fn fetch_both(
        &self,
        source_query: &str,
        target_query: &str,
        row_cap: Option<usize>,
    ) -> Result<(RowSet, RowSet), ValidationError> {
        let target_query = self.for_target(target_query);
        let (source, target) = tokio::try_join!(
            self.pool
                .execute(SystemId::Source, source_query, self.timeout, row_cap),
            self.pool
                .execute(SystemId::Target, &target_query, self.timeout, row_cap),
        )?;
        Ok((source, target))
    }

    /// Introspects a table pair, the target name rewritten
    pub async fn describe_both(
        &self,
        source_table: &str,
        target_table: &str,
    ) -> Result<(Vec<ColumnSpec>, Vec<ColumnSpec>), ValidationError> {
        let target_table = rewriter::rewrite_table(target_table, &self.mapping, SystemId::Target);
        let (source, target) = tokio::try_join!(
            self.pool
                .describe_schema(SystemId::Source, source_table, self.timeout),
            self.pool
                .describe_schema(SystemId::Target, &target_table, self.timeout),
        )?;
        Ok((source, target))
    }
}

pub(crate) fn parse_config<T: DeserializeOwned>(config: &Value) -> Result<T, String> {
    serde_json::from_value(config.clone()).map_err(|e| format!("invalid config: {}", e))
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    Ok(())
}

// ============================================================================
// Verdict
// ============================================================================

/// Comparison outcome produced by a validator
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: StepStatus,
    pub difference_type: DifferenceType,
    pub source_row_count: Option<u64>,
    pub target_row_count: Option<u64>,
    pub match_percentage: f64,
    pub affected_columns: Vec<String>,
    pub comparison: Value,
}

impl Verdict {
    /// Builds a verdict, keeping the percentage below 100 for anything but a pass
    pub fn new(status: StepStatus, difference_type: DifferenceType, match_percentage: f64) -> Self {
        debug_assert!(
            difference_type == DifferenceType::None || status != StepStatus::Passed,
            "a passed verdict cannot carry a difference"
        );
        let match_percentage = match status {
            StepStatus::Passed => match_percentage.clamp(0.0, 100.0),
            _ => match_percentage.clamp(0.0, BELOW_FULL_MATCH),
        };
        Self {
            status,
            difference_type,
            source_row_count: None,
            target_row_count: None,
            match_percentage,
            affected_columns: Vec::new(),
            comparison: Value::Null,
        }
    }

    pub fn passed(match_percentage: f64) -> Self {
        Self::new(StepStatus::Passed, DifferenceType::None, match_percentage)
    }

    pub fn failed(difference_type: DifferenceType, match_percentage: f64) -> Self {
        Self::new(StepStatus::Failed, difference_type, match_percentage)
    }

    pub fn warning(difference_type: DifferenceType, match_percentage: f64) -> Self {
        Self::new(StepStatus::Warning, difference_type, match_percentage)
    }

    pub fn with_counts(mut self, source: u64, target: u64) -> Self {
        self.source_row_count = Some(source);
        self.target_row_count = Some(target);
        self
    }

    pub fn with_affected_columns(mut self, columns: Vec<String>) -> Self {
        self.affected_columns = columns;
        self
    }

    pub fn with_comparison(mut self, comparison: Value) -> Self {
        self.comparison = comparison;
        self
    }

    pub fn into_step_result(
        self,
        step: &Step,
        step_index: usize,
        started_at: chrono::DateTime<chrono::Utc>,
        duration_ms: u64,
    ) -> StepResult {
        StepResult {
            step_name: step.name.clone(),
            step_index,
            validator_type: step.validator_type.clone(),
            table: step.table_label(),
            status: self.status,
            started_at,
            duration_ms,
            difference_type: self.difference_type,
            source_row_count: self.source_row_count,
            target_row_count: self.target_row_count,
            match_percentage: self.match_percentage,
            affected_columns: self.affected_columns,
            comparison: self.comparison,
            error: None,
        }
    }
}

// ============================================================================
// Tolerance and percentages
// ============================================================================

/// Permitted numeric deviation; omitted tolerance means exact equality
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Tolerance {
    /// |a - b| <= value
    Absolute { value: f64 },
    /// |a - b| <= value * max(|a|, |b|), value as a fraction (0.01 = 1%)
    Relative { value: f64 },
}

const FLOAT_SLACK: f64 = 1e-9;

impl Tolerance {
    pub fn check(&self) -> Result<(), String> {
        let value = match self {
            Tolerance::Absolute { value } | Tolerance::Relative { value } => *value,
        };
        if !value.is_finite() || value < 0.0 {
            return Err(format!("tolerance must be a non-negative number, got {}", value));
        }
        if matches!(self, Tolerance::Relative { .. }) && value > 1.0 {
            return Err(format!("relative tolerance is a fraction between 0 and 1, got {}", value));
        }
        Ok(())
    }

    pub fn allows(&self, a: f64, b: f64) -> bool {
        let delta = (a - b).abs();
        let scale = a.abs().max(b.abs());
        match self {
            Tolerance::Absolute { value } => delta <= value + FLOAT_SLACK * scale.max(1.0),
            Tolerance::Relative { value } => delta <= value * scale * (1.0 + FLOAT_SLACK),
        }
    }
}

pub fn within(tolerance: Option<&Tolerance>, a: f64, b: f64) -> bool {
    match tolerance {
        Some(t) => t.allows(a, b),
        None => a == b,
    }
}

fn truncate_2dp(value: f64) -> f64 {
    ((value * 100.0) + 1e-6).floor() / 100.0
}

/// `matched / total` as a percentage, truncated to two decimals
///
/// Only an exact match reports 100; an empty comparison counts as a match.
pub fn percentage(matched: u64, total: u64) -> f64 {
    if total == 0 || matched >= total {
        return 100.0;
    }
    truncate_2dp(matched as f64 * 100.0 / total as f64).min(BELOW_FULL_MATCH)
}

/// Smaller count as a percentage of the larger one
pub fn count_ratio(a: u64, b: u64) -> f64 {
    percentage(a.min(b), a.max(b))
}

// ============================================================================
// Value normalization
// ============================================================================

const NULL_MARKER: &str = "\u{0}NULL";

/// Exact numeric reading of a cell
///
/// JSON numbers always count. Text counts only in a numerically typed column,
/// where it carries an exact decimal; `"00123"` in a text column stays text.
pub fn as_decimal(value: &Value, numeric_column: bool) -> Option<Decimal> {
    match value {
        Value::Number(n) => number_to_decimal(n),
        Value::String(s) if numeric_column => parse_decimal(s.trim()),
        _ => None,
    }
}

fn number_to_decimal(n: &Number) -> Option<Decimal> {
    if let Some(i) = n.as_i64() {
        return Some(Decimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(Decimal::from(u));
    }
    parse_decimal(&n.to_string())
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str_exact(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// System-independent text form of a cell
///
/// Numbers compare by exact value (`10`, `10.0` and a NUMERIC `"10.00"`
/// agree); text compares byte for byte.
pub fn canonical(value: &Value, numeric_column: bool) -> String {
    match value {
        Value::Null => NULL_MARKER.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match number_to_decimal(n) {
            Some(d) => d.normalize().to_string(),
            None => n.to_string(),
        },
        Value::String(s) if numeric_column => match parse_decimal(s.trim()) {
            Some(d) => d.normalize().to_string(),
            None => s.clone(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Readable form of a canonical cell for payloads
pub(crate) fn display_canonical(cell: &str) -> Value {
    if cell == NULL_MARKER {
        Value::Null
    } else {
        Value::String(cell.to_string())
    }
}
