//! Step result domain types

use serde::{Deserialize, Serialize};

/// Verdict of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Warning,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Warning => "warning",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "passed" => Some(StepStatus::Passed),
            "failed" => Some(StepStatus::Failed),
            "warning" => Some(StepStatus::Warning),
            "skipped" => Some(StepStatus::Skipped),
            _ => None,
        }
    }
}

/// How the two sides differ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceType {
    None,
    CountMismatch,
    RowOrder,
    DataMismatch,
    ShapeMismatch,
}

impl DifferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifferenceType::None => "none",
            DifferenceType::CountMismatch => "count_mismatch",
            DifferenceType::RowOrder => "row_order",
            DifferenceType::DataMismatch => "data_mismatch",
            DifferenceType::ShapeMismatch => "shape_mismatch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(DifferenceType::None),
            "count_mismatch" => Some(DifferenceType::CountMismatch),
            "row_order" => Some(DifferenceType::RowOrder),
            "data_mismatch" => Some(DifferenceType::DataMismatch),
            "shape_mismatch" => Some(DifferenceType::ShapeMismatch),
            _ => None,
        }
    }
}

/// Classification of an execution error attached to a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Timeout,
    Connection,
    Query,
    Crash,
    Cancelled,
}

impl ErrorKind {
    /// Stable error code surfaced to users
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "CONFIGURATION_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::Connection => "CONNECTION_ERROR",
            ErrorKind::Query => "QUERY_ERROR",
            ErrorKind::Crash => "VALIDATOR_CRASH",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// The step could not produce a verdict but the run carries on
    NonFatal,
    /// The run could not carry on past this step
    Fatal,
}

/// Error details attached to a step that did not produce a clean comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    #[serde(default)]
    pub stack_trace: Option<String>,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: ErrorSeverity::NonFatal,
            message: message.into(),
            stack_trace: None,
        }
    }

    pub fn fatal(mut self) -> Self {
        self.severity = ErrorSeverity::Fatal;
        self
    }

    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
        self
    }
}

/// Outcome of one executed (or skipped) step
///
/// Owned by the step that produced it; written once and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub step_index: usize,
    pub validator_type: String,
    pub table: Option<String>,
    pub status: StepStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
    pub difference_type: DifferenceType,
    pub source_row_count: Option<u64>,
    pub target_row_count: Option<u64>,
    /// 0–100, truncated to two decimals
    pub match_percentage: f64,
    pub affected_columns: Vec<String>,
    /// Validator-specific diagnostics (samples, per-column deltas, ...)
    pub comparison: serde_json::Value,
    pub error: Option<StepError>,
}

impl StepResult {
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Failed, warning, or never executed because the run hit a fatal error
    pub fn is_problem(&self) -> bool {
        matches!(self.status, StepStatus::Failed | StepStatus::Warning) || self.is_fatal()
    }

    pub fn is_fatal(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.severity == ErrorSeverity::Fatal)
    }

    /// Number of individual discrepancies this step observed
    pub fn error_count(&self) -> u64 {
        if !self.is_problem() {
            return 0;
        }
        if let Some(n) = self
            .comparison
            .get("differing_rows_count")
            .and_then(|v| v.as_u64())
        {
            return n.max(1);
        }
        match (self.difference_type, self.source_row_count, self.target_row_count) {
            (DifferenceType::CountMismatch, Some(a), Some(b)) => a.abs_diff(b).max(1),
            _ => (self.affected_columns.len() as u64).max(1),
        }
    }

    /// Whether the result honours the status/difference/percentage invariants
    pub fn is_consistent(&self) -> bool {
        let full_match_implies_pass =
            self.match_percentage < 100.0 || self.status == StepStatus::Passed;
        let difference_implies_not_pass =
            self.difference_type == DifferenceType::None || self.status != StepStatus::Passed;
        let in_range = (0.0..=100.0).contains(&self.match_percentage);
        full_match_implies_pass && difference_implies_not_pass && in_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: StepStatus, difference_type: DifferenceType, pct: f64) -> StepResult {
        StepResult {
            step_name: "s".to_string(),
            step_index: 0,
            validator_type: "row_count".to_string(),
            table: None,
            status,
            started_at: chrono::Utc::now(),
            duration_ms: 1,
            difference_type,
            source_row_count: Some(100),
            target_row_count: Some(80),
            match_percentage: pct,
            affected_columns: vec![],
            comparison: serde_json::Value::Null,
            error: None,
        }
    }

    #[test]
    fn test_consistency_rules() {
        assert!(result(StepStatus::Passed, DifferenceType::None, 100.0).is_consistent());
        assert!(!result(StepStatus::Failed, DifferenceType::None, 100.0).is_consistent());
        assert!(!result(StepStatus::Passed, DifferenceType::DataMismatch, 90.0).is_consistent());
        assert!(result(StepStatus::Failed, DifferenceType::CountMismatch, 80.0).is_consistent());
    }

    #[test]
    fn test_error_count_uses_count_delta() {
        let failed = result(StepStatus::Failed, DifferenceType::CountMismatch, 80.0);
        assert_eq!(failed.error_count(), 20);
        let passed = result(StepStatus::Passed, DifferenceType::None, 100.0);
        assert_eq!(passed.error_count(), 0);
    }

    #[test]
    fn test_fatal_skip_is_a_problem() {
        let mut unreachable = result(StepStatus::Skipped, DifferenceType::None, 0.0);
        unreachable.error = Some(StepError::new(ErrorKind::Connection, "CONNECTION_ERROR: target").fatal());
        assert!(unreachable.is_problem());
        assert_eq!(unreachable.error_count(), 1);

        let mut cancelled = result(StepStatus::Skipped, DifferenceType::None, 0.0);
        cancelled.error = Some(StepError::new(ErrorKind::Cancelled, "run cancelled"));
        assert!(!cancelled.is_problem());
        assert_eq!(cancelled.error_count(), 0);
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            StepStatus::Passed,
            StepStatus::Failed,
            StepStatus::Warning,
            StepStatus::Skipped,
        ] {
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ErrorKind::Timeout.code(), "TIMEOUT_ERROR");
    }
}
