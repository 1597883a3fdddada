//! Cross-run analysis domain types
//!
//! Root-cause groups, trend metrics and risk assessments are derived data.
//! They are recomputed from step results on every analysis pass and only
//! ever persisted as a cache.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::run::{Run, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Blocker,
}

impl Severity {
    /// One level lower, saturating at `Low`
    pub fn downgrade(self) -> Self {
        match self {
            Severity::Blocker => Severity::High,
            Severity::High => Severity::Medium,
            Severity::Medium | Severity::Low => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCauseCategory {
    Connectivity,
    Configuration,
    ReferentialIntegrity,
    NullHandling,
    SchemaDrift,
    AggregateToleranceBreach,
    RowCountDrift,
    RowOrdering,
    DataValueMismatch,
    Unclassified,
}

/// A cluster of failed steps sharing a failure category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseGroup {
    pub category: RootCauseCategory,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub affected_steps: Vec<String>,
    pub total_affected: usize,
    pub error_count: u64,
    pub recommended_action: String,
}

/// Condensed view of one run, the unit of history for trend computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: RunStatus,
    pub success_rate: f64,
    /// Failed plus warning steps
    pub error_count: u32,
    pub blocker_count: u32,
    pub total_steps: u32,
}

impl RunSummary {
    pub fn from_run(run: &Run, blocker_count: u32) -> Self {
        Self {
            run_id: run.id,
            started_at: run.started_at,
            status: run.status,
            success_rate: run.counters.success_rate(),
            error_count: run.counters.failed_steps + run.counters.warning_steps,
            blocker_count,
            total_steps: run.counters.total_steps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    SuccessRate,
    ErrorCount,
    BlockerCount,
}

impl MetricKind {
    /// Whether a larger value is an improvement
    pub fn higher_is_better(&self) -> bool {
        matches!(self, MetricKind::SuccessRate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Improving
    Up,
    /// Regressing
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendMetric {
    pub metric: MetricKind,
    pub current: f64,
    pub previous: f64,
    pub change_percent: f64,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityIndicator {
    Accelerating,
    Steady,
    Slow,
    Degrading,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    /// Average success-rate points gained per run over the trailing window
    pub average_improvement: f64,
    pub indicator: VelocityIndicator,
    /// Absent when the improvement rate is zero or negative
    pub estimated_runs_to_100: Option<u32>,
}

/// Trend output for one point in history; fields are absent when history is too short
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub compared_to: Option<Uuid>,
    pub metrics: Vec<TrendMetric>,
    pub velocity: Option<Velocity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub best_run: RunSummary,
    pub worst_run: RunSummary,
    pub average_success_rate: f64,
    pub total_issues_resolved: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Externally supplied per-table weighting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRisk {
    #[serde(default)]
    pub criticality: Criticality,
    pub unit_cost: f64,
}

/// Risk scoring input, keyed by table name (case-insensitive)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    #[serde(default)]
    pub default_unit_cost: f64,
    #[serde(default)]
    pub tables: BTreeMap<String, TableRisk>,
}

impl RiskProfile {
    pub fn table(&self, name: &str) -> Option<&TableRisk> {
        self.tables
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn unit_cost(&self, name: &str) -> f64 {
        self.table(name)
            .map(|t| t.unit_cost)
            .unwrap_or(self.default_unit_cost)
    }

    pub fn criticality(&self, name: &str) -> Criticality {
        self.table(name).map(|t| t.criticality).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub estimated_cost: f64,
    pub cost_by_table: BTreeMap<String, f64>,
    pub blocker_groups: usize,
    pub high_groups: usize,
    pub critical_tables_failing: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Blocker > Severity::High);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::Low.downgrade(), Severity::Low);
        assert_eq!(
            serde_json::to_string(&Severity::Blocker).unwrap(),
            "\"BLOCKER\""
        );
    }

    #[test]
    fn test_risk_profile_lookup_ignores_case() {
        let mut profile = RiskProfile {
            default_unit_cost: 2.0,
            ..Default::default()
        };
        profile.tables.insert(
            "SALES.ORDERS".to_string(),
            TableRisk {
                criticality: Criticality::Critical,
                unit_cost: 50.0,
            },
        );
        assert_eq!(profile.unit_cost("sales.orders"), 50.0);
        assert_eq!(profile.unit_cost("other"), 2.0);
        assert_eq!(profile.criticality("other"), Criticality::Medium);
    }
}
