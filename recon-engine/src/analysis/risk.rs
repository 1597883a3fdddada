//! Risk and cost scoring
//!
//! Weighs a run's problems by table criticality and unit cost.

use recon_core::domain::analysis::{Criticality, RiskAssessment, RiskLevel, RiskProfile, RootCauseGroup, Severity};
use recon_core::domain::step::{StepResult, StepStatus};
use std::collections::{BTreeMap, BTreeSet};

/// Scores one run
///
/// Problems are attributed to the step's table label, or to the step name
/// when the step has none.
pub fn score(steps: &[StepResult], groups: &[RootCauseGroup], profile: &RiskProfile) -> RiskAssessment {
    let mut cost_by_table: BTreeMap<String, f64> = BTreeMap::new();
    let mut critical_failing: BTreeSet<String> = BTreeSet::new();

    for step in steps.iter().filter(|s| s.is_problem()) {
        let table = step.table.clone().unwrap_or_else(|| step.step_name.clone());
        let cost = profile.unit_cost(&table) * step.error_count() as f64;
        *cost_by_table.entry(table.clone()).or_default() += cost;

        if step.status == StepStatus::Failed && profile.criticality(&table) == Criticality::Critical {
            critical_failing.insert(table);
        }
    }

    let blocker_groups = groups.iter().filter(|g| g.severity == Severity::Blocker).count();
    let high_groups = groups.iter().filter(|g| g.severity == Severity::High).count();
    let critical_tables_failing: Vec<String> = critical_failing.into_iter().collect();

    let level = if blocker_groups > 0 || critical_tables_failing.len() >= 2 {
        RiskLevel::Critical
    } else if high_groups > 0 || critical_tables_failing.len() == 1 {
        RiskLevel::High
    } else if !groups.is_empty() {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    RiskAssessment {
        level,
        estimated_cost: cost_by_table.values().sum(),
        cost_by_table,
        blocker_groups,
        high_groups,
        critical_tables_failing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::root_cause;
    use recon_core::domain::analysis::TableRisk;
    use recon_core::domain::step::DifferenceType;

    fn failed_count(table: &str, source: u64, target: u64) -> StepResult {
        StepResult {
            step_name: format!("{} count", table),
            step_index: 0,
            validator_type: "row_count".to_string(),
            table: Some(table.to_string()),
            status: StepStatus::Failed,
            started_at: chrono::Utc::now(),
            duration_ms: 1,
            difference_type: DifferenceType::CountMismatch,
            source_row_count: Some(source),
            target_row_count: Some(target),
            match_percentage: 90.0,
            affected_columns: Vec::new(),
            comparison: serde_json::Value::Null,
            error: None,
        }
    }

    fn profile() -> RiskProfile {
        let mut profile = RiskProfile {
            default_unit_cost: 1.0,
            ..Default::default()
        };
        for name in ["SALES.ORDERS", "SALES.PAYMENTS"] {
            profile.tables.insert(
                name.to_string(),
                TableRisk {
                    criticality: Criticality::Critical,
                    unit_cost: 25.0,
                },
            );
        }
        profile
    }

    #[test]
    fn test_no_problems_is_low_risk() {
        let assessment = score(&[], &[], &profile());
        assert_eq!(assessment.level, RiskLevel::Low);
        assert_eq!(assessment.estimated_cost, 0.0);
    }

    #[test]
    fn test_cost_is_unit_cost_times_errors() {
        let steps = vec![failed_count("SALES.ORDERS", 100, 90), failed_count("misc.lookup", 10, 7)];
        let groups = root_cause::analyze(&steps);
        let assessment = score(&steps, &groups, &profile());

        assert_eq!(assessment.cost_by_table["SALES.ORDERS"], 250.0);
        assert_eq!(assessment.cost_by_table["misc.lookup"], 3.0);
        assert_eq!(assessment.estimated_cost, 253.0);
        assert_eq!(assessment.critical_tables_failing, vec!["SALES.ORDERS"]);
        assert_eq!(assessment.level, RiskLevel::High);
    }

    #[test]
    fn test_two_critical_tables_failing_is_critical() {
        let steps = vec![failed_count("SALES.ORDERS", 100, 99), failed_count("sales.payments", 5, 4)];
        let assessment = score(&steps, &[], &profile());
        assert_eq!(assessment.level, RiskLevel::Critical);
    }
}
