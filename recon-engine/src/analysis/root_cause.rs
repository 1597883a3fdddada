//! Root-cause analyzer
//!
//! Classifies failed and warning steps with an ordered rule table; the first
//! matching rule decides a step's category. Steps sharing a category form
//! one group. Output is a pure function of the step results.

use recon_core::domain::analysis::{RootCauseCategory, RootCauseGroup, Severity};
use recon_core::domain::pipeline::ValidatorType;
use recon_core::domain::step::{DifferenceType, ErrorKind, StepResult, StepStatus};
use std::collections::BTreeMap;

/// Bumped whenever a rule is added, removed, reordered or reworded
pub const RULESET_VERSION: &str = "2026.10.2";

struct Rule {
    category: RootCauseCategory,
    title: &'static str,
    description: &'static str,
    action: &'static str,
    severity: Severity,
    matches: fn(&StepResult) -> bool,
}

const RULES: &[Rule] = &[
    Rule {
        category: RootCauseCategory::Connectivity,
        title: "Connectivity failures",
        description: "Steps could not reach one of the systems or exceeded their timeout.",
        action: "Check network reachability and credentials, then raise step timeouts for slow queries.",
        severity: Severity::High,
        matches: |s| matches!(s.error_kind(), Some(ErrorKind::Timeout | ErrorKind::Connection)),
    },
    Rule {
        category: RootCauseCategory::ReferentialIntegrity,
        title: "Referential integrity violations",
        description: "Key columns disagree between systems or keys are duplicated in the result.",
        action: "Re-run the load for the affected tables and verify primary and foreign key constraints on the target.",
        severity: Severity::High,
        matches: is_integrity_violation,
    },
    Rule {
        category: RootCauseCategory::Configuration,
        title: "Configuration and query errors",
        description: "Steps failed before comparing data because of invalid configuration or SQL.",
        action: "Fix the step configuration or the schema mapping for the reported queries.",
        severity: Severity::Medium,
        matches: |s| matches!(s.error_kind(), Some(ErrorKind::Configuration | ErrorKind::Query)),
    },
    Rule {
        category: RootCauseCategory::NullHandling,
        title: "Null handling differences",
        description: "Nullability or null values differ between systems.",
        action: "Align NOT NULL constraints and check default values applied during the load.",
        severity: Severity::Medium,
        matches: |s| {
            s.comparison.get("nullability_only").and_then(|v| v.as_bool()) == Some(true)
                || s.error_message().is_some_and(|m| m.to_ascii_lowercase().contains("null"))
        },
    },
    Rule {
        category: RootCauseCategory::SchemaDrift,
        title: "Schema drift",
        description: "Column sets or column types differ between systems.",
        action: "Update the target DDL or the column mapping for the affected tables.",
        severity: Severity::High,
        matches: |s| s.difference_type == DifferenceType::ShapeMismatch,
    },
    Rule {
        category: RootCauseCategory::AggregateToleranceBreach,
        title: "Aggregate tolerance breaches",
        description: "Aggregated values differ by more than the configured tolerance.",
        action: "Inspect numeric precision and rounding in the transformation, or review the tolerance.",
        severity: Severity::High,
        matches: |s| {
            s.difference_type == DifferenceType::DataMismatch
                && s.validator_type.parse::<ValidatorType>().ok() == Some(ValidatorType::Aggregate)
        },
    },
    Rule {
        category: RootCauseCategory::RowCountDrift,
        title: "Row count drift",
        description: "Tables hold a different number of rows on each system.",
        action: "Look for filtered, failed or partially committed load batches.",
        severity: Severity::High,
        matches: |s| s.difference_type == DifferenceType::CountMismatch,
    },
    Rule {
        category: RootCauseCategory::RowOrdering,
        title: "Row ordering differences",
        description: "Results contain the same rows in a different order.",
        action: "Add an ORDER BY or key columns to the comparison query.",
        severity: Severity::Low,
        matches: |s| s.difference_type == DifferenceType::RowOrder,
    },
    Rule {
        category: RootCauseCategory::DataValueMismatch,
        title: "Data value mismatches",
        description: "Rows exist on both systems but column values differ.",
        action: "Compare the sampled rows and check type conversions and encodings for the affected columns.",
        severity: Severity::Medium,
        matches: |s| s.difference_type == DifferenceType::DataMismatch,
    },
    Rule {
        category: RootCauseCategory::Unclassified,
        title: "Unclassified failures",
        description: "Failures that match no known pattern.",
        action: "Inspect the step errors and comparison payloads manually.",
        severity: Severity::Medium,
        matches: |_| true,
    },
];

const INTEGRITY_MARKERS: [&str; 6] = [
    "foreign key",
    "referential",
    "primary key",
    "duplicate key",
    "unique constraint",
    "orphan",
];

fn is_key_column(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == "id" || name.ends_with("_id") || name.ends_with("_fk") || name.ends_with("_key")
}

/// Primary-key or referential-integrity violation
fn is_integrity_violation(step: &StepResult) -> bool {
    let message_hit = step.error_message().is_some_and(|m| {
        let m = m.to_ascii_lowercase();
        INTEGRITY_MARKERS.iter().any(|marker| m.contains(marker))
    });
    let duplicate_keys = step
        .comparison
        .get("duplicate_keys")
        .and_then(|v| v.as_u64())
        .is_some_and(|n| n > 0);
    let key_drift = step.difference_type == DifferenceType::DataMismatch
        && step.affected_columns.iter().any(|c| is_key_column(c));

    message_hit || duplicate_keys || key_drift
}

struct Accumulator {
    severity: Severity,
    steps: Vec<String>,
    error_count: u64,
}

/// Groups the failed and warning steps of one run
pub fn analyze(steps: &[StepResult]) -> Vec<RootCauseGroup> {
    let mut by_rule: BTreeMap<usize, Accumulator> = BTreeMap::new();

    for step in steps.iter().filter(|s| s.is_problem()) {
        let Some(rule_idx) = RULES.iter().position(|rule| (rule.matches)(step)) else {
            continue;
        };
        let rule = &RULES[rule_idx];

        let mut severity = match step.status {
            StepStatus::Warning => rule.severity.downgrade(),
            _ => rule.severity,
        };
        if is_integrity_violation(step) || step.is_fatal() {
            severity = Severity::Blocker;
        }

        let acc = by_rule.entry(rule_idx).or_insert(Accumulator {
            severity,
            steps: Vec::new(),
            error_count: 0,
        });
        acc.severity = acc.severity.max(severity);
        acc.steps.push(step.step_name.clone());
        acc.error_count += step.error_count();
    }

    let mut groups: Vec<RootCauseGroup> = by_rule
        .into_iter()
        .map(|(rule_idx, acc)| {
            let rule = &RULES[rule_idx];
            RootCauseGroup {
                category: rule.category,
                title: rule.title.to_string(),
                description: rule.description.to_string(),
                severity: acc.severity,
                total_affected: acc.steps.len(),
                affected_steps: acc.steps,
                error_count: acc.error_count,
                recommended_action: rule.action.to_string(),
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(b.total_affected.cmp(&a.total_affected))
            .then(a.category.cmp(&b.category))
    });
    groups
}

/// Number of groups at `BLOCKER` severity
pub fn blocker_count(groups: &[RootCauseGroup]) -> u32 {
    groups.iter().filter(|g| g.severity == Severity::Blocker).count() as u32
}
