//! Terminal rendering of runs, step tables and analytics

use colored::*;
use recon_core::domain::analysis::{
    RiskAssessment, RiskLevel, RootCauseGroup, RunSummary, Severity, TrendDirection, TrendMetric, Velocity,
    VelocityIndicator,
};
use recon_core::domain::run::{Run, RunStatus};
use recon_core::domain::step::{StepResult, StepStatus};
use recon_core::dto::analytics::AnalyticsReport;

/// Shortens `s` to at most `max` characters, marking the cut with `…`
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept)
}

fn format_count(count: Option<u64>) -> String {
    count.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
}

fn colorize_step_status(status: StepStatus, width: usize) -> ColoredString {
    let padded = format!("{:<width$}", status.as_str(), width = width);
    match status {
        StepStatus::Passed => padded.green(),
        StepStatus::Failed => padded.red(),
        StepStatus::Warning => padded.yellow(),
        StepStatus::Skipped => padded.dimmed(),
    }
}

fn colorize_run_status(status: RunStatus) -> ColoredString {
    match status {
        RunStatus::Pending => status.as_str().yellow(),
        RunStatus::Running => status.as_str().cyan(),
        RunStatus::Completed => status.as_str().green(),
        RunStatus::Failed => status.as_str().red(),
    }
}

fn colorize_severity(severity: Severity) -> ColoredString {
    let label = format!("{:?}", severity).to_uppercase();
    match severity {
        Severity::Blocker => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.dimmed(),
    }
}

/// Print the lifecycle fields and counters of a run
pub fn print_run_header(run: &Run) {
    println!("{}", "Run Details:".bold());
    println!("  ID:        {}", run.id.to_string().cyan());
    println!("  Pipeline:  {}", run.pipeline_name);
    println!("  Status:    {}", colorize_run_status(run.status));

    if let Some(started) = run.started_at {
        println!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(duration) = run.duration_ms() {
        println!("  Duration:  {} ms", duration);
    }
    if let Some(reason) = &run.failure_reason {
        println!("  Reason:    {}", reason.red());
    }

    let c = &run.counters;
    println!(
        "  Steps:     {} total, {} passed, {} failed, {} warning, {} skipped",
        c.total_steps,
        c.passed_steps.to_string().green(),
        c.failed_steps.to_string().red(),
        c.warning_steps.to_string().yellow(),
        c.skipped_steps.to_string().dimmed()
    );
    println!("  Success:   {:.2}%", c.success_rate());
}

/// Print one row per step, then the error details of steps that have one
pub fn print_step_table(steps: &[StepResult]) {
    if steps.is_empty() {
        println!("{}", "No step results.".yellow());
        return;
    }

    println!();
    println!(
        "{}",
        format!(
            "  {:>3}  {:<28} {:<13} {:<8} {:>7}  {:<15} {:>10} {:>10}",
            "#", "STEP", "VALIDATOR", "STATUS", "MATCH%", "DIFFERENCE", "SOURCE", "TARGET"
        )
        .bold()
    );
    println!("{}", "─".repeat(104).dimmed());

    for step in steps {
        println!(
            "  {:>3}  {:<28} {:<13} {} {:>7.2}  {:<15} {:>10} {:>10}",
            step.step_index + 1,
            truncate(&step.step_name, 28),
            truncate(&step.validator_type, 13),
            colorize_step_status(step.status, 8),
            step.match_percentage,
            step.difference_type.as_str(),
            format_count(step.source_row_count),
            format_count(step.target_row_count)
        );
    }
    println!("{}", "─".repeat(104).dimmed());

    let with_errors: Vec<_> = steps.iter().filter(|s| s.error.is_some()).collect();
    if !with_errors.is_empty() {
        println!("\n{}", "Errors:".bold());
        for step in with_errors {
            if let Some(error) = &step.error {
                println!(
                    "  {} {} [{}] {}",
                    "✗".red(),
                    step.step_name,
                    error.kind.code().red(),
                    error.message
                );
                if let Some(trace) = &error.stack_trace {
                    println!("      {}", trace.dimmed());
                }
            }
        }
    }
}

/// Print root-cause groups, most severe first
pub fn print_root_causes(groups: &[RootCauseGroup]) {
    if groups.is_empty() {
        println!("\n{}", "No root causes: every step passed.".green());
        return;
    }

    println!("\n{}", "Root Causes:".bold());
    for group in groups {
        println!(
            "  {} {} {} ({} step(s), {} error(s))",
            "▸".cyan(),
            colorize_severity(group.severity),
            group.title.bold(),
            group.total_affected,
            group.error_count
        );
        println!("    {}", group.description.dimmed());
        println!("    Steps:  {}", group.affected_steps.join(", "));
        println!("    Action: {}", group.recommended_action);
    }
}

/// Print the risk level and cost breakdown
pub fn print_risk(risk: &RiskAssessment) {
    let level = format!("{:?}", risk.level).to_uppercase();
    let level = match risk.level {
        RiskLevel::Critical => level.red().bold(),
        RiskLevel::High => level.red(),
        RiskLevel::Medium => level.yellow(),
        RiskLevel::Low => level.green(),
    };

    println!("\n{}", "Risk:".bold());
    println!("  Level:          {}", level);
    println!("  Estimated cost: {:.2}", risk.estimated_cost);
    for (table, cost) in &risk.cost_by_table {
        println!("    {:<40} {:>12.2}", truncate(table, 40), cost);
    }
    if !risk.critical_tables_failing.is_empty() {
        println!(
            "  Critical tables failing: {}",
            risk.critical_tables_failing.join(", ").red()
        );
    }
}

/// Print a run history, oldest first
pub fn print_run_summaries(runs: &[RunSummary]) {
    println!(
        "{}",
        format!(
            "  {:<36}  {:<19}  {:<9}  {:>8}  {:>6}  {:>8}",
            "RUN", "STARTED", "STATUS", "SUCCESS%", "ERRORS", "BLOCKERS"
        )
        .bold()
    );
    for run in runs {
        let started = run
            .started_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<36}  {:<19}  {:<9}  {:>8.2}  {:>6}  {:>8}",
            run.run_id.to_string().dimmed(),
            started,
            run.status.as_str(),
            run.success_rate,
            run.error_count,
            run.blocker_count
        );
    }
}

fn print_trend_metric(metric: &TrendMetric) {
    let arrow = match metric.direction {
        TrendDirection::Up => "▲".green(),
        TrendDirection::Down => "▼".red(),
        TrendDirection::Flat => "■".dimmed(),
    };
    println!(
        "  {} {:<14} {:>8.2} -> {:>8.2}  ({:+.1}%)",
        arrow,
        format!("{:?}", metric.metric),
        metric.previous,
        metric.current,
        metric.change_percent
    );
}

fn print_velocity(velocity: &Velocity) {
    let indicator = format!("{:?}", velocity.indicator).to_uppercase();
    let indicator = match velocity.indicator {
        VelocityIndicator::Accelerating => indicator.green().bold(),
        VelocityIndicator::Steady => indicator.green(),
        VelocityIndicator::Slow => indicator.yellow(),
        VelocityIndicator::Degrading => indicator.red(),
    };
    println!(
        "  Velocity: {} ({:+.2} points/run)",
        indicator, velocity.average_improvement
    );
    match velocity.estimated_runs_to_100 {
        Some(0) => println!("  Reconciled: 100% success reached"),
        Some(runs) => println!("  Estimated runs to 100%: {}", runs),
        None => println!("  Estimated runs to 100%: {}", "not converging".dimmed()),
    }
}

/// Print the analytics read contract for one pipeline
pub fn print_analytics(report: &AnalyticsReport) {
    println!(
        "{}",
        format!(
            "Analytics for pipeline '{}' (last {} runs):",
            report.pipeline_name,
            report.runs.len()
        )
        .bold()
    );
    if let Some(baseline) = report.baseline {
        println!("  Baseline: {}", baseline.to_string().cyan());
    }

    if report.runs.is_empty() {
        println!("{}", "No finished runs yet.".yellow());
        return;
    }

    println!();
    print_run_summaries(&report.runs);

    if !report.trends.is_empty() {
        println!("\n{}", "Trends:".bold());
        for metric in &report.trends {
            print_trend_metric(metric);
        }
    }
    if let Some(velocity) = &report.velocity {
        println!();
        print_velocity(velocity);
    }
    if let Some(summary) = &report.summary {
        println!("\n{}", "Summary:".bold());
        println!(
            "  Best run:   {} ({:.2}%)",
            summary.best_run.run_id, summary.best_run.success_rate
        );
        println!(
            "  Worst run:  {} ({:.2}%)",
            summary.worst_run.run_id, summary.worst_run.success_rate
        );
        println!("  Average:    {:.2}%", summary.average_success_rate);
        println!("  Resolved:   {} issue(s)", summary.total_issues_resolved);
    }
}
