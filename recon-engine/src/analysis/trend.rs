//! Trend and velocity engine
//!
//! Operates on chronological [`RunSummary`] lists (oldest first). Runs are
//! compared against the pinned baseline when it is part of the history,
//! otherwise against the run right before the latest one.

use recon_core::domain::analysis::{
    AnalyticsSummary, MetricKind, RunSummary, TrendDirection, TrendMetric, TrendReport, Velocity,
    VelocityIndicator,
};
use recon_core::dto::analytics::AnalyticsReport;
use uuid::Uuid;

/// Changes smaller than this (in percent) are reported as flat
pub const FLAT_THRESHOLD: f64 = 0.5;

/// Number of trailing success-rate deltas averaged into the velocity
pub const VELOCITY_WINDOW: usize = 5;

/// Projections beyond this many runs are reported as absent
pub const MAX_PROJECTED_RUNS: f64 = 10_000.0;

pub fn change_percent(current: f64, previous: f64) -> f64 {
    (current - previous) / previous.abs().max(1.0) * 100.0
}

pub fn direction(metric: MetricKind, change: f64) -> TrendDirection {
    if change.abs() < FLAT_THRESHOLD {
        TrendDirection::Flat
    } else if (change > 0.0) == metric.higher_is_better() {
        TrendDirection::Up
    } else {
        TrendDirection::Down
    }
}

fn metric_value(summary: &RunSummary, metric: MetricKind) -> f64 {
    match metric {
        MetricKind::SuccessRate => summary.success_rate,
        MetricKind::ErrorCount => f64::from(summary.error_count),
        MetricKind::BlockerCount => f64::from(summary.blocker_count),
    }
}

/// Per-metric comparison of `current` against `anchor`
pub fn trend_metrics(current: &RunSummary, anchor: &RunSummary) -> Vec<TrendMetric> {
    [MetricKind::SuccessRate, MetricKind::ErrorCount, MetricKind::BlockerCount]
        .into_iter()
        .map(|metric| {
            let (now, before) = (metric_value(current, metric), metric_value(anchor, metric));
            let change = change_percent(now, before);
            TrendMetric {
                metric,
                current: now,
                previous: before,
                change_percent: change,
                direction: direction(metric, change),
            }
        })
        .collect()
}

/// Rate of improvement over the trailing success-rate deltas
///
/// Absent with fewer than two runs.
pub fn velocity(history: &[RunSummary]) -> Option<Velocity> {
    if history.len() < 2 {
        return None;
    }

    let deltas: Vec<f64> = history
        .windows(2)
        .map(|pair| pair[1].success_rate - pair[0].success_rate)
        .collect();
    let recent = &deltas[deltas.len().saturating_sub(VELOCITY_WINDOW)..];
    let average = recent.iter().sum::<f64>() / recent.len() as f64;

    let indicator = if average >= 5.0 {
        VelocityIndicator::Accelerating
    } else if average >= 2.0 {
        VelocityIndicator::Steady
    } else if average >= -0.5 {
        VelocityIndicator::Slow
    } else {
        VelocityIndicator::Degrading
    };

    let current = history.last().map(|s| s.success_rate).unwrap_or_default();
    let estimated_runs_to_100 = if current >= 100.0 {
        Some(0)
    } else if average > 0.0 {
        let runs = ((100.0 - current) / average).ceil();
        (runs <= MAX_PROJECTED_RUNS).then_some(runs as u32)
    } else {
        None
    };

    Some(Velocity {
        average_improvement: average,
        indicator,
        estimated_runs_to_100,
    })
}

/// Trend of the latest run in `history`
pub fn trend_report(history: &[RunSummary], baseline: Option<Uuid>) -> TrendReport {
    let Some((current, earlier)) = history.split_last() else {
        return TrendReport::default();
    };
    let Some(previous) = earlier.last() else {
        return TrendReport::default();
    };

    let anchor = baseline
        .and_then(|id| earlier.iter().find(|s| s.run_id == id))
        .unwrap_or(previous);

    TrendReport {
        compared_to: Some(anchor.run_id),
        metrics: trend_metrics(current, anchor),
        velocity: velocity(history),
    }
}

/// Best/worst run, average success rate and issues resolved across `history`
pub fn summarize(history: &[RunSummary]) -> Option<AnalyticsSummary> {
    let best = history
        .iter()
        .max_by(|a, b| a.success_rate.total_cmp(&b.success_rate))?;
    let worst = history
        .iter()
        .min_by(|a, b| a.success_rate.total_cmp(&b.success_rate))?;
    let average = history.iter().map(|s| s.success_rate).sum::<f64>() / history.len() as f64;
    let resolved = history
        .windows(2)
        .map(|pair| pair[0].error_count.saturating_sub(pair[1].error_count))
        .sum();

    Some(AnalyticsSummary {
        best_run: best.clone(),
        worst_run: worst.clone(),
        average_success_rate: average,
        total_issues_resolved: resolved,
    })
}

/// Analytics read contract for one pipeline over its last `window` runs
pub fn analytics_report(
    pipeline_name: &str,
    window: usize,
    mut runs: Vec<RunSummary>,
    baseline: Option<Uuid>,
) -> AnalyticsReport {
    if runs.len() > window {
        runs.drain(..runs.len() - window);
    }
    let trend = trend_report(&runs, baseline);

    AnalyticsReport {
        pipeline_name: pipeline_name.to_string(),
        window,
        baseline,
        trends: trend.metrics,
        velocity: trend.velocity,
        summary: summarize(&runs),
        runs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::domain::run::RunStatus;

    fn summary(success_rate: f64, error_count: u32) -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            started_at: None,
            status: RunStatus::Completed,
            success_rate,
            error_count,
            blocker_count: 0,
            total_steps: 10,
        }
    }

    #[test]
    fn test_success_rate_rising_is_up() {
        let history = vec![summary(70.0, 3), summary(84.0, 2)];
        let report = trend_report(&history, None);

        let success = &report.metrics[0];
        assert_eq!(success.metric, MetricKind::SuccessRate);
        assert!((success.change_percent - 20.0).abs() < 1e-9);
        assert_eq!(success.direction, TrendDirection::Up);

        // fewer errors is an improvement
        assert_eq!(report.metrics[1].direction, TrendDirection::Up);
        assert_eq!(report.metrics[2].direction, TrendDirection::Flat);
    }

    #[test]
    fn test_short_history_has_no_trend() {
        let report = trend_report(&[summary(50.0, 1)], None);
        assert!(report.metrics.is_empty());
        assert!(report.velocity.is_none());
        assert!(report.compared_to.is_none());
    }

    #[test]
    fn test_baseline_anchor() {
        let history = vec![summary(40.0, 6), summary(60.0, 4), summary(80.0, 2)];
        let baseline = history[0].run_id;

        let report = trend_report(&history, Some(baseline));
        assert_eq!(report.compared_to, Some(baseline));
        assert_eq!(report.metrics[0].previous, 40.0);

        // a baseline outside the history falls back to the prior run
        let report = trend_report(&history, Some(Uuid::new_v4()));
        assert_eq!(report.compared_to, Some(history[1].run_id));
    }

    #[test]
    fn test_velocity_indicators() {
        let steady = vec![summary(70.0, 0), summary(73.0, 0), summary(76.0, 0)];
        let velocity = velocity(&steady).unwrap();
        assert_eq!(velocity.indicator, VelocityIndicator::Steady);
        assert_eq!(velocity.estimated_runs_to_100, Some(8));

        let degrading = vec![summary(90.0, 0), summary(80.0, 0)];
        let velocity = super::velocity(&degrading).unwrap();
        assert_eq!(velocity.indicator, VelocityIndicator::Degrading);
        assert_eq!(velocity.estimated_runs_to_100, None);

        let done = vec![summary(90.0, 0), summary(100.0, 0)];
        assert_eq!(super::velocity(&done).unwrap().estimated_runs_to_100, Some(0));
    }

    #[test]
    fn test_negligible_improvement_has_no_projection() {
        let crawling = vec![summary(50.0, 0), summary(50.000001, 0)];
        let velocity = velocity(&crawling).unwrap();
        assert_eq!(velocity.indicator, VelocityIndicator::Slow);
        assert_eq!(velocity.estimated_runs_to_100, None);

        let slow = vec![summary(50.0, 0), summary(50.0078125, 0)];
        assert_eq!(super::velocity(&slow).unwrap().estimated_runs_to_100, Some(6399));
    }

    #[test]
    fn test_velocity_uses_trailing_window() {
        // early collapse is outside the five-delta window
        let rates = [100.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0];
        let history: Vec<_> = rates.iter().map(|r| summary(*r, 0)).collect();
        let velocity = velocity(&history).unwrap();
        assert!((velocity.average_improvement - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_analytics_report_window_and_summary() {
        let runs = vec![summary(10.0, 9), summary(50.0, 5), summary(40.0, 6), summary(90.0, 1)];
        let report = analytics_report("nightly", 3, runs.clone(), None);

        assert_eq!(report.runs.len(), 3);
        assert_eq!(report.runs[0].run_id, runs[1].run_id);
        let summary = report.summary.unwrap();
        assert_eq!(summary.best_run.run_id, runs[3].run_id);
        assert_eq!(summary.worst_run.run_id, runs[2].run_id);
        assert_eq!(summary.average_success_rate, 60.0);
        // 6 -> 1 resolves five; 5 -> 6 resolves none
        assert_eq!(summary.total_issues_resolved, 5);
    }
}
