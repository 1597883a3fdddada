//! Run domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::step::{StepResult, StepStatus};

/// Run lifecycle status
///
/// `Pending -> Running -> {Completed, Failed}`; `Pending -> Failed` is not allowed
/// because configuration errors are surfaced before a run exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// Aggregate counters, always equal to the sum over the run's step results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub total_steps: u32,
    pub passed_steps: u32,
    pub failed_steps: u32,
    pub warning_steps: u32,
    pub skipped_steps: u32,
    /// Steps carrying an execution error (timeouts, crashes, ...)
    pub error_count: u32,
}

impl RunCounters {
    pub fn from_steps(steps: &[StepResult]) -> Self {
        let mut counters = RunCounters::default();
        for step in steps {
            counters.total_steps += 1;
            match step.status {
                StepStatus::Passed => counters.passed_steps += 1,
                StepStatus::Failed => counters.failed_steps += 1,
                StepStatus::Warning => counters.warning_steps += 1,
                StepStatus::Skipped => counters.skipped_steps += 1,
            }
            if step.error.is_some() {
                counters.error_count += 1;
            }
        }
        counters
    }

    /// Passed steps as a percentage of all steps (0 when there are none)
    pub fn success_rate(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        f64::from(self.passed_steps) * 100.0 / f64::from(self.total_steps)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid run transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: RunStatus,
    pub to: RunStatus,
}

/// One execution of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub failure_reason: Option<String>,
    pub counters: RunCounters,
}

impl Run {
    pub fn new(id: Uuid, pipeline_name: impl Into<String>) -> Self {
        Self {
            id,
            pipeline_name: pipeline_name.into(),
            status: RunStatus::Pending,
            started_at: None,
            finished_at: None,
            failure_reason: None,
            counters: RunCounters::default(),
        }
    }

    /// `Pending -> Running`
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(RunStatus::Running)?;
        self.started_at = Some(chrono::Utc::now());
        Ok(())
    }

    /// `Running -> Completed`, finalizing counters from the step results
    pub fn complete(&mut self, steps: &[StepResult]) -> Result<(), InvalidTransition> {
        self.transition(RunStatus::Completed)?;
        self.finish(steps);
        Ok(())
    }

    /// `Running -> Failed`, finalizing counters from whatever steps were recorded
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        steps: &[StepResult],
    ) -> Result<(), InvalidTransition> {
        self.transition(RunStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        self.finish(steps);
        Ok(())
    }

    fn finish(&mut self, steps: &[StepResult]) {
        self.counters = RunCounters::from_steps(steps);
        self.finished_at = Some(chrono::Utc::now());
    }

    fn transition(&mut self, to: RunStatus) -> Result<(), InvalidTransition> {
        let allowed = matches!(
            (self.status, to),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
        );
        if !allowed {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let mut run = Run::new(Uuid::new_v4(), "nightly");
        assert!(run.complete(&[]).is_err());
        run.start().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        run.complete(&[]).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());

        // terminal status is immutable
        assert!(run.fail("late", &[]).is_err());
        assert!(run.start().is_err());
    }

    #[test]
    fn test_fail_records_reason() {
        let mut run = Run::new(Uuid::new_v4(), "nightly");
        run.start().unwrap();
        run.fail("cancelled by user", &[]).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.failure_reason.as_deref(), Some("cancelled by user"));
    }

    #[test]
    fn test_success_rate() {
        let counters = RunCounters {
            total_steps: 4,
            passed_steps: 3,
            failed_steps: 1,
            ..Default::default()
        };
        assert_eq!(counters.success_rate(), 75.0);
        assert_eq!(RunCounters::default().success_rate(), 0.0);
    }
}
