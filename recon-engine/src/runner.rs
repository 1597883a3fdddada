//! Pipeline runner
//!
//! Owns the run lifecycle:
//! - Validates the definition before anything is opened
//! - Opens one handle per system
//! - Executes steps in declaration order, each in its own task so a
//!   panicking validator is contained to its step
//! - Observes cancellation and `stop_on_first_failure` between steps
//! - Finalizes counters and runs the root-cause, trend and risk passes

use recon_core::domain::analysis::RunSummary;
use recon_core::domain::mapping::SchemaMapping;
use recon_core::domain::pipeline::Step;
use recon_core::domain::run::Run;
use recon_core::domain::step::{DifferenceType, ErrorKind, StepError, StepResult, StepStatus};
use recon_core::dto::run::RunReport;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::analysis::{self, root_cause};
use crate::config::EngineConfig;
use crate::context::RunContext;
use crate::crash::{self, Crash};
use crate::error::Result;
use crate::loader;
use crate::pool::ConnectionPool;
use crate::validators::{StepContext, validator_for};

/// Why the remaining steps of a run are not executed
enum Halt {
    Cancelled,
    StoppedAfter(String),
    NoConnection(String),
}

impl Halt {
    fn skipped(&self, step: &Step, step_index: usize) -> StepResult {
        let (reason, error) = match self {
            Halt::Cancelled => (
                "run cancelled".to_string(),
                Some(StepError::new(ErrorKind::Cancelled, "run cancelled before this step started")),
            ),
            Halt::StoppedAfter(failed) => (format!("stopped after failed step '{}'", failed), None),
            Halt::NoConnection(message) => (
                "no connection".to_string(),
                Some(StepError::new(ErrorKind::Connection, message.clone()).fatal()),
            ),
        };
        let mut result = blank_result(step, step_index, StepStatus::Skipped);
        result.comparison = json!({ "skipped_reason": reason });
        result.error = error;
        result
    }
}

pub struct PipelineRunner {
    config: EngineConfig,
}

impl PipelineRunner {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Executes a pipeline run to a terminal state
    ///
    /// Only configuration problems are returned as errors; everything that
    /// goes wrong after the run has started is reflected in the report.
    pub async fn execute(&self, ctx: RunContext) -> Result<RunReport> {
        loader::validate_definition(&ctx.definition)?;

        let definition = &ctx.definition;
        let mut run = Run::new(ctx.run_id, &definition.name);
        run.start()?;
        info!(
            "Run {} started for pipeline '{}' ({} steps)",
            run.id,
            definition.name,
            definition.steps.len()
        );
        if let Err(e) = ctx.recorder.run_started(&run).await {
            warn!("Failed to record start of run {}: {:#}", run.id, e);
        }

        let (pool, mut halt) = match ConnectionPool::open(ctx.connectors.as_ref(), &self.config).await {
            Ok(pool) => (Some(Arc::new(pool)), None),
            Err(e) => {
                error!("Run {} could not open its connections: {}", run.id, e);
                (None, Some(Halt::NoConnection(e.to_string())))
            }
        };
        let mapping = Arc::new(ctx.mapping.clone());

        let mut results = Vec::with_capacity(definition.steps.len());
        for (index, step) in definition.steps.iter().enumerate() {
            if halt.is_none() && ctx.is_cancelled() {
                info!("Run {} cancelled before step '{}'", run.id, step.name);
                halt = Some(Halt::Cancelled);
            }

            let result = match (&halt, &pool) {
                (None, Some(pool)) => self.execute_step(&ctx, step, index, pool, &mapping).await,
                (Some(halt), _) => halt.skipped(step, index),
                (None, None) => Halt::NoConnection(String::new()).skipped(step, index),
            };

            if let Err(e) = ctx.recorder.step_recorded(run.id, &result).await {
                warn!("Failed to record step '{}' of run {}: {:#}", step.name, run.id, e);
            }

            if halt.is_none() && result.status == StepStatus::Failed && definition.settings.stop_on_first_failure {
                info!("Stopping run {} after failed step '{}'", run.id, step.name);
                halt = Some(Halt::StoppedAfter(step.name.clone()));
            }
            results.push(result);
        }

        match &halt {
            Some(Halt::Cancelled) => run.fail("cancelled", &results)?,
            Some(Halt::NoConnection(message)) => run.fail(message.clone(), &results)?,
            _ => run.complete(&results)?,
        }
        info!(
            "Run {} {}: {}/{} steps passed",
            run.id,
            run.status.as_str(),
            run.counters.passed_steps,
            run.counters.total_steps
        );
        if let Err(e) = ctx.recorder.run_finished(&run).await {
            warn!("Failed to record end of run {}: {:#}", run.id, e);
        }

        let root_causes = analysis::analyze(&results);
        let blockers = root_cause::blocker_count(&root_causes);
        let mut history = ctx.history.clone();
        history.push(RunSummary::from_run(&run, blockers));
        let trend = analysis::trend_report(&history, ctx.baseline);
        let risk = analysis::score(&results, &root_causes, &ctx.risk_profile);
        debug!(
            "Run {} analysis: {} root-cause groups, risk {:?}",
            run.id,
            root_causes.len(),
            risk.level
        );

        if let Err(e) = ctx.recorder.analysis_cached(run.id, &root_causes).await {
            warn!("Failed to cache analysis of run {}: {:#}", run.id, e);
        }

        Ok(RunReport {
            run,
            steps: results,
            root_causes,
            trend,
            risk,
        })
    }

    /// Executes one step in its own task and converts every outcome into a result
    async fn execute_step(
        &self,
        ctx: &RunContext,
        step: &Step,
        index: usize,
        pool: &Arc<ConnectionPool>,
        mapping: &Arc<SchemaMapping>,
    ) -> StepResult {
        let Some(kind) = step.validator() else {
            warn!("Step '{}' uses unknown validator '{}'", step.name, step.validator_type);
            let mut result = blank_result(step, index, StepStatus::Skipped);
            result.error = Some(StepError::new(
                ErrorKind::Configuration,
                format!("validator not found: {}", step.validator_type),
            ));
            return result;
        };

        let step_ctx = StepContext {
            step: step.clone(),
            pool: Arc::clone(pool),
            mapping: Arc::clone(mapping),
            timeout: step.timeout(&ctx.definition.settings),
            row_cap: self.config.default_row_cap,
            sample_size: self.config.default_sample_size,
        };

        debug!("Executing step '{}' ({})", step.name, kind);
        let started_at = chrono::Utc::now();
        let clock = Instant::now();
        let outcome = tokio::spawn(crash::contain(async move { validator_for(kind).validate(&step_ctx).await })).await;
        let duration_ms = clock.elapsed().as_millis() as u64;

        let completed = match outcome {
            Ok(Ok(Ok(verdict))) => Ok(verdict.into_step_result(step, index, started_at, duration_ms)),
            Ok(Ok(Err(e))) => {
                warn!("Step '{}' could not compare: {}", step.name, e);
                let mut result = blank_result(step, index, StepStatus::Failed);
                result.error = Some(StepError::new(e.kind(), e.to_string()));
                Ok(result)
            }
            Ok(Err(crash)) => Err(crash),
            // aborted, or panicked outside the validator poll
            Err(join_error) => Err(Crash {
                message: match join_error.try_into_panic() {
                    Ok(payload) => crash::panic_message(payload.as_ref()),
                    Err(e) => e.to_string(),
                },
                backtrace: None,
            }),
        };

        let mut result = completed.unwrap_or_else(|crash| {
            error!("Validator {} crashed in step '{}': {}", kind, step.name, crash.message);
            let mut trace = format!("panicked in {} validator during step '{}' (#{})", kind, step.name, index + 1);
            if let Some(backtrace) = &crash.backtrace {
                trace.push('\n');
                trace.push_str(backtrace);
            }
            let mut result = blank_result(step, index, StepStatus::Failed);
            result.error = Some(
                StepError::new(ErrorKind::Crash, format!("VALIDATOR_CRASH: {}", crash.message)).with_stack_trace(trace),
            );
            result
        });

        result.validator_type = kind.as_str().to_string();
        result.started_at = started_at;
        result.duration_ms = duration_ms;
        debug!(
            "Step '{}' {} ({}%, {} ms)",
            step.name,
            result.status.as_str(),
            result.match_percentage,
            duration_ms
        );
        result
    }
}

/// A result with no comparison data
fn blank_result(step: &Step, step_index: usize, status: StepStatus) -> StepResult {
    StepResult {
        step_name: step.name.clone(),
        step_index,
        validator_type: step.validator_type.clone(),
        table: step.table_label(),
        status,
        started_at: chrono::Utc::now(),
        duration_ms: 0,
        difference_type: DifferenceType::None,
        source_row_count: None,
        target_row_count: None,
        match_percentage: 0.0,
        affected_columns: Vec::new(),
        comparison: serde_json::Value::Null,
        error: None,
    }
}
