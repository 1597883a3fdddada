//! Run DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::analysis::{RiskAssessment, RootCauseGroup, TrendReport};
use crate::domain::mapping::SchemaMapping;
use crate::domain::pipeline::PipelineDefinition;
use crate::domain::run::Run;
use crate::domain::step::StepResult;

/// Request to execute a pipeline on the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRun {
    pub definition: PipelineDefinition,
    /// Overrides the server's configured schema mapping for this run
    #[serde(default)]
    pub mapping: Option<SchemaMapping>,
}

/// Acknowledgement returned once a run has been accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAccepted {
    pub run_id: Uuid,
    pub pipeline_name: String,
}

/// A run together with its step results, in declaration order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetail {
    pub run: Run,
    pub steps: Vec<StepResult>,
}

/// Everything the engine produces for one finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run: Run,
    pub steps: Vec<StepResult>,
    pub root_causes: Vec<RootCauseGroup>,
    pub trend: TrendReport,
    pub risk: RiskAssessment,
}

impl From<RunReport> for RunDetail {
    fn from(report: RunReport) -> Self {
        Self {
            run: report.run,
            steps: report.steps,
        }
    }
}
