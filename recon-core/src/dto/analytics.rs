//! Analytics DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::analysis::{AnalyticsSummary, RunSummary, TrendMetric, Velocity};

/// Read contract served to any analytics caller (UI, CLI, automated report)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub pipeline_name: String,
    pub window: usize,
    /// Chronological, oldest first
    pub runs: Vec<RunSummary>,
    pub baseline: Option<Uuid>,
    pub trends: Vec<TrendMetric>,
    pub velocity: Option<Velocity>,
    pub summary: Option<AnalyticsSummary>,
}

/// Request to pin a baseline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetBaseline {
    pub run_id: Uuid,
}

/// Query parameters selecting the N most recent runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowQuery {
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_window() -> usize {
    10
}

impl Default for WindowQuery {
    fn default() -> Self {
        Self {
            window: default_window(),
        }
    }
}
