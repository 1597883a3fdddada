//! Pipeline analytics API endpoints

use crate::ReconClient;
use crate::error::Result;
use recon_core::domain::analysis::RunSummary;
use recon_core::dto::analytics::{AnalyticsReport, SetBaseline};
use uuid::Uuid;

impl ReconClient {
    // =============================================================================
    // History & Trends
    // =============================================================================

    /// The `window` most recent finished runs of a pipeline, oldest first
    pub async fn list_runs(&self, pipeline: &str, window: usize) -> Result<Vec<RunSummary>> {
        let url = self.url(&format!("/api/pipelines/{}/runs", pipeline));
        let response = self
            .client
            .get(&url)
            .query(&[("window", window)])
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Trend, velocity and summary over the `window` most recent runs
    pub async fn get_analytics(&self, pipeline: &str, window: usize) -> Result<AnalyticsReport> {
        let url = self.url(&format!("/api/pipelines/{}/analytics", pipeline));
        let response = self
            .client
            .get(&url)
            .query(&[("window", window)])
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Baselines
    // =============================================================================

    /// Pin a finished run as the pipeline's comparison anchor
    pub async fn set_baseline(&self, pipeline: &str, run_id: Uuid) -> Result<()> {
        let url = self.url(&format!("/api/pipelines/{}/baseline", pipeline));
        let response = self.client.put(&url).json(&SetBaseline { run_id }).send().await?;

        self.handle_empty_response(response).await
    }

    /// Clear the pipeline's pinned baseline
    pub async fn clear_baseline(&self, pipeline: &str) -> Result<()> {
        let url = self.url(&format!("/api/pipelines/{}/baseline", pipeline));
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
