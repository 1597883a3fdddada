//! Run-related API endpoints

use crate::ReconClient;
use crate::error::Result;
use recon_core::domain::analysis::RootCauseGroup;
use recon_core::dto::run::{RunAccepted, RunDetail, SubmitRun};
use uuid::Uuid;

impl ReconClient {
    // =============================================================================
    // Run Lifecycle
    // =============================================================================

    /// Submit a pipeline definition for execution on the server
    ///
    /// Returns as soon as the run is accepted; poll [`ReconClient::get_run`]
    /// for its progress.
    pub async fn submit_run(&self, req: &SubmitRun) -> Result<RunAccepted> {
        tracing::debug!("Submitting pipeline '{}'", req.definition.name);
        let response = self.client.post(self.url("/api/runs")).json(req).send().await?;

        self.handle_response(response).await
    }

    /// Get a run and its step results
    pub async fn get_run(&self, run_id: Uuid) -> Result<RunDetail> {
        let url = self.url(&format!("/api/runs/{}", run_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Request cancellation of a running run
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<()> {
        let url = self.url(&format!("/api/runs/{}/cancel", run_id));
        let response = self.client.post(&url).send().await?;

        self.handle_empty_response(response).await
    }

    /// Root-cause groups of a finished run
    pub async fn get_root_causes(&self, run_id: Uuid) -> Result<Vec<RootCauseGroup>> {
        let url = self.url(&format!("/api/runs/{}/root-causes", run_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
