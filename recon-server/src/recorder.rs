//! PostgreSQL result recorder
//!
//! Persists run lifecycle, step results and cached analysis through the
//! repositories. The engine treats every call as fire-and-log.

use anyhow::Context;
use async_trait::async_trait;
use recon_core::domain::analysis::RootCauseGroup;
use recon_core::domain::run::Run;
use recon_core::domain::step::StepResult;
use recon_engine::Recorder;
use recon_engine::analysis::{RULESET_VERSION, blocker_count};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{analysis_repository, run_repository, step_repository};

pub struct PgRecorder {
    pool: PgPool,
}

impl PgRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Recorder for PgRecorder {
    async fn run_started(&self, run: &Run) -> anyhow::Result<()> {
        run_repository::upsert(&self.pool, run)
            .await
            .with_context(|| format!("failed to store run {}", run.id))
    }

    async fn step_recorded(&self, run_id: Uuid, step: &StepResult) -> anyhow::Result<()> {
        step_repository::insert(&self.pool, run_id, step)
            .await
            .with_context(|| format!("failed to store step '{}' of run {}", step.step_name, run_id))
    }

    async fn run_finished(&self, run: &Run) -> anyhow::Result<()> {
        run_repository::upsert(&self.pool, run)
            .await
            .with_context(|| format!("failed to finalize run {}", run.id))
    }

    async fn analysis_cached(&self, run_id: Uuid, groups: &[RootCauseGroup]) -> anyhow::Result<()> {
        run_repository::update_blocker_count(&self.pool, run_id, blocker_count(groups))
            .await
            .with_context(|| format!("failed to store blocker count of run {}", run_id))?;

        analysis_repository::upsert(&self.pool, run_id, RULESET_VERSION, groups)
            .await
            .with_context(|| format!("failed to cache analysis of run {}", run_id))
    }
}
