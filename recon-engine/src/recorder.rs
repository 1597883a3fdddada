//! Result recorder
//!
//! Write-only sink for run and step outcomes. The engine never reads back
//! through this interface; analytics read from the backing store directly.
//! Recording failures are logged by the runner and never fail a run.

use async_trait::async_trait;
use recon_core::domain::analysis::RootCauseGroup;
use recon_core::domain::run::Run;
use recon_core::domain::step::StepResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

#[async_trait]
pub trait Recorder: Send + Sync {
    /// Called once the run has transitioned to running
    async fn run_started(&self, run: &Run) -> anyhow::Result<()>;

    /// Called once per step, in declaration order
    async fn step_recorded(&self, run_id: Uuid, step: &StepResult) -> anyhow::Result<()>;

    /// Called with the run in its terminal state
    async fn run_finished(&self, run: &Run) -> anyhow::Result<()>;

    /// Caches the root-cause groups computed for a run
    async fn analysis_cached(&self, run_id: Uuid, groups: &[RootCauseGroup]) -> anyhow::Result<()>;
}

/// Records nothing
pub struct NoopRecorder;

#[async_trait]
impl Recorder for NoopRecorder {
    async fn run_started(&self, _run: &Run) -> anyhow::Result<()> {
        Ok(())
    }

    async fn step_recorded(&self, _run_id: Uuid, _step: &StepResult) -> anyhow::Result<()> {
        Ok(())
    }

    async fn run_finished(&self, _run: &Run) -> anyhow::Result<()> {
        Ok(())
    }

    async fn analysis_cached(&self, _run_id: Uuid, _groups: &[RootCauseGroup]) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Recorded {
    runs: HashMap<Uuid, Run>,
    steps: HashMap<Uuid, Vec<StepResult>>,
    analyses: HashMap<Uuid, Vec<RootCauseGroup>>,
}

/// In-memory recorder
///
/// Uses Arc<Mutex<..>> so clones handed to a runner share state with the
/// caller that inspects it afterwards.
#[derive(Clone, Default)]
pub struct InMemoryRecorder {
    inner: Arc<Mutex<Recorded>>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest recorded state of a run
    pub fn run(&self, run_id: Uuid) -> Option<Run> {
        self.lock().runs.get(&run_id).cloned()
    }

    pub fn steps(&self, run_id: Uuid) -> Vec<StepResult> {
        self.lock().steps.get(&run_id).cloned().unwrap_or_default()
    }

    pub fn analysis(&self, run_id: Uuid) -> Option<Vec<RootCauseGroup>> {
        self.lock().analyses.get(&run_id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Recorder for InMemoryRecorder {
    async fn run_started(&self, run: &Run) -> anyhow::Result<()> {
        self.lock().runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn step_recorded(&self, run_id: Uuid, step: &StepResult) -> anyhow::Result<()> {
        self.lock().steps.entry(run_id).or_default().push(step.clone());
        Ok(())
    }

    async fn run_finished(&self, run: &Run) -> anyhow::Result<()> {
        self.lock().runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn analysis_cached(&self, run_id: Uuid, groups: &[RootCauseGroup]) -> anyhow::Result<()> {
        self.lock().analyses.insert(run_id, groups.to_vec());
        Ok(())
    }
}
