//! Run context
//!
//! Carries everything one pipeline run needs:
//! - The pipeline definition and schema mapping (immutable for the run)
//! - The connector factory and result recorder
//! - Prior run summaries and the pinned baseline, for the trend pass
//! - The risk profile used for scoring
//! - The cancellation signal

use recon_core::domain::analysis::{RiskProfile, RunSummary};
use recon_core::domain::mapping::SchemaMapping;
use recon_core::domain::pipeline::PipelineDefinition;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::pool::ConnectorFactory;
use crate::recorder::Recorder;

pub struct RunContext {
    pub run_id: Uuid,
    pub definition: PipelineDefinition,
    pub mapping: SchemaMapping,
    pub connectors: Arc<dyn ConnectorFactory>,
    pub recorder: Arc<dyn Recorder>,
    /// Prior runs of the same pipeline, oldest first
    pub history: Vec<RunSummary>,
    pub baseline: Option<Uuid>,
    pub risk_profile: RiskProfile,
    cancel: watch::Receiver<bool>,
}

impl RunContext {
    /// Creates a context with a fresh run id and the handle that cancels it
    pub fn new(
        definition: PipelineDefinition,
        mapping: SchemaMapping,
        connectors: Arc<dyn ConnectorFactory>,
        recorder: Arc<dyn Recorder>,
    ) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let context = Self {
            run_id: Uuid::new_v4(),
            definition,
            mapping,
            connectors,
            recorder,
            history: Vec::new(),
            baseline: None,
            risk_profile: RiskProfile::default(),
            cancel: rx,
        };
        (context, CancelHandle { tx: Arc::new(tx) })
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_history(mut self, history: Vec<RunSummary>, baseline: Option<Uuid>) -> Self {
        self.history = history;
        self.baseline = baseline;
        self
    }

    pub fn with_risk_profile(mut self, risk_profile: RiskProfile) -> Self {
        self.risk_profile = risk_profile;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Requests cancellation of a running pipeline
///
/// The runner observes the request between steps; the step in flight runs
/// to completion or to its own timeout.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}
