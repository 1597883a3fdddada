//! Shared server state

use recon_core::domain::analysis::RiskProfile;
use recon_core::domain::mapping::SchemaMapping;
use recon_engine::pool::ConnectorFactory;
use recon_engine::{CancelHandle, EngineConfig};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Cheap to clone; handed to every handler by axum
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub engine: Arc<EngineSettings>,
    pub active_runs: ActiveRuns,
}

/// What every server-triggered run is executed with
pub struct EngineSettings {
    pub config: EngineConfig,
    pub connectors: Arc<dyn ConnectorFactory>,
    pub default_mapping: SchemaMapping,
    pub risk_profile: RiskProfile,
}

/// Cancel handles of runs executing in this process
#[derive(Clone, Default)]
pub struct ActiveRuns {
    inner: Arc<Mutex<HashMap<Uuid, CancelHandle>>>,
}

impl ActiveRuns {
    pub fn insert(&self, run_id: Uuid, handle: CancelHandle) {
        self.inner.lock().unwrap().insert(run_id, handle);
    }

    pub fn remove(&self, run_id: Uuid) {
        self.inner.lock().unwrap().remove(&run_id);
    }

    /// Signals cancellation; false when the run is not executing here
    pub fn cancel(&self, run_id: Uuid) -> bool {
        match self.inner.lock().unwrap().get(&run_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::domain::pipeline::{PipelineDefinition, PipelineSettings};
    use recon_engine::RunContext;
    use recon_engine::pool::memory::{MemoryConnector, MemoryConnectorFactory};
    use recon_engine::recorder::NoopRecorder;

    #[test]
    fn test_cancel_reaches_registered_run() {
        let definition = PipelineDefinition {
            name: "nightly".to_string(),
            description: None,
            settings: PipelineSettings::default(),
            steps: Vec::new(),
        };
        let factory = MemoryConnectorFactory::new(MemoryConnector::new(), MemoryConnector::new());
        let (ctx, handle) = RunContext::new(definition, SchemaMapping::default(), Arc::new(factory), Arc::new(NoopRecorder));

        let active = ActiveRuns::default();
        active.insert(ctx.run_id, handle);
        assert_eq!(active.len(), 1);

        assert!(active.cancel(ctx.run_id));
        assert!(ctx.is_cancelled());
        assert!(!active.cancel(Uuid::new_v4()));

        active.remove(ctx.run_id);
        assert!(active.is_empty());
    }
}
