//! Recon Engine
//!
//! Executes reconciliation pipelines against a source system and a target
//! warehouse and analyses the results.
//!
//! Architecture:
//! - Rewriter: translates schema namespaces in target-side query text
//! - Pool: one timed, retrying handle per system
//! - Validators: row-count, schema-shape, aggregate and row-diff comparisons
//! - Runner: step lifecycle, error containment, cancellation
//! - Analysis: root-cause grouping, trend/velocity and risk/cost scoring
//! - Recorder: write-only sink for run and step outcomes

pub mod analysis;
pub mod config;
pub mod context;
pub mod crash;
pub mod error;
pub mod loader;
pub mod pool;
pub mod recorder;
pub mod rewriter;
pub mod runner;
pub mod validators;

pub use config::EngineConfig;
pub use context::{CancelHandle, RunContext};
pub use error::{ConfigError, EngineError, PoolError};
pub use recorder::{InMemoryRecorder, Recorder};
pub use runner::PipelineRunner;
