//! Repository Module
//!
//! Data access layer for the server.
//! Each repository handles database operations for a specific table.

pub mod analysis;
pub mod baseline;
pub mod run;
pub mod step;

// Re-export for convenience
pub use analysis as analysis_repository;
pub use baseline as baseline_repository;
pub use run as run_repository;
pub use step as step_repository;
