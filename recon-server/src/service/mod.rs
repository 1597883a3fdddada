//! Service Module
//!
//! Business logic layer for the server.
//! Services orchestrate between the engine and the repositories.

pub mod analytics;
pub mod run;

// Re-export for convenience
pub use analytics as analytics_service;
pub use run as run_service;
