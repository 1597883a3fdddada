//! Core domain types
//!
//! This module contains the core domain structures used across Recon services.
//! These types represent the fundamental business entities and are shared between
//! the engine (which produces them), the server (which persists them) and the CLI.

pub mod analysis;
pub mod mapping;
pub mod pipeline;
pub mod run;
pub mod step;
