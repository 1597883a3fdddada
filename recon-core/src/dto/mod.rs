//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs used between Recon components (engine, server,
//! client, CLI). DTOs are lightweight compositions of domain entities shaped
//! for network transfer.

pub mod analytics;
pub mod run;
