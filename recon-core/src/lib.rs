//! Recon Core
//!
//! Core types and abstractions for the Recon migration reconciliation system.
//!
//! This crate contains:
//! - Domain types: Core business entities (PipelineDefinition, Run, StepResult, etc.)
//! - DTOs: Data transfer objects for inter-service communication

pub mod domain;
pub mod dto;
