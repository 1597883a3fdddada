//! Error types for the engine

use recon_core::domain::mapping::SystemId;
use recon_core::domain::run::InvalidTransition;
use recon_core::domain::step::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Errors that stop a run from producing a report
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] InvalidTransition),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Problems with the pipeline, mapping or step configuration
///
/// Always surfaced before any connection is opened; a run that hits one of
/// these never transitions to running.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid pipeline configuration: {0}")]
    InvalidPipeline(String),

    #[error("invalid pipeline configuration: step '{step}' uses unknown validator '{validator_type}'")]
    UnknownValidator {
        step: String,
        validator_type: String,
    },

    #[error("invalid pipeline configuration: step '{step}': {reason}")]
    InvalidStep { step: String, reason: String },

    #[error("missing schema mapping: {0}")]
    MissingMapping(String),

    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures surfaced by the connection pool
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    #[error("TIMEOUT_ERROR: {system} call exceeded {after:?}")]
    Timeout { system: SystemId, after: Duration },

    #[error("CONNECTION_ERROR: {system}: {message}")]
    Connection { system: SystemId, message: String },

    #[error("QUERY_ERROR: {system}: {message}")]
    Query { system: SystemId, message: String },
}

impl PoolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::Timeout { .. } => ErrorKind::Timeout,
            PoolError::Connection { .. } => ErrorKind::Connection,
            PoolError::Query { .. } => ErrorKind::Query,
        }
    }
}

/// Errors a validator can return instead of a verdict
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("{0}")]
    Config(String),

    #[error("unexpected result shape: {0}")]
    ResultShape(String),
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::Pool(e) => e.kind(),
            ValidationError::Config(_) => ErrorKind::Configuration,
            ValidationError::ResultShape(_) => ErrorKind::Query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_kinds() {
        let timeout = PoolError::Timeout {
            system: SystemId::Target,
            after: Duration::from_secs(1),
        };
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert!(timeout.to_string().starts_with("TIMEOUT_ERROR"));

        let err: ValidationError = PoolError::Query {
            system: SystemId::Source,
            message: "permission denied".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Query);
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::UnknownValidator {
            step: "x".to_string(),
            validator_type: "checksum".to_string(),
        };
        assert!(err.to_string().contains("invalid pipeline configuration"));
    }
}
