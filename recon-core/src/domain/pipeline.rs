//! Pipeline domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Pipeline definition
///
/// Structure shared between the engine (executes) and the server (accepts on submit).
/// Immutable once a run has started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub settings: PipelineSettings,
    pub steps: Vec<Step>,
}

/// Pipeline-wide execution options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Stop launching steps after the first failed one
    #[serde(default)]
    pub stop_on_first_failure: bool,
    /// Timeout applied to steps that do not declare their own
    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: u64,
    /// Record unknown validator types as skipped instead of rejecting the definition
    #[serde(default)]
    pub lenient_validator_lookup: bool,
}

fn default_timeout_seconds() -> u64 {
    300
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stop_on_first_failure: false,
            default_timeout_seconds: default_timeout_seconds(),
            lenient_validator_lookup: false,
        }
    }
}

/// One declared comparison unit within a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub validator_type: String,
    /// Validator-specific configuration (tables, tolerance, SQL text, ...)
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Table label used to attribute errors during risk scoring
    #[serde(default)]
    pub table: Option<String>,
}

impl Step {
    /// Effective timeout for this step
    pub fn timeout(&self, settings: &PipelineSettings) -> Duration {
        Duration::from_secs(
            self.timeout_seconds
                .unwrap_or(settings.default_timeout_seconds),
        )
    }

    /// Resolves the declared validator type, if it is a known one
    pub fn validator(&self) -> Option<ValidatorType> {
        self.validator_type.parse().ok()
    }

    /// Table this step is about, either the explicit label or the configured source table
    pub fn table_label(&self) -> Option<String> {
        self.table.clone().or_else(|| {
            ["source_table", "table"]
                .iter()
                .find_map(|key| self.config.get(*key).and_then(|v| v.as_str()))
                .map(str::to_string)
        })
    }
}

/// The closed set of comparison primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorType {
    RowCount,
    SchemaShape,
    Aggregate,
    RowDiff,
}

impl ValidatorType {
    pub const ALL: [ValidatorType; 4] = [
        ValidatorType::RowCount,
        ValidatorType::SchemaShape,
        ValidatorType::Aggregate,
        ValidatorType::RowDiff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorType::RowCount => "row_count",
            ValidatorType::SchemaShape => "schema_shape",
            ValidatorType::Aggregate => "aggregate",
            ValidatorType::RowDiff => "row_diff",
        }
    }
}

impl fmt::Display for ValidatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a validator type tag is not one of [`ValidatorType::ALL`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validator not found: {0}")]
pub struct UnknownValidator(pub String);

impl FromStr for ValidatorType {
    type Err = UnknownValidator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ValidatorType::ALL
            .into_iter()
            .find(|v| v.as_str() == normalized)
            .ok_or_else(|| UnknownValidator(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_type_parsing() {
        assert_eq!("row_count".parse(), Ok(ValidatorType::RowCount));
        assert_eq!("Schema-Shape".parse(), Ok(ValidatorType::SchemaShape));
        assert!("checksum".parse::<ValidatorType>().is_err());
    }

    #[test]
    fn test_step_timeout_falls_back_to_settings() {
        let settings = PipelineSettings::default();
        let mut step = Step {
            name: "counts".to_string(),
            validator_type: "row_count".to_string(),
            config: serde_json::json!({ "source_table": "SALES.ORDERS" }),
            timeout_seconds: None,
            table: None,
        };
        assert_eq!(step.timeout(&settings), Duration::from_secs(300));

        step.timeout_seconds = Some(5);
        assert_eq!(step.timeout(&settings), Duration::from_secs(5));
        assert_eq!(step.table_label().as_deref(), Some("SALES.ORDERS"));
    }

    #[test]
    fn test_definition_defaults() {
        let json = serde_json::json!({
            "name": "nightly",
            "steps": [{ "name": "a", "validator_type": "row_count" }]
        });
        let def: PipelineDefinition = serde_json::from_value(json).unwrap();
        assert!(!def.settings.stop_on_first_failure);
        assert_eq!(def.settings.default_timeout_seconds, 300);
        assert!(def.steps[0].config.is_null());
    }
}
