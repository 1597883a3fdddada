//! Document loading and definition validation
//!
//! Pipeline definitions, schema mappings and risk profiles are YAML or JSON
//! documents. The format is chosen by file extension; anything that is not
//! `.json` is parsed as YAML (a superset of JSON).

use recon_core::domain::analysis::RiskProfile;
use recon_core::domain::mapping::SchemaMapping;
use recon_core::domain::pipeline::PipelineDefinition;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;

use crate::error::ConfigError;
use crate::validators::validator_for;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

/// Parses a document of the given format
pub fn parse<T: DeserializeOwned>(text: &str, format: Format, what: &str) -> Result<T, ConfigError> {
    let parsed = match format {
        Format::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        Format::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
    };
    parsed.map_err(|reason| ConfigError::Parse {
        what: what.to_string(),
        reason,
    })
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Loads and validates a pipeline definition
pub fn load_definition(path: &Path) -> Result<PipelineDefinition, ConfigError> {
    let definition: PipelineDefinition = parse(&read(path)?, Format::from_path(path), "pipeline definition")?;
    validate_definition(&definition)?;
    Ok(definition)
}

/// Loads a schema mapping; a path that does not exist is a missing mapping
pub fn load_mapping(path: &Path) -> Result<SchemaMapping, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingMapping(path.display().to_string()));
    }
    parse(&read(path)?, Format::from_path(path), "schema mapping")
}

pub fn load_risk_profile(path: &Path) -> Result<RiskProfile, ConfigError> {
    parse(&read(path)?, Format::from_path(path), "risk profile")
}

/// Rejects definitions the runner must never start
///
/// Checks the step list, step names, timeouts, validator types (unless
/// lenient lookup is enabled) and each known validator's configuration.
pub fn validate_definition(definition: &PipelineDefinition) -> Result<(), ConfigError> {
    if definition.name.trim().is_empty() {
        return Err(ConfigError::InvalidPipeline("pipeline name must not be empty".to_string()));
    }
    if definition.steps.is_empty() {
        return Err(ConfigError::InvalidPipeline(format!(
            "pipeline '{}' declares no steps",
            definition.name
        )));
    }
    if definition.settings.default_timeout_seconds == 0 {
        return Err(ConfigError::InvalidPipeline(
            "default_timeout_seconds must be greater than 0".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for (index, step) in definition.steps.iter().enumerate() {
        let name = step.name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidPipeline(format!("step #{} has an empty name", index + 1)));
        }
        if !seen.insert(name.to_string()) {
            return Err(ConfigError::InvalidPipeline(format!("duplicate step name '{}'", name)));
        }
        if step.timeout_seconds == Some(0) {
            return Err(ConfigError::InvalidStep {
                step: step.name.clone(),
                reason: "timeout_seconds must be greater than 0".to_string(),
            });
        }

        match step.validator() {
            Some(kind) => validator_for(kind)
                .check_config(&step.config)
                .map_err(|reason| ConfigError::InvalidStep {
                    step: step.name.clone(),
                    reason,
                })?,
            None if definition.settings.lenient_validator_lookup => {}
            None => {
                return Err(ConfigError::UnknownValidator {
                    step: step.name.clone(),
                    validator_type: step.validator_type.clone(),
                });
            }
        }
    }

    Ok(())
}
