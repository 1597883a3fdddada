//! Schema-shape validator
//!
//! Compares column sets, type categories and nullability of a table pair.
//! Declared types differ between engines (`NUMBER(38,0)` vs `integer`), so
//! types are compared by category rather than by name.

use async_trait::async_trait;
use recon_core::domain::step::DifferenceType;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;

use super::{StepContext, Validator, Verdict, parse_config, percentage, require_non_empty};
use crate::error::ValidationError;
use crate::pool::ColumnSpec;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaShapeConfig {
    pub source_table: String,
    #[serde(default)]
    pub target_table: Option<String>,
}

pub struct SchemaShapeValidator;

#[async_trait]
impl Validator for SchemaShapeValidator {
    fn check_config(&self, config: &Value) -> Result<(), String> {
        let config: SchemaShapeConfig = parse_config(config)?;
        require_non_empty("source_table", &config.source_table)
    }

    async fn validate(&self, ctx: &StepContext) -> Result<Verdict, ValidationError> {
        let config: SchemaShapeConfig = ctx.config()?;
        let target_table = config.target_table.as_deref().unwrap_or(&config.source_table);

        let (source, target) = ctx.describe_both(&config.source_table, target_table).await?;
        Ok(compare_shapes(&source, &target))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCategory {
    Numeric,
    Text,
    Temporal,
    Boolean,
    Binary,
    Structured,
    Other,
}

fn type_category(declared: &str) -> TypeCategory {
    let base = declared
        .split('(')
        .next()
        .unwrap_or(declared)
        .trim()
        .to_ascii_lowercase();

    match base.as_str() {
        "smallint" | "integer" | "int" | "int2" | "int4" | "int8" | "bigint" | "tinyint" | "byteint"
        | "number" | "numeric" | "decimal" | "real" | "float" | "float4" | "float8" | "double"
        | "double precision" | "smallserial" | "serial" | "bigserial" | "money" => TypeCategory::Numeric,
        "text" | "varchar" | "character varying" | "char" | "character" | "bpchar" | "string" | "name"
        | "nvarchar" | "nchar" | "citext" | "uuid" => TypeCategory::Text,
        "boolean" | "bool" => TypeCategory::Boolean,
        "bytea" | "binary" | "varbinary" | "blob" => TypeCategory::Binary,
        "json" | "jsonb" | "variant" | "object" | "array" => TypeCategory::Structured,
        b if b.starts_with("timestamp") || b.starts_with("time") || b == "date" || b == "datetime" => {
            TypeCategory::Temporal
        }
        _ => TypeCategory::Other,
    }
}

fn types_compatible(a: &str, b: &str) -> bool {
    match (type_category(a), type_category(b)) {
        (TypeCategory::Other, TypeCategory::Other) => a.trim().eq_ignore_ascii_case(b.trim()),
        (x, y) => x == y,
    }
}

pub(crate) fn compare_shapes(source: &[ColumnSpec], target: &[ColumnSpec]) -> Verdict {
    let target_by_name: HashMap<String, &ColumnSpec> = target
        .iter()
        .map(|c| (c.name.to_ascii_uppercase(), c))
        .collect();
    let source_names: Vec<String> = source.iter().map(|c| c.name.to_ascii_uppercase()).collect();

    let mut missing_in_target = Vec::new();
    let mut type_mismatches = Vec::new();
    let mut nullability_mismatches = Vec::new();
    let mut affected = Vec::new();
    let mut matched = 0u64;

    for column in source {
        let Some(other) = target_by_name.get(&column.name.to_ascii_uppercase()) else {
            missing_in_target.push(column.name.clone());
            affected.push(column.name.clone());
            continue;
        };

        if !types_compatible(&column.data_type, &other.data_type) {
            type_mismatches.push(json!({
                "column": column.name,
                "source_type": column.data_type,
                "target_type": other.data_type,
            }));
            affected.push(column.name.clone());
        } else if column.nullable != other.nullable {
            nullability_mismatches.push(json!({
                "column": column.name,
                "source_nullable": column.nullable,
                "target_nullable": other.nullable,
            }));
            affected.push(column.name.clone());
        } else {
            matched += 1;
        }
    }

    let missing_in_source: Vec<String> = target
        .iter()
        .filter(|c| !source_names.contains(&c.name.to_ascii_uppercase()))
        .map(|c| c.name.clone())
        .collect();
    affected.extend(missing_in_source.iter().cloned());

    let union = (source.len() + missing_in_source.len()) as u64;
    let match_pct = percentage(matched, union);
    let structural = !missing_in_target.is_empty() || !missing_in_source.is_empty() || !type_mismatches.is_empty();
    let nullability_only = !structural && !nullability_mismatches.is_empty();

    let comparison = json!({
        "source_columns": source.len(),
        "target_columns": target.len(),
        "missing_in_target": missing_in_target,
        "missing_in_source": missing_in_source,
        "type_mismatches": type_mismatches,
        "nullability_mismatches": nullability_mismatches,
        "nullability_only": nullability_only,
    });

    let verdict = if structural {
        Verdict::failed(DifferenceType::ShapeMismatch, match_pct)
    } else if nullability_only {
        Verdict::warning(DifferenceType::ShapeMismatch, match_pct)
    } else {
        Verdict::passed(100.0)
    };

    verdict.with_affected_columns(affected).with_comparison(comparison)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::domain::step::StepStatus;

    fn col(name: &str, ty: &str, nullable: bool) -> ColumnSpec {
        ColumnSpec::new(name, ty, nullable)
    }

    #[test]
    fn test_identical_shapes_pass() {
        let source = vec![col("ID", "integer", false), col("NAME", "varchar(50)", true)];
        let target = vec![col("id", "NUMBER(38,0)", false), col("name", "TEXT", true)];
        let verdict = compare_shapes(&source, &target);
        assert_eq!(verdict.status, StepStatus::Passed);
        assert_eq!(verdict.match_percentage, 100.0);
    }

    #[test]
    fn test_missing_and_mistyped_columns_fail() {
        let source = vec![
            col("ID", "integer", false),
            col("CREATED", "timestamp", false),
            col("LEGACY", "text", true),
        ];
        let target = vec![
            col("ID", "integer", false),
            col("CREATED", "varchar", false),
            col("EXTRA", "text", true),
        ];
        let verdict = compare_shapes(&source, &target);
        assert_eq!(verdict.status, StepStatus::Failed);
        assert_eq!(verdict.difference_type, DifferenceType::ShapeMismatch);
        // ID matches out of ID, CREATED, LEGACY, EXTRA
        assert_eq!(verdict.match_percentage, 25.0);
        assert_eq!(verdict.affected_columns, vec!["CREATED", "LEGACY", "EXTRA"]);
        assert_eq!(verdict.comparison["missing_in_target"], json!(["LEGACY"]));
    }

    #[test]
    fn test_nullability_only_is_a_warning() {
        let source = vec![col("ID", "integer", false), col("EMAIL", "text", false)];
        let target = vec![col("ID", "integer", false), col("EMAIL", "text", true)];
        let verdict = compare_shapes(&source, &target);
        assert_eq!(verdict.status, StepStatus::Warning);
        assert_eq!(verdict.match_percentage, 50.0);
        assert_eq!(verdict.comparison["nullability_only"], json!(true));
    }

    #[test]
    fn test_type_categories() {
        assert!(types_compatible("DATE", "timestamp without time zone"));
        assert!(types_compatible("numeric(10,2)", "DOUBLE PRECISION"));
        assert!(!types_compatible("boolean", "integer"));
        assert!(types_compatible("geometry", "GEOMETRY"));
    }
}
