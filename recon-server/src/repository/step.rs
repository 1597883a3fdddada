//! Step Result Repository
//!
//! Handles all database operations related to step results.

use recon_core::domain::step::{DifferenceType, StepError, StepResult, StepStatus};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

/// Insert one step result
pub async fn insert(pool: &PgPool, run_id: Uuid, step: &StepResult) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO recon_step_results (run_id, step_index, step_name, validator_type, table_name,
                                        status, started_at, duration_ms, difference_type,
                                        source_row_count, target_row_count, match_percentage,
                                        affected_columns, comparison, error)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(run_id)
    .bind(step.step_index as i32)
    .bind(&step.step_name)
    .bind(&step.validator_type)
    .bind(&step.table)
    .bind(step.status.as_str())
    .bind(step.started_at)
    .bind(step.duration_ms as i64)
    .bind(step.difference_type.as_str())
    .bind(step.source_row_count.map(|n| n as i64))
    .bind(step.target_row_count.map(|n| n as i64))
    .bind(step.match_percentage)
    .bind(&step.affected_columns)
    .bind(Json(&step.comparison))
    .bind(step.error.as_ref().map(Json))
    .execute(pool)
    .await?;

    Ok(())
}

/// All step results of a run, in declaration order
pub async fn find_by_run(pool: &PgPool, run_id: Uuid) -> Result<Vec<StepResult>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StepRow>(
        r#"
        SELECT step_index, step_name, validator_type, table_name, status, started_at,
               duration_ms, difference_type, source_row_count, target_row_count,
               match_percentage, affected_columns, comparison, error
        FROM recon_step_results
        WHERE run_id = $1
        ORDER BY step_index ASC
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct StepRow {
    step_index: i32,
    step_name: String,
    validator_type: String,
    table_name: Option<String>,
    status: String,
    started_at: chrono::DateTime<chrono::Utc>,
    duration_ms: i64,
    difference_type: String,
    source_row_count: Option<i64>,
    target_row_count: Option<i64>,
    match_percentage: f64,
    affected_columns: Vec<String>,
    comparison: Json<serde_json::Value>,
    error: Option<Json<StepError>>,
}

impl From<StepRow> for StepResult {
    fn from(row: StepRow) -> Self {
        StepResult {
            step_name: row.step_name,
            step_index: row.step_index.max(0) as usize,
            validator_type: row.validator_type,
            table: row.table_name,
            status: StepStatus::parse(&row.status).unwrap_or(StepStatus::Failed),
            started_at: row.started_at,
            duration_ms: row.duration_ms.max(0) as u64,
            difference_type: DifferenceType::parse(&row.difference_type).unwrap_or(DifferenceType::None),
            source_row_count: row.source_row_count.map(|n| n.max(0) as u64),
            target_row_count: row.target_row_count.map(|n| n.max(0) as u64),
            match_percentage: row.match_percentage,
            affected_columns: row.affected_columns,
            comparison: row.comparison.0,
            error: row.error.map(|e| e.0),
        }
    }
}
