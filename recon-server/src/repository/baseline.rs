//! Baseline Repository
//!
//! Handles the pinned baseline run of each pipeline.

use sqlx::PgPool;
use uuid::Uuid;

/// Pin `run_id` as the baseline of a pipeline, replacing any previous one
pub async fn upsert(pool: &PgPool, pipeline_name: &str, run_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO recon_baselines (pipeline_name, run_id, pinned_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (pipeline_name) DO UPDATE
        SET run_id = EXCLUDED.run_id, pinned_at = EXCLUDED.pinned_at
        "#,
    )
    .bind(pipeline_name)
    .bind(run_id)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Find the baseline run of a pipeline
pub async fn find(pool: &PgPool, pipeline_name: &str) -> Result<Option<Uuid>, sqlx::Error> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT run_id FROM recon_baselines WHERE pipeline_name = $1")
        .bind(pipeline_name)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.0))
}

/// Clear the baseline of a pipeline
pub async fn delete(pool: &PgPool, pipeline_name: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM recon_baselines WHERE pipeline_name = $1")
        .bind(pipeline_name)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
