//! Run Repository
//!
//! Handles all database operations related to runs.

use recon_core::domain::analysis::RunSummary;
use recon_core::domain::run::{Run, RunCounters, RunStatus};
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a run, or overwrite its lifecycle fields if it already exists
pub async fn upsert(pool: &PgPool, run: &Run) -> Result<(), sqlx::Error> {
    let c = &run.counters;

    sqlx::query(
        r#"
        INSERT INTO recon_runs (id, pipeline_name, status, started_at, finished_at, failure_reason,
                                total_steps, passed_steps, failed_steps, warning_steps,
                                skipped_steps, error_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (id) DO UPDATE
        SET status = EXCLUDED.status,
            started_at = EXCLUDED.started_at,
            finished_at = EXCLUDED.finished_at,
            failure_reason = EXCLUDED.failure_reason,
            total_steps = EXCLUDED.total_steps,
            passed_steps = EXCLUDED.passed_steps,
            failed_steps = EXCLUDED.failed_steps,
            warning_steps = EXCLUDED.warning_steps,
            skipped_steps = EXCLUDED.skipped_steps,
            error_count = EXCLUDED.error_count
        "#,
    )
    .bind(run.id)
    .bind(&run.pipeline_name)
    .bind(run.status.as_str())
    .bind(run.started_at)
    .bind(run.finished_at)
    .bind(&run.failure_reason)
    .bind(c.total_steps as i32)
    .bind(c.passed_steps as i32)
    .bind(c.failed_steps as i32)
    .bind(c.warning_steps as i32)
    .bind(c.skipped_steps as i32)
    .bind(c.error_count as i32)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a run by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Run>, sqlx::Error> {
    let row = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, pipeline_name, status, started_at, finished_at, failure_reason,
               total_steps, passed_steps, failed_steps, warning_steps, skipped_steps,
               error_count, blocker_count
        FROM recon_runs
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Summaries of the `limit` most recent finished runs of a pipeline, oldest first
pub async fn find_recent_summaries(
    pool: &PgPool,
    pipeline_name: &str,
    limit: usize,
) -> Result<Vec<RunSummary>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, pipeline_name, status, started_at, finished_at, failure_reason,
               total_steps, passed_steps, failed_steps, warning_steps, skipped_steps,
               error_count, blocker_count
        FROM recon_runs
        WHERE pipeline_name = $1 AND status IN ('completed', 'failed')
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(pipeline_name)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    let mut summaries: Vec<RunSummary> = rows.into_iter().map(RunRow::into_summary).collect();
    summaries.reverse();
    Ok(summaries)
}

/// Record the blocker count derived by root-cause analysis
pub async fn update_blocker_count(pool: &PgPool, id: Uuid, blocker_count: u32) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE recon_runs SET blocker_count = $1 WHERE id = $2")
        .bind(blocker_count as i32)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Mark runs left in a non-terminal state by a previous process as failed
pub async fn fail_abandoned(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE recon_runs
        SET status = 'failed', finished_at = now(), failure_reason = 'server restarted during run'
        WHERE status IN ('pending', 'running')
        "#,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    pipeline_name: String,
    status: String,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
    failure_reason: Option<String>,
    total_steps: i32,
    passed_steps: i32,
    failed_steps: i32,
    warning_steps: i32,
    skipped_steps: i32,
    error_count: i32,
    blocker_count: i32,
}

impl RunRow {
    fn into_summary(self) -> RunSummary {
        let blocker_count = self.blocker_count.max(0) as u32;
        RunSummary::from_run(&self.into(), blocker_count)
    }
}

impl From<RunRow> for Run {
    fn from(row: RunRow) -> Self {
        Run {
            id: row.id,
            pipeline_name: row.pipeline_name,
            status: RunStatus::parse(&row.status).unwrap_or(RunStatus::Pending),
            started_at: row.started_at,
            finished_at: row.finished_at,
            failure_reason: row.failure_reason,
            counters: RunCounters {
                total_steps: row.total_steps.max(0) as u32,
                passed_steps: row.passed_steps.max(0) as u32,
                failed_steps: row.failed_steps.max(0) as u32,
                warning_steps: row.warning_steps.max(0) as u32,
                skipped_steps: row.skipped_steps.max(0) as u32,
                error_count: row.error_count.max(0) as u32,
            },
        }
    }
}
