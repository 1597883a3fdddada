use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Runs and their aggregate counters
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recon_runs (
            id UUID PRIMARY KEY,
            pipeline_name VARCHAR(255) NOT NULL,
            status VARCHAR(20) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            started_at TIMESTAMPTZ,
            finished_at TIMESTAMPTZ,
            failure_reason TEXT,
            total_steps INTEGER NOT NULL DEFAULT 0,
            passed_steps INTEGER NOT NULL DEFAULT 0,
            failed_steps INTEGER NOT NULL DEFAULT 0,
            warning_steps INTEGER NOT NULL DEFAULT 0,
            skipped_steps INTEGER NOT NULL DEFAULT 0,
            error_count INTEGER NOT NULL DEFAULT 0,
            blocker_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per step, in declaration order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recon_step_results (
            run_id UUID NOT NULL REFERENCES recon_runs(id) ON DELETE CASCADE,
            step_index INTEGER NOT NULL,
            step_name VARCHAR(255) NOT NULL,
            validator_type VARCHAR(50) NOT NULL,
            table_name VARCHAR(255),
            status VARCHAR(20) NOT NULL,
            started_at TIMESTAMPTZ NOT NULL,
            duration_ms BIGINT NOT NULL,
            difference_type VARCHAR(30) NOT NULL,
            source_row_count BIGINT,
            target_row_count BIGINT,
            match_percentage DOUBLE PRECISION NOT NULL,
            affected_columns TEXT[] NOT NULL DEFAULT '{}',
            comparison JSONB NOT NULL DEFAULT 'null',
            error JSONB,
            PRIMARY KEY (run_id, step_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Pinned comparison anchor per pipeline
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recon_baselines (
            pipeline_name VARCHAR(255) PRIMARY KEY,
            run_id UUID NOT NULL REFERENCES recon_runs(id) ON DELETE CASCADE,
            pinned_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Derived root-cause groups; safe to drop at any time
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recon_analysis_cache (
            run_id UUID PRIMARY KEY REFERENCES recon_runs(id) ON DELETE CASCADE,
            ruleset_version VARCHAR(50) NOT NULL,
            groups JSONB NOT NULL,
            computed_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recon_runs_pipeline ON recon_runs(pipeline_name, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_recon_runs_status ON recon_runs(status)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
