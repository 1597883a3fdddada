//! Analysis Cache Repository
//!
//! Stores the root-cause groups computed for finished runs.

use recon_core::domain::analysis::RootCauseGroup;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

/// Store (or replace) the cached groups of a run
pub async fn upsert(
    pool: &PgPool,
    run_id: Uuid,
    ruleset_version: &str,
    groups: &[RootCauseGroup],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO recon_analysis_cache (run_id, ruleset_version, groups, computed_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (run_id) DO UPDATE
        SET ruleset_version = EXCLUDED.ruleset_version,
            groups = EXCLUDED.groups,
            computed_at = EXCLUDED.computed_at
        "#,
    )
    .bind(run_id)
    .bind(ruleset_version)
    .bind(Json(groups))
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Cached groups of a run, if computed with `ruleset_version`
pub async fn find(
    pool: &PgPool,
    run_id: Uuid,
    ruleset_version: &str,
) -> Result<Option<Vec<RootCauseGroup>>, sqlx::Error> {
    let row: Option<(Json<Vec<RootCauseGroup>>,)> = sqlx::query_as(
        "SELECT groups FROM recon_analysis_cache WHERE run_id = $1 AND ruleset_version = $2",
    )
    .bind(run_id)
    .bind(ruleset_version)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.0.0))
}
