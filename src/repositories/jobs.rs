use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::Job;
use crate::db::types::{JobKind, JobStatus};

const COLUMNS: &str = "\
    id, tenant_id, lesson_id, kind, payload, status, attempts, max_attempts, run_at, \
    started_at, finished_at, last_error, idempotency_key, created_at, updated_at";

pub struct EnqueueJob<'a> {
    pub id: &'a str,
    pub tenant_id: &'a str,
    pub lesson_id: Option<&'a str>,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub max_attempts: i32,
    pub run_at: PrimitiveDateTime,
    pub idempotency_key: &'a str,
    pub now: PrimitiveDateTime,
}

/// Inserts one unit of work. `ON CONFLICT DO NOTHING` over the idempotency
/// key and the one-active-job-per-lesson index turns a duplicate concurrent
/// dispatch into a no-op; the return value says whether a row landed.
pub async fn enqueue(
    executor: impl PgExecutor<'_>,
    params: EnqueueJob<'_>,
) -> Result<bool, sqlx::Error> {
    let inserted = sqlx::query(
        "INSERT INTO jobs (
            id, tenant_id, lesson_id, kind, payload, status, attempts, max_attempts,
            run_at, idempotency_key, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6,0,$7,$8,$9,$10,$10)
         ON CONFLICT DO NOTHING",
    )
    .bind(params.id)
    .bind(params.tenant_id)
    .bind(params.lesson_id)
    .bind(params.kind)
    .bind(Json(params.payload))
    .bind(JobStatus::Queued)
    .bind(params.max_attempts)
    .bind(params.run_at)
    .bind(params.idempotency_key)
    .bind(params.now)
    .execute(executor)
    .await?;

    Ok(inserted.rows_affected() > 0)
}

/// Claims the next due job with `FOR UPDATE SKIP LOCKED` so concurrent
/// workers never pick the same row, flipping it to running and counting the
/// attempt in the same statement.
pub async fn claim_next(pool: &PgPool, now: PrimitiveDateTime) -> Result<Option<Job>, sqlx::Error> {
    sqlx::query_as::<_, Job>(&format!(
        "WITH candidate AS (
            SELECT id FROM jobs
            WHERE status = $1
              AND run_at <= $2
            ORDER BY run_at, created_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE jobs
        SET status = $3,
            attempts = attempts + 1,
            started_at = $2,
            updated_at = $2
        FROM candidate
        WHERE jobs.id = candidate.id
        RETURNING {COLUMNS}",
    ))
    .bind(JobStatus::Queued)
    .bind(now)
    .bind(JobStatus::Running)
    .fetch_optional(pool)
    .await
}

pub async fn mark_succeeded(
    executor: impl PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE jobs
         SET status = $1, finished_at = $2, last_error = NULL, updated_at = $2
         WHERE id = $3",
    )
    .bind(JobStatus::Succeeded)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Returns a transiently failed job to the queue for a later attempt.
pub async fn reschedule(
    executor: impl PgExecutor<'_>,
    id: &str,
    run_at: PrimitiveDateTime,
    error: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE jobs
         SET status = $1, run_at = $2, last_error = $3, started_at = NULL, updated_at = $4
         WHERE id = $5",
    )
    .bind(JobStatus::Queued)
    .bind(run_at)
    .bind(error)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn mark_failed(
    executor: impl PgExecutor<'_>,
    id: &str,
    error: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE jobs
         SET status = $1, finished_at = $2, last_error = $3, updated_at = $2
         WHERE id = $4",
    )
    .bind(JobStatus::Failed)
    .bind(now)
    .bind(error)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Jobs stuck in `running` past the cutoff (worker crash, lost attempt).
pub async fn list_stale_running(
    pool: &PgPool,
    cutoff: PrimitiveDateTime,
) -> Result<Vec<Job>, sqlx::Error> {
    sqlx::query_as::<_, Job>(&format!(
        "SELECT {COLUMNS} FROM jobs
         WHERE status = $1
           AND started_at IS NOT NULL
           AND started_at <= $2",
    ))
    .bind(JobStatus::Running)
    .bind(cutoff)
    .fetch_all(pool)
    .await
}
