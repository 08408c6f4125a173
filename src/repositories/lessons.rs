use sqlx::{PgExecutor, PgPool};
use time::{Date, PrimitiveDateTime};

use crate::db::models::Lesson;
use crate::db::types::{JobKind, LessonInputKind, LessonStatus};

const COLUMNS: &str = "\
    id, tenant_id, teacher_id, class_id, plan_id, subject, input_kind, source_ref, held_on, \
    status, transcript_text, error_reason, error_stage, created_at, updated_at";

pub struct CreateLesson<'a> {
    pub id: &'a str,
    pub tenant_id: &'a str,
    pub teacher_id: &'a str,
    pub class_id: &'a str,
    pub plan_id: Option<&'a str>,
    pub subject: &'a str,
    pub input_kind: LessonInputKind,
    pub source_ref: &'a str,
    pub held_on: Date,
    pub now: PrimitiveDateTime,
}

pub async fn create(pool: &PgPool, params: CreateLesson<'_>) -> Result<Lesson, sqlx::Error> {
    sqlx::query_as::<_, Lesson>(&format!(
        "INSERT INTO lessons (
            id, tenant_id, teacher_id, class_id, plan_id, subject, input_kind, source_ref,
            held_on, status, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$11)
         RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.tenant_id)
    .bind(params.teacher_id)
    .bind(params.class_id)
    .bind(params.plan_id)
    .bind(params.subject)
    .bind(params.input_kind)
    .bind(params.source_ref)
    .bind(params.held_on)
    .bind(LessonStatus::Created)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(
    pool: &PgPool,
    tenant_id: &str,
    id: &str,
) -> Result<Option<Lesson>, sqlx::Error> {
    sqlx::query_as::<_, Lesson>(&format!(
        "SELECT {COLUMNS} FROM lessons WHERE tenant_id = $1 AND id = $2"
    ))
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Conditional status flip. Returns false when the precondition no longer
/// holds, so a racing loser observes a conflict instead of overwriting.
pub async fn transition(
    executor: impl PgExecutor<'_>,
    tenant_id: &str,
    id: &str,
    from: LessonStatus,
    to: LessonStatus,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE lessons
         SET status = $1, updated_at = $2
         WHERE tenant_id = $3 AND id = $4 AND status = $5",
    )
    .bind(to)
    .bind(now)
    .bind(tenant_id)
    .bind(id)
    .bind(from)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// Drives an in-flight lesson to `Error`, recording the failure and the
/// stage it happened in. Terminal and at-rest states are left untouched.
pub async fn transition_to_error(
    executor: impl PgExecutor<'_>,
    tenant_id: &str,
    id: &str,
    reason: &str,
    stage: JobKind,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE lessons
         SET status = $1, error_reason = $2, error_stage = $3, updated_at = $4
         WHERE tenant_id = $5 AND id = $6 AND status IN ($7, $8, $9, $10)",
    )
    .bind(LessonStatus::Error)
    .bind(reason)
    .bind(stage)
    .bind(now)
    .bind(tenant_id)
    .bind(id)
    .bind(LessonStatus::AwaitingTranscription)
    .bind(LessonStatus::Transcribing)
    .bind(LessonStatus::Transcribed)
    .bind(LessonStatus::Analyzing)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// The only exit from `Error`: reset to the stage-appropriate upstream
/// status and clear the recorded failure.
pub async fn reset_from_error(
    executor: impl PgExecutor<'_>,
    tenant_id: &str,
    id: &str,
    to: LessonStatus,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE lessons
         SET status = $1, error_reason = NULL, error_stage = NULL, updated_at = $2
         WHERE tenant_id = $3 AND id = $4 AND status = $5",
    )
    .bind(to)
    .bind(now)
    .bind(tenant_id)
    .bind(id)
    .bind(LessonStatus::Error)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// Persists the transcript and advances `Transcribing -> Transcribed` in one
/// statement so the result and the status move together.
pub async fn store_transcript(
    executor: impl PgExecutor<'_>,
    tenant_id: &str,
    id: &str,
    transcript: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE lessons
         SET status = $1, transcript_text = $2, updated_at = $3
         WHERE tenant_id = $4 AND id = $5 AND status = $6",
    )
    .bind(LessonStatus::Transcribed)
    .bind(transcript)
    .bind(now)
    .bind(tenant_id)
    .bind(id)
    .bind(LessonStatus::Transcribing)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() > 0)
}
