use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::{Analysis, CoverageEvidence};
use crate::db::types::AnalysisStatus;

const COLUMNS: &str = "\
    id, tenant_id, lesson_id, coverage, evaluation, report_text, report_text_edited, exercises, \
    exercises_edited, alerts, status, approved_at, rejected_at, rejection_reason, \
    review_duration_seconds, model_version, prompt_version, cost_cents, processing_seconds, \
    created_at, updated_at";

pub struct CreateAnalysis<'a> {
    pub id: &'a str,
    pub tenant_id: &'a str,
    pub lesson_id: &'a str,
    pub coverage: Vec<CoverageEvidence>,
    pub evaluation: serde_json::Value,
    pub report_text: &'a str,
    pub exercises: serde_json::Value,
    pub alerts: serde_json::Value,
    pub model_version: &'a str,
    pub prompt_version: &'a str,
    pub cost_cents: Option<f64>,
    pub processing_seconds: Option<f64>,
    pub now: PrimitiveDateTime,
}

/// Inserts the single analysis for a lesson. The UNIQUE constraint on
/// `lesson_id` makes a second insert fail rather than silently duplicate.
pub async fn create(
    executor: impl PgExecutor<'_>,
    params: CreateAnalysis<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO analyses (
            id, tenant_id, lesson_id, coverage, evaluation, report_text, exercises, alerts,
            status, model_version, prompt_version, cost_cents, processing_seconds,
            created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$14)",
    )
    .bind(params.id)
    .bind(params.tenant_id)
    .bind(params.lesson_id)
    .bind(Json(params.coverage))
    .bind(Json(params.evaluation))
    .bind(params.report_text)
    .bind(Json(params.exercises))
    .bind(Json(params.alerts))
    .bind(AnalysisStatus::AwaitingReview)
    .bind(params.model_version)
    .bind(params.prompt_version)
    .bind(params.cost_cents)
    .bind(params.processing_seconds)
    .bind(params.now)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn find_by_id(
    pool: &PgPool,
    tenant_id: &str,
    id: &str,
) -> Result<Option<Analysis>, sqlx::Error> {
    sqlx::query_as::<_, Analysis>(&format!(
        "SELECT {COLUMNS} FROM analyses WHERE tenant_id = $1 AND id = $2"
    ))
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_lesson(
    pool: &PgPool,
    tenant_id: &str,
    lesson_id: &str,
) -> Result<Option<Analysis>, sqlx::Error> {
    sqlx::query_as::<_, Analysis>(&format!(
        "SELECT {COLUMNS} FROM analyses WHERE tenant_id = $1 AND lesson_id = $2"
    ))
    .bind(tenant_id)
    .bind(lesson_id)
    .fetch_optional(pool)
    .await
}

/// Edits only ever touch the `_edited` column and only while the analysis is
/// awaiting review; the generated original stays intact for diffing.
pub async fn set_edited_report(
    executor: impl PgExecutor<'_>,
    tenant_id: &str,
    id: &str,
    report_text: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE analyses
         SET report_text_edited = $1, updated_at = $2
         WHERE tenant_id = $3 AND id = $4 AND status = $5",
    )
    .bind(report_text)
    .bind(now)
    .bind(tenant_id)
    .bind(id)
    .bind(AnalysisStatus::AwaitingReview)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() > 0)
}

pub async fn set_edited_exercises(
    executor: impl PgExecutor<'_>,
    tenant_id: &str,
    id: &str,
    exercises: serde_json::Value,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE analyses
         SET exercises_edited = $1, updated_at = $2
         WHERE tenant_id = $3 AND id = $4 AND status = $5",
    )
    .bind(Json(exercises))
    .bind(now)
    .bind(tenant_id)
    .bind(id)
    .bind(AnalysisStatus::AwaitingReview)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// Conditional approval; the `status = awaiting_review` guard makes the
/// second of two racing approvals observe zero rows.
pub async fn approve(
    executor: impl PgExecutor<'_>,
    tenant_id: &str,
    id: &str,
    review_duration_seconds: f64,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE analyses
         SET status = $1, approved_at = $2, review_duration_seconds = $3, updated_at = $2
         WHERE tenant_id = $4 AND id = $5 AND status = $6",
    )
    .bind(AnalysisStatus::Approved)
    .bind(now)
    .bind(review_duration_seconds)
    .bind(tenant_id)
    .bind(id)
    .bind(AnalysisStatus::AwaitingReview)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() > 0)
}

pub async fn reject(
    executor: impl PgExecutor<'_>,
    tenant_id: &str,
    id: &str,
    reason: &str,
    review_duration_seconds: f64,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE analyses
         SET status = $1, rejected_at = $2, rejection_reason = $3,
             review_duration_seconds = $4, updated_at = $2
         WHERE tenant_id = $5 AND id = $6 AND status = $7",
    )
    .bind(AnalysisStatus::Rejected)
    .bind(now)
    .bind(reason)
    .bind(review_duration_seconds)
    .bind(tenant_id)
    .bind(id)
    .bind(AnalysisStatus::AwaitingReview)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() > 0)
}
