use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use time::Date;

use crate::db::models::{CoverageEvidence, CoverageViewRow};
use crate::db::types::AnalysisStatus;

/// One approved analysis with the lesson fields the aggregator needs.
#[derive(Debug, sqlx::FromRow)]
pub struct ApprovedLessonEvidence {
    pub lesson_id: String,
    pub held_on: Date,
    pub coverage: Json<Vec<CoverageEvidence>>,
}

/// Approved analyses for a (class, subject, date-range) scope. The teacher
/// filter narrows to lessons the caller owns; elevated callers pass None.
pub async fn list_approved_evidence(
    pool: &PgPool,
    tenant_id: &str,
    class_id: &str,
    subject: &str,
    from: Date,
    to: Date,
    teacher_id: Option<&str>,
) -> Result<Vec<ApprovedLessonEvidence>, sqlx::Error> {
    sqlx::query_as::<_, ApprovedLessonEvidence>(
        "SELECT l.id AS lesson_id, l.held_on, a.coverage
         FROM analyses a
         JOIN lessons l ON l.tenant_id = a.tenant_id AND l.id = a.lesson_id
         WHERE a.tenant_id = $1
           AND a.status = $7
           AND l.class_id = $2
           AND l.subject = $3
           AND l.held_on BETWEEN $4 AND $5
           AND ($6::varchar IS NULL OR l.teacher_id = $6)
         ORDER BY l.held_on",
    )
    .bind(tenant_id)
    .bind(class_id)
    .bind(subject)
    .bind(from)
    .bind(to)
    .bind(teacher_id)
    .bind(AnalysisStatus::Approved)
    .fetch_all(pool)
    .await
}

pub async fn upsert_view(
    executor: impl PgExecutor<'_>,
    row: &CoverageViewRow,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO coverage_views (
            tenant_id, class_id, subject, period, planned_count, covered_count,
            percentage, computed_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
         ON CONFLICT (tenant_id, class_id, subject, period)
         DO UPDATE SET planned_count = EXCLUDED.planned_count,
                       covered_count = EXCLUDED.covered_count,
                       percentage = EXCLUDED.percentage,
                       computed_at = EXCLUDED.computed_at",
    )
    .bind(&row.tenant_id)
    .bind(&row.class_id)
    .bind(&row.subject)
    .bind(&row.period)
    .bind(row.planned_count)
    .bind(row.covered_count)
    .bind(row.percentage)
    .bind(row.computed_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn find_view(
    pool: &PgPool,
    tenant_id: &str,
    class_id: &str,
    subject: &str,
    period: &str,
) -> Result<Option<CoverageViewRow>, sqlx::Error> {
    sqlx::query_as::<_, CoverageViewRow>(
        "SELECT tenant_id, class_id, subject, period, planned_count, covered_count,
                percentage, computed_at
         FROM coverage_views
         WHERE tenant_id = $1 AND class_id = $2 AND subject = $3 AND period = $4",
    )
    .bind(tenant_id)
    .bind(class_id)
    .bind(subject)
    .bind(period)
    .fetch_optional(pool)
    .await
}
