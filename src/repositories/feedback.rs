use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::FeedbackSignal;
use crate::db::types::FeedbackKind;

const COLUMNS: &str = "id, tenant_id, analysis_id, kind, payload, created_at";

pub async fn insert(
    executor: impl PgExecutor<'_>,
    id: &str,
    tenant_id: &str,
    analysis_id: &str,
    kind: FeedbackKind,
    payload: serde_json::Value,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO feedback_signals (id, tenant_id, analysis_id, kind, payload, created_at)
         VALUES ($1,$2,$3,$4,$5,$6)",
    )
    .bind(id)
    .bind(tenant_id)
    .bind(analysis_id)
    .bind(kind)
    .bind(Json(payload))
    .bind(now)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn list_by_analysis(
    pool: &PgPool,
    tenant_id: &str,
    analysis_id: &str,
) -> Result<Vec<FeedbackSignal>, sqlx::Error> {
    sqlx::query_as::<_, FeedbackSignal>(&format!(
        "SELECT {COLUMNS} FROM feedback_signals
         WHERE tenant_id = $1 AND analysis_id = $2
         ORDER BY created_at"
    ))
    .bind(tenant_id)
    .bind(analysis_id)
    .fetch_all(pool)
    .await
}
