use sqlx::PgPool;

use crate::db::models::Plan;

const COLUMNS: &str =
    "id, tenant_id, class_id, subject, period, starts_on, ends_on, active, created_at";

pub async fn find_active_for_scope(
    pool: &PgPool,
    tenant_id: &str,
    class_id: &str,
    subject: &str,
    period: &str,
) -> Result<Option<Plan>, sqlx::Error> {
    sqlx::query_as::<_, Plan>(&format!(
        "SELECT {COLUMNS} FROM plans
         WHERE tenant_id = $1 AND class_id = $2 AND subject = $3 AND period = $4 AND active"
    ))
    .bind(tenant_id)
    .bind(class_id)
    .bind(subject)
    .bind(period)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_id(
    pool: &PgPool,
    tenant_id: &str,
    id: &str,
) -> Result<Option<Plan>, sqlx::Error> {
    sqlx::query_as::<_, Plan>(&format!(
        "SELECT {COLUMNS} FROM plans WHERE tenant_id = $1 AND id = $2"
    ))
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// All active plans across tenants, for the periodic coverage-refresh
/// enqueue. Only the system maintenance loop may call this; each refresh job
/// then runs under the plan's own tenant context.
pub async fn list_active(pool: &PgPool) -> Result<Vec<Plan>, sqlx::Error> {
    sqlx::query_as::<_, Plan>(&format!("SELECT {COLUMNS} FROM plans WHERE active"))
        .fetch_all(pool)
        .await
}
