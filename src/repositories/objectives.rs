use sqlx::PgPool;

use crate::db::models::LearningObjective;

const COLUMNS: &str =
    "id, tenant_id, class_id, code, subject, grade_min, grade_max, description, provenance";

/// Distinct objective codes referenced by a plan. The tenant filter on the
/// plan side keeps cross-tenant plans invisible even though objectives
/// themselves may be global rows.
pub async fn list_codes_for_plan(
    pool: &PgPool,
    tenant_id: &str,
    plan_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT lo.code
         FROM plan_objectives po
         JOIN plans p ON p.id = po.plan_id
         JOIN learning_objectives lo ON lo.id = po.objective_id
         WHERE p.tenant_id = $1 AND po.plan_id = $2",
    )
    .bind(tenant_id)
    .bind(plan_id)
    .fetch_all(pool)
    .await
}

/// Objectives visible in a tenant for a subject: the global standard list
/// plus the tenant's custom rows (one canonical list, provenance-tagged).
pub async fn list_for_subject(
    pool: &PgPool,
    tenant_id: &str,
    subject: &str,
) -> Result<Vec<LearningObjective>, sqlx::Error> {
    sqlx::query_as::<_, LearningObjective>(&format!(
        "SELECT {COLUMNS} FROM learning_objectives
         WHERE subject = $1 AND (tenant_id IS NULL OR tenant_id = $2)
         ORDER BY code"
    ))
    .bind(subject)
    .bind(tenant_id)
    .fetch_all(pool)
    .await
}
