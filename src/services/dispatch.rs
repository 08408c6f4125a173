use sha2::{Digest, Sha256};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::core::config::JobSettings;
use crate::core::errors::CoreError;
use crate::core::time::primitive_now_utc;
use crate::db::types::{JobKind, LessonStatus};
use crate::repositories;
use crate::services::lifecycle::dispatch_gate;

/// Stable key for queue-level dedup of one logical unit of work.
pub fn idempotency_key(
    tenant_id: &str,
    lesson_id: Option<&str>,
    kind: JobKind,
    payload: &serde_json::Value,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tenant_id.as_bytes());
    hasher.update(b"|");
    hasher.update(lesson_id.unwrap_or("-").as_bytes());
    hasher.update(b"|");
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Gate-checked enqueue. The caller passes the lesson status it holds inside
/// the same transaction as the status flip, so gate check and enqueue commit
/// or roll back together. Returns false when an identical job is already
/// queued or running (duplicate dispatch is a no-op, not an error).
pub async fn dispatch_for_lesson(
    executor: impl PgExecutor<'_>,
    settings: &JobSettings,
    tenant_id: &str,
    lesson_id: &str,
    lesson_status: LessonStatus,
    kind: JobKind,
    payload: serde_json::Value,
) -> Result<bool, CoreError> {
    match dispatch_gate(kind) {
        Some(required) if required == lesson_status => {}
        Some(required) => {
            return Err(CoreError::invalid_state(format!(
                "job {} requires lesson status {:?}, current is {:?}",
                kind.as_str(),
                required,
                lesson_status
            )));
        }
        None => {
            return Err(CoreError::invalid_state(format!(
                "job {} is not dispatched per lesson",
                kind.as_str()
            )));
        }
    }

    let now = primitive_now_utc();
    let key = idempotency_key(tenant_id, Some(lesson_id), kind, &payload);
    let enqueued = repositories::jobs::enqueue(
        executor,
        repositories::jobs::EnqueueJob {
            id: &Uuid::new_v4().to_string(),
            tenant_id,
            lesson_id: Some(lesson_id),
            kind,
            payload,
            max_attempts: settings.max_attempts,
            run_at: now,
            idempotency_key: &key,
            now,
        },
    )
    .await?;

    if !enqueued {
        tracing::info!(lesson_id, kind = kind.as_str(), "Duplicate dispatch suppressed");
    }

    Ok(enqueued)
}

/// Enqueue for jobs that are not bound to a lesson (coverage refresh).
pub async fn dispatch_unbound(
    executor: impl PgExecutor<'_>,
    settings: &JobSettings,
    tenant_id: &str,
    kind: JobKind,
    payload: serde_json::Value,
) -> Result<bool, CoreError> {
    let now = primitive_now_utc();
    let key = idempotency_key(tenant_id, None, kind, &payload);
    let enqueued = repositories::jobs::enqueue(
        executor,
        repositories::jobs::EnqueueJob {
            id: &Uuid::new_v4().to_string(),
            tenant_id,
            lesson_id: None,
            kind,
            payload,
            max_attempts: settings.max_attempts,
            run_at: now,
            idempotency_key: &key,
            now,
        },
    )
    .await?;

    Ok(enqueued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn idempotency_key_is_stable_and_scoped() {
        let payload = json!({"source_ref": "recordings/abc.ogg"});
        let a = idempotency_key("t1", Some("l1"), JobKind::Transcription, &payload);
        let b = idempotency_key("t1", Some("l1"), JobKind::Transcription, &payload);
        assert_eq!(a, b);

        let other_lesson = idempotency_key("t1", Some("l2"), JobKind::Transcription, &payload);
        assert_ne!(a, other_lesson);

        let other_kind = idempotency_key("t1", Some("l1"), JobKind::Analysis, &payload);
        assert_ne!(a, other_kind);

        let other_tenant = idempotency_key("t2", Some("l1"), JobKind::Transcription, &payload);
        assert_ne!(a, other_tenant);
    }
}
