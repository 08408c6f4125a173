use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::config::JobSettings;
use crate::core::context::RequestContext;
use crate::core::errors::CoreError;
use crate::core::time::primitive_now_utc;
use crate::db::models::Lesson;
use crate::db::types::{AnalysisStatus, JobKind, LessonStatus};
use crate::repositories;
use crate::schemas::lesson::{CreateLessonInput, LessonResponse};
use crate::services::dispatch;
use crate::services::lifecycle::{self, ActorKind};

pub async fn create_lesson(
    pool: &PgPool,
    ctx: &RequestContext,
    input: CreateLessonInput,
) -> Result<LessonResponse, CoreError> {
    if input.class_id.trim().is_empty() {
        return Err(CoreError::validation("class_id must not be empty"));
    }
    if input.subject.trim().is_empty() {
        return Err(CoreError::validation("subject must not be empty"));
    }
    if input.source_ref.trim().is_empty() {
        return Err(CoreError::validation("source_ref must not be empty"));
    }

    if let Some(plan_id) = input.plan_id.as_deref() {
        let plan = repositories::plans::find_by_id(pool, ctx.tenant_id(), plan_id).await?;
        if plan.is_none() {
            return Err(CoreError::validation("plan does not exist"));
        }
    }

    let lesson = repositories::lessons::create(
        pool,
        repositories::lessons::CreateLesson {
            id: &Uuid::new_v4().to_string(),
            tenant_id: ctx.tenant_id(),
            teacher_id: ctx.user_id(),
            class_id: &input.class_id,
            plan_id: input.plan_id.as_deref(),
            subject: &input.subject,
            input_kind: input.input_kind,
            source_ref: &input.source_ref,
            held_on: input.held_on,
            now: primitive_now_utc(),
        },
    )
    .await?;

    tracing::info!(lesson_id = %lesson.id, class_id = %lesson.class_id, "Lesson created");

    Ok(lesson.into())
}

pub async fn get_lesson(
    pool: &PgPool,
    ctx: &RequestContext,
    lesson_id: &str,
) -> Result<LessonResponse, CoreError> {
    let lesson = repositories::lessons::find_by_id(pool, ctx.tenant_id(), lesson_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    if !ctx.is_elevated() && !ctx.owns(&lesson.teacher_id) {
        return Err(CoreError::Forbidden);
    }

    Ok(lesson.into())
}

/// Requests a status transition on behalf of the calling actor.
///
/// Ownership and tenant checks run before the transition-table check, so an
/// authorization failure and an illegal transition stay distinguishable.
/// The status flip and any follow-up job dispatch commit in one transaction.
pub async fn request_transition(
    pool: &PgPool,
    jobs: &JobSettings,
    ctx: &RequestContext,
    lesson_id: &str,
    target: LessonStatus,
) -> Result<LessonResponse, CoreError> {
    let lesson = repositories::lessons::find_by_id(pool, ctx.tenant_id(), lesson_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    if !ctx.is_elevated() && !ctx.owns(&lesson.teacher_id) {
        return Err(CoreError::Forbidden);
    }

    let actor = ActorKind::from(ctx.role());
    if !lifecycle::transition_allowed(lesson.status, target, actor) {
        return Err(CoreError::invalid_state(format!(
            "transition {:?} -> {:?} is not allowed for this actor",
            lesson.status, target
        )));
    }

    // Lesson approval/rejection must agree with the analysis verdict; the
    // approval workflow is the path that moves both together.
    if matches!(target, LessonStatus::Approved | LessonStatus::Rejected) {
        let analysis =
            repositories::analyses::find_by_lesson(pool, ctx.tenant_id(), &lesson.id).await?;
        let verdict_matches = matches!(
            (target, analysis.as_ref().map(|a| a.status)),
            (LessonStatus::Approved, Some(AnalysisStatus::Approved))
                | (LessonStatus::Rejected, Some(AnalysisStatus::Rejected))
        );
        if !verdict_matches {
            return Err(CoreError::invalid_state(
                "lesson verdict must be set through the analysis approval workflow".to_string(),
            ));
        }
    }

    if lesson.status == LessonStatus::Error {
        // Explicit-target reprocess goes through the same reset path.
        return reprocess_to(pool, jobs, ctx, lesson, target).await;
    }

    let mut tx = pool.begin().await?;
    let now = primitive_now_utc();
    let moved = repositories::lessons::transition(
        &mut *tx,
        ctx.tenant_id(),
        &lesson.id,
        lesson.status,
        target,
        now,
    )
    .await?;
    if !moved {
        tx.rollback().await?;
        let current = repositories::lessons::find_by_id(pool, ctx.tenant_id(), lesson_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        return Err(CoreError::invalid_state(format!(
            "lesson moved concurrently, current status is {:?}",
            current.status
        )));
    }

    if target == LessonStatus::AwaitingTranscription {
        dispatch::dispatch_for_lesson(
            &mut *tx,
            jobs,
            ctx.tenant_id(),
            &lesson.id,
            target,
            JobKind::Transcription,
            transcription_payload(&lesson),
        )
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        lesson_id = %lesson.id,
        from = ?lesson.status,
        to = ?target,
        "Lesson transition applied"
    );

    repositories::lessons::find_by_id(pool, ctx.tenant_id(), lesson_id)
        .await?
        .map(Into::into)
        .ok_or(CoreError::NotFound)
}

/// The explicit way out of `Error`: reset to the failed stage's upstream
/// status and re-enqueue the corresponding job.
pub async fn reprocess_lesson(
    pool: &PgPool,
    jobs: &JobSettings,
    ctx: &RequestContext,
    lesson_id: &str,
) -> Result<LessonResponse, CoreError> {
    let lesson = repositories::lessons::find_by_id(pool, ctx.tenant_id(), lesson_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    if !ctx.is_elevated() && !ctx.owns(&lesson.teacher_id) {
        return Err(CoreError::Forbidden);
    }

    let Some(stage) = lesson.error_stage else {
        return Err(CoreError::invalid_state(
            "lesson is not reprocessable: no failed stage recorded".to_string(),
        ));
    };
    let Some((target, _)) = lifecycle::reprocess_target(stage) else {
        return Err(CoreError::invalid_state(format!(
            "stage {} cannot be reprocessed",
            stage.as_str()
        )));
    };

    reprocess_to(pool, jobs, ctx, lesson, target).await
}

/// The job to re-enqueue for a reprocess request, or why the request is
/// illegal. The target must match the stage that actually failed: re-running
/// analysis after a transcription-stage failure has no transcript to work
/// with and can only fail again.
fn reprocess_plan(
    error_stage: Option<JobKind>,
    target: LessonStatus,
) -> Result<JobKind, CoreError> {
    let Some(stage) = error_stage else {
        return Err(CoreError::invalid_state(
            "lesson is not reprocessable: no failed stage recorded".to_string(),
        ));
    };
    let Some((expected, kind)) = lifecycle::reprocess_target(stage) else {
        return Err(CoreError::invalid_state(format!(
            "stage {} cannot be reprocessed",
            stage.as_str()
        )));
    };
    if target != expected {
        return Err(CoreError::invalid_state(format!(
            "reprocess to {target:?} does not match the failed {} stage",
            stage.as_str()
        )));
    }
    Ok(kind)
}

async fn reprocess_to(
    pool: &PgPool,
    jobs: &JobSettings,
    ctx: &RequestContext,
    lesson: Lesson,
    target: LessonStatus,
) -> Result<LessonResponse, CoreError> {
    if lesson.status != LessonStatus::Error {
        return Err(CoreError::invalid_state(format!(
            "only lessons in Error can be reprocessed, current status is {:?}",
            lesson.status
        )));
    }
    let kind = reprocess_plan(lesson.error_stage, target)?;

    let mut tx = pool.begin().await?;
    let now = primitive_now_utc();
    let moved =
        repositories::lessons::reset_from_error(&mut *tx, ctx.tenant_id(), &lesson.id, target, now)
            .await?;
    if !moved {
        tx.rollback().await?;
        return Err(CoreError::invalid_state(
            "lesson left Error concurrently".to_string(),
        ));
    }

    let payload = match kind {
        JobKind::Transcription => transcription_payload(&lesson),
        _ => json!({}),
    };
    dispatch::dispatch_for_lesson(&mut *tx, jobs, ctx.tenant_id(), &lesson.id, target, kind, payload)
        .await?;

    tx.commit().await?;

    tracing::info!(lesson_id = %lesson.id, stage = kind.as_str(), "Lesson requeued for reprocessing");

    repositories::lessons::find_by_id(pool, ctx.tenant_id(), &lesson.id)
        .await?
        .map(Into::into)
        .ok_or(CoreError::NotFound)
}

/// Gate-checked enqueue without a status flip: re-kicks the job matching the
/// lesson's current status when no active job exists (e.g. after a manual
/// queue cleanup). Duplicate dispatch is a no-op.
pub async fn enqueue_job(
    pool: &PgPool,
    jobs: &JobSettings,
    ctx: &RequestContext,
    kind: JobKind,
    lesson_id: &str,
) -> Result<bool, CoreError> {
    let lesson = repositories::lessons::find_by_id(pool, ctx.tenant_id(), lesson_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    if !ctx.is_elevated() && !ctx.owns(&lesson.teacher_id) {
        return Err(CoreError::Forbidden);
    }

    let payload = match kind {
        JobKind::Transcription => transcription_payload(&lesson),
        _ => json!({}),
    };

    dispatch::dispatch_for_lesson(
        pool,
        jobs,
        ctx.tenant_id(),
        &lesson.id,
        lesson.status,
        kind,
        payload,
    )
    .await
}

fn transcription_payload(lesson: &Lesson) -> serde_json::Value {
    json!({
        "input_kind": lesson.input_kind,
        "source_ref": lesson.source_ref,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reprocess_matches_the_failed_stage() {
        assert!(matches!(
            reprocess_plan(Some(JobKind::Transcription), LessonStatus::AwaitingTranscription),
            Ok(JobKind::Transcription)
        ));
        assert!(matches!(
            reprocess_plan(Some(JobKind::Analysis), LessonStatus::Transcribed),
            Ok(JobKind::Analysis)
        ));
    }

    #[test]
    fn reprocess_to_the_wrong_stage_is_rejected() {
        // A transcription failure left no transcript behind; jumping straight
        // to analysis is illegal.
        let result = reprocess_plan(Some(JobKind::Transcription), LessonStatus::Transcribed);
        assert!(matches!(result, Err(CoreError::InvalidState(_))));

        let result =
            reprocess_plan(Some(JobKind::Analysis), LessonStatus::AwaitingTranscription);
        assert!(matches!(result, Err(CoreError::InvalidState(_))));
    }

    #[test]
    fn reprocess_without_a_recorded_stage_is_rejected() {
        let result = reprocess_plan(None, LessonStatus::AwaitingTranscription);
        assert!(matches!(result, Err(CoreError::InvalidState(_))));
    }
}
