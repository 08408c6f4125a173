use sqlx::PgPool;

use crate::core::config::JobSettings;
use crate::core::context::RequestContext;
use crate::core::errors::CoreError;
use crate::core::time::{primitive_now_utc, seconds_between};
use crate::db::models::{Analysis, Lesson};
use crate::db::types::{AnalysisStatus, JobKind, LessonStatus};
use crate::repositories;
use crate::schemas::analysis::AnalysisResponse;
use crate::services::dispatch;
use crate::services::exercise_rules;
use crate::services::notifications::{Notifier, ReviewEvent};

const MIN_REJECTION_REASON_CHARS: usize = 5;
const MAX_REJECTION_REASON_CHARS: usize = 1000;

pub async fn get_analysis(
    pool: &PgPool,
    ctx: &RequestContext,
    analysis_id: &str,
) -> Result<AnalysisResponse, CoreError> {
    let (analysis, _lesson) = load_scoped(pool, ctx, analysis_id).await?;
    Ok(analysis.into())
}

/// Stores an edited report text. The generated original is kept untouched so
/// the post-approval diff job has both sides.
pub async fn edit_report_field(
    pool: &PgPool,
    ctx: &RequestContext,
    analysis_id: &str,
    report_text: &str,
) -> Result<AnalysisResponse, CoreError> {
    if report_text.trim().is_empty() {
        return Err(CoreError::validation("edited report must not be empty"));
    }

    let (analysis, lesson) = load_scoped(pool, ctx, analysis_id).await?;
    ensure_owner(ctx, &lesson)?;
    ensure_awaiting_review(&analysis)?;

    let updated = repositories::analyses::set_edited_report(
        pool,
        ctx.tenant_id(),
        &analysis.id,
        report_text,
        primitive_now_utc(),
    )
    .await?;
    if !updated {
        return Err(CoreError::invalid_state(
            "analysis left review concurrently".to_string(),
        ));
    }

    reload(pool, ctx, analysis_id).await
}

/// Validates and stores an edited exercise set. The payload is re-serialized
/// from the parsed form so the stored document is normalized.
pub async fn edit_exercises_field(
    pool: &PgPool,
    ctx: &RequestContext,
    analysis_id: &str,
    payload: &serde_json::Value,
) -> Result<AnalysisResponse, CoreError> {
    let set = exercise_rules::validate_exercises(payload)?;

    let (analysis, lesson) = load_scoped(pool, ctx, analysis_id).await?;
    ensure_owner(ctx, &lesson)?;
    ensure_awaiting_review(&analysis)?;

    let normalized = serde_json::to_value(&set)
        .map_err(|e| CoreError::validation(format!("exercises payload is malformed: {e}")))?;
    let updated = repositories::analyses::set_edited_exercises(
        pool,
        ctx.tenant_id(),
        &analysis.id,
        normalized,
        primitive_now_utc(),
    )
    .await?;
    if !updated {
        return Err(CoreError::invalid_state(
            "analysis left review concurrently".to_string(),
        ));
    }

    reload(pool, ctx, analysis_id).await
}

/// Approves the analysis and moves the lesson to Approved in one transaction.
/// When the reviewer edited the report, a diff job is enqueued in the same
/// transaction so the feedback signal cannot be lost between the two writes.
pub async fn approve(
    pool: &PgPool,
    jobs: &JobSettings,
    notifier: &Notifier,
    ctx: &RequestContext,
    analysis_id: &str,
) -> Result<AnalysisResponse, CoreError> {
    let (analysis, lesson) = load_scoped(pool, ctx, analysis_id).await?;
    ensure_owner(ctx, &lesson)?;
    ensure_awaiting_review(&analysis)?;

    let now = primitive_now_utc();
    let review_duration = seconds_between(analysis.created_at, now);

    let mut tx = pool.begin().await?;
    let approved = repositories::analyses::approve(
        &mut *tx,
        ctx.tenant_id(),
        &analysis.id,
        review_duration,
        now,
    )
    .await?;
    if !approved {
        tx.rollback().await?;
        return Err(CoreError::invalid_state(
            "analysis left review concurrently".to_string(),
        ));
    }

    let moved = repositories::lessons::transition(
        &mut *tx,
        ctx.tenant_id(),
        &lesson.id,
        LessonStatus::Analyzed,
        LessonStatus::Approved,
        now,
    )
    .await?;
    if !moved {
        tx.rollback().await?;
        return Err(CoreError::invalid_state(format!(
            "lesson is not reviewable, current status is {:?}",
            lesson.status
        )));
    }

    if diff_job_needed(&analysis) {
        dispatch::dispatch_for_lesson(
            &mut *tx,
            jobs,
            ctx.tenant_id(),
            &lesson.id,
            LessonStatus::Approved,
            JobKind::ReportDiff,
            serde_json::json!({ "analysis_id": analysis.id }),
        )
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        lesson_id = %lesson.id,
        analysis_id = %analysis.id,
        review_duration_seconds = review_duration,
        "Analysis approved"
    );
    metrics::counter!("lesson_reviews_total", "verdict" => "approved").increment(1);

    notifier.send_detached(ReviewEvent {
        tenant_id: ctx.tenant_id().to_string(),
        lesson_id: lesson.id.clone(),
        analysis_id: analysis.id.clone(),
        verdict: "approved",
        reason: None,
    });

    reload(pool, ctx, analysis_id).await
}

/// Rejects the analysis with a reason. The reason is validated before any
/// write, so a bad reason leaves both rows untouched.
pub async fn reject(
    pool: &PgPool,
    jobs: &JobSettings,
    notifier: &Notifier,
    ctx: &RequestContext,
    analysis_id: &str,
    reason: &str,
) -> Result<AnalysisResponse, CoreError> {
    let reason = validate_rejection_reason(reason)?;

    let (analysis, lesson) = load_scoped(pool, ctx, analysis_id).await?;
    ensure_owner(ctx, &lesson)?;
    ensure_awaiting_review(&analysis)?;

    let now = primitive_now_utc();
    let review_duration = seconds_between(analysis.created_at, now);

    let mut tx = pool.begin().await?;
    let rejected = repositories::analyses::reject(
        &mut *tx,
        ctx.tenant_id(),
        &analysis.id,
        reason,
        review_duration,
        now,
    )
    .await?;
    if !rejected {
        tx.rollback().await?;
        return Err(CoreError::invalid_state(
            "analysis left review concurrently".to_string(),
        ));
    }

    let moved = repositories::lessons::transition(
        &mut *tx,
        ctx.tenant_id(),
        &lesson.id,
        LessonStatus::Analyzed,
        LessonStatus::Rejected,
        now,
    )
    .await?;
    if !moved {
        tx.rollback().await?;
        return Err(CoreError::invalid_state(format!(
            "lesson is not reviewable, current status is {:?}",
            lesson.status
        )));
    }

    dispatch::dispatch_for_lesson(
        &mut *tx,
        jobs,
        ctx.tenant_id(),
        &lesson.id,
        LessonStatus::Rejected,
        JobKind::RejectionFeedback,
        serde_json::json!({ "analysis_id": analysis.id, "reason": reason }),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        lesson_id = %lesson.id,
        analysis_id = %analysis.id,
        "Analysis rejected"
    );
    metrics::counter!("lesson_reviews_total", "verdict" => "rejected").increment(1);

    notifier.send_detached(ReviewEvent {
        tenant_id: ctx.tenant_id().to_string(),
        lesson_id: lesson.id.clone(),
        analysis_id: analysis.id.clone(),
        verdict: "rejected",
        reason: Some(reason.to_string()),
    });

    reload(pool, ctx, analysis_id).await
}

/// A trimmed, bounds-checked rejection reason, or the validation error that
/// leaves both rows untouched.
fn validate_rejection_reason(reason: &str) -> Result<&str, CoreError> {
    let reason = reason.trim();
    let reason_chars = reason.chars().count();
    if reason_chars < MIN_REJECTION_REASON_CHARS {
        return Err(CoreError::validation(format!(
            "rejection reason must be at least {MIN_REJECTION_REASON_CHARS} characters"
        )));
    }
    if reason_chars > MAX_REJECTION_REASON_CHARS {
        return Err(CoreError::validation(format!(
            "rejection reason must be at most {MAX_REJECTION_REASON_CHARS} characters"
        )));
    }
    Ok(reason)
}

/// The diff job compares the generated report against the edited one, so it
/// is enqueued exactly when an edited report exists. An exercises-only edit
/// leaves nothing to diff.
fn diff_job_needed(analysis: &Analysis) -> bool {
    analysis.report_text_edited.is_some()
}

/// Loads the analysis and its lesson with the tenant filter applied, then
/// runs the ownership check. NotFound before Forbidden: a caller outside the
/// tenant never learns the analysis exists.
async fn load_scoped(
    pool: &PgPool,
    ctx: &RequestContext,
    analysis_id: &str,
) -> Result<(Analysis, Lesson), CoreError> {
    let analysis = repositories::analyses::find_by_id(pool, ctx.tenant_id(), analysis_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    let lesson = repositories::lessons::find_by_id(pool, ctx.tenant_id(), &analysis.lesson_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    if !ctx.is_elevated() && !ctx.owns(&lesson.teacher_id) {
        return Err(CoreError::Forbidden);
    }

    Ok((analysis, lesson))
}

/// Review writes are the owning teacher's alone; elevation widens read
/// scope, never review authority.
fn ensure_owner(ctx: &RequestContext, lesson: &Lesson) -> Result<(), CoreError> {
    if !ctx.owns(&lesson.teacher_id) {
        return Err(CoreError::Forbidden);
    }
    Ok(())
}

fn ensure_awaiting_review(analysis: &Analysis) -> Result<(), CoreError> {
    if analysis.status != AnalysisStatus::AwaitingReview {
        return Err(CoreError::invalid_state(format!(
            "analysis is not awaiting review, current status is {:?}",
            analysis.status
        )));
    }
    Ok(())
}

async fn reload(
    pool: &PgPool,
    ctx: &RequestContext,
    analysis_id: &str,
) -> Result<AnalysisResponse, CoreError> {
    repositories::analyses::find_by_id(pool, ctx.tenant_id(), analysis_id)
        .await?
        .map(Into::into)
        .ok_or(CoreError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::types::Json;

    fn analysis() -> Analysis {
        let now = primitive_now_utc();
        Analysis {
            id: "analysis-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            lesson_id: "lesson-1".to_string(),
            coverage: Json(vec![]),
            evaluation: Json(json!({})),
            report_text: "generated report".to_string(),
            report_text_edited: None,
            exercises: Json(json!({ "questions": [] })),
            exercises_edited: None,
            alerts: Json(json!([])),
            status: AnalysisStatus::AwaitingReview,
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
            review_duration_seconds: None,
            model_version: "model-1".to_string(),
            prompt_version: "prompt-1".to_string(),
            cost_cents: None,
            processing_seconds: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn untouched_analysis_needs_no_diff_job() {
        assert!(!diff_job_needed(&analysis()));
    }

    #[test]
    fn exercises_only_edit_needs_no_diff_job() {
        let mut analysis = analysis();
        analysis.exercises_edited = Some(Json(json!({ "questions": [] })));
        assert!(!diff_job_needed(&analysis));
    }

    #[test]
    fn edited_report_needs_a_diff_job() {
        let mut analysis = analysis();
        analysis.report_text_edited = Some("edited report".to_string());
        assert!(diff_job_needed(&analysis));
    }

    #[test]
    fn rejection_reason_is_trimmed() {
        assert_eq!(validate_rejection_reason("  too vague  ").unwrap(), "too vague");
    }

    #[test]
    fn short_rejection_reason_fails() {
        for reason in ["", "    ", "bad", "bad "] {
            let result = validate_rejection_reason(reason);
            assert!(
                matches!(result, Err(CoreError::ValidationFailed(_))),
                "{reason:?} passed"
            );
        }
    }

    #[test]
    fn rejection_reason_bounds_are_inclusive() {
        assert!(validate_rejection_reason(&"x".repeat(5)).is_ok());
        assert!(validate_rejection_reason(&"x".repeat(1000)).is_ok());
        assert!(matches!(
            validate_rejection_reason(&"x".repeat(1001)),
            Err(CoreError::ValidationFailed(_))
        ));
    }
}
