use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::core::context::RequestContext;
use crate::core::errors::JobFailure;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Job, Lesson};
use crate::db::types::{FeedbackKind, JobKind, LessonInputKind, LessonStatus};
use crate::repositories;
use crate::services::analysis_engine::{AnalysisEngineService, AnalysisRequest};
use crate::services::dispatch;
use crate::services::report_diff;
use crate::services::transcription::TranscriptionService;

/// External engine clients shared by all workers.
#[derive(Clone)]
pub struct Engines {
    pub transcription: TranscriptionService,
    pub analysis: AnalysisEngineService,
}

impl Engines {
    pub fn from_settings(settings: &crate::core::config::Settings) -> Result<Self> {
        Ok(Self {
            transcription: TranscriptionService::from_settings(settings)?,
            analysis: AnalysisEngineService::from_settings(settings)?,
        })
    }
}

/// Delay before retry `attempt` (1-based): exponential from the configured
/// base, plus up to a second of jitter so retries from one incident spread
/// out.
pub fn backoff_delay(base_seconds: u64, attempt: i32) -> Duration {
    let exponent = attempt.max(1) as u32 - 1;
    let seconds = base_seconds.saturating_mul(2_u64.saturating_pow(exponent));
    let jitter_ms = rand::thread_rng().gen_range(0..1000);
    Duration::from_secs(seconds) + Duration::from_millis(jitter_ms)
}

/// Whether a failed attempt goes back on the queue. Permanent failures and
/// exhausted attempts settle the job instead, driving the lesson to `Error`.
fn should_retry(failure: &JobFailure, attempts: i32, max_attempts: i32) -> bool {
    !failure.is_permanent() && attempts < max_attempts
}

/// Runs one claimed job to completion: executes it under the per-attempt
/// timeout, then settles the queue row and, when processing is over for
/// good, the lesson.
pub async fn process_claimed(state: &AppState, engines: &Engines, job: &Job) -> Result<()> {
    let ctx = match RequestContext::for_job(&job.tenant_id) {
        Ok(ctx) => ctx,
        Err(_) => {
            // A queue row without a tenant can never run scoped queries.
            give_up(state, job, &JobFailure::permanent("job row has no tenant id")).await?;
            return Ok(());
        }
    };

    let timeout = Duration::from_secs(state.settings().jobs().attempt_timeout_seconds);
    let outcome = match tokio::time::timeout(timeout, execute(state, engines, &ctx, job)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(JobFailure::transient(anyhow::anyhow!(
            "attempt timed out after {}s",
            timeout.as_secs()
        ))),
    };

    let now = primitive_now_utc();
    match outcome {
        Ok(()) => {
            repositories::jobs::mark_succeeded(state.db(), &job.id, now).await?;
            metrics::counter!("lesson_jobs_total", "kind" => job.kind.as_str(), "status" => "succeeded")
                .increment(1);
            Ok(())
        }
        Err(failure) if should_retry(&failure, job.attempts, job.max_attempts) => {
            let delay = backoff_delay(state.settings().jobs().backoff_base_seconds, job.attempts);
            let run_at = now + time::Duration::try_from(delay).unwrap_or(time::Duration::ZERO);
            repositories::jobs::reschedule(state.db(), &job.id, run_at, &failure.reason(), now)
                .await?;
            metrics::counter!("lesson_jobs_total", "kind" => job.kind.as_str(), "status" => "retried")
                .increment(1);
            tracing::warn!(
                job_id = %job.id,
                kind = job.kind.as_str(),
                attempt = job.attempts,
                delay_seconds = delay.as_secs(),
                error = %failure.reason(),
                "Job attempt failed, rescheduled"
            );
            Ok(())
        }
        Err(failure) => {
            give_up(state, job, &failure).await?;
            Ok(())
        }
    }
}

/// Final failure: the queue row is closed and, for lesson-bound processing
/// stages, the lesson lands in `Error` with the stage recorded for
/// reprocessing.
pub(crate) async fn give_up(state: &AppState, job: &Job, failure: &JobFailure) -> Result<()> {
    let now = primitive_now_utc();
    let reason = failure.reason();

    let mut tx = state.db().begin().await?;
    repositories::jobs::mark_failed(&mut *tx, &job.id, &reason, now).await?;

    if let Some(lesson_id) = job.lesson_id.as_deref() {
        if matches!(job.kind, JobKind::Transcription | JobKind::Analysis) {
            let moved = repositories::lessons::transition_to_error(
                &mut *tx,
                &job.tenant_id,
                lesson_id,
                &reason,
                job.kind,
                now,
            )
            .await?;
            if !moved {
                tracing::warn!(
                    job_id = %job.id,
                    lesson_id,
                    "Lesson was not in flight when its job failed terminally"
                );
            }
        }
    }

    tx.commit().await?;

    metrics::counter!("lesson_jobs_total", "kind" => job.kind.as_str(), "status" => "failed")
        .increment(1);
    tracing::error!(
        job_id = %job.id,
        kind = job.kind.as_str(),
        attempts = job.attempts,
        error = %reason,
        "Job failed terminally"
    );

    Ok(())
}

async fn execute(
    state: &AppState,
    engines: &Engines,
    ctx: &RequestContext,
    job: &Job,
) -> Result<(), JobFailure> {
    match job.kind {
        JobKind::Transcription => execute_transcription(state, engines, ctx, job).await,
        JobKind::Analysis => execute_analysis(state, engines, ctx, job).await,
        JobKind::ReportDiff => execute_report_diff(state, ctx, job).await,
        JobKind::RejectionFeedback => execute_rejection_feedback(state, ctx, job).await,
        JobKind::CoverageRefresh => execute_coverage_refresh(state, ctx, job).await,
    }
}

async fn execute_transcription(
    state: &AppState,
    engines: &Engines,
    ctx: &RequestContext,
    job: &Job,
) -> Result<(), JobFailure> {
    let lesson = load_lesson(state, ctx, job).await?;
    let Some(lesson) = claim_lesson_stage(
        state,
        ctx,
        &lesson,
        LessonStatus::AwaitingTranscription,
        LessonStatus::Transcribing,
    )
    .await?
    else {
        return Ok(());
    };

    let transcript = match lesson.input_kind {
        LessonInputKind::Audio => {
            let storage = state.storage().ok_or_else(|| {
                JobFailure::permanent("object storage is not configured, cannot fetch recording")
            })?;
            let audio_url = storage
                .presign_get(&lesson.source_ref)
                .await
                .map_err(|e| JobFailure::transient(e.context("presigning recording failed")))?;
            engines.transcription.transcribe(&audio_url).await?
        }
        // Uploaded text skips the engine entirely.
        LessonInputKind::TranscriptText | LessonInputKind::ManualSummary => {
            let storage = state.storage().ok_or_else(|| {
                JobFailure::permanent("object storage is not configured, cannot fetch transcript")
            })?;
            let text = storage
                .download_text(&lesson.source_ref)
                .await
                .map_err(|e| JobFailure::transient(e.context("fetching uploaded text failed")))?;
            if text.trim().is_empty() {
                return Err(JobFailure::permanent("uploaded transcript is empty"));
            }
            text
        }
    };

    let now = primitive_now_utc();
    let mut tx = state.db().begin().await.map_err(db_failure)?;
    let stored = repositories::lessons::store_transcript(
        &mut *tx,
        ctx.tenant_id(),
        &lesson.id,
        &transcript,
        now,
    )
    .await
    .map_err(db_failure)?;
    if !stored {
        // The lesson left Transcribing while the engine ran; drop the result.
        tx.rollback().await.map_err(db_failure)?;
        tracing::info!(lesson_id = %lesson.id, "Transcript discarded, lesson moved concurrently");
        return Ok(());
    }

    dispatch::dispatch_for_lesson(
        &mut *tx,
        state.settings().jobs(),
        ctx.tenant_id(),
        &lesson.id,
        LessonStatus::Transcribed,
        JobKind::Analysis,
        json!({}),
    )
    .await
    .map_err(|e| JobFailure::transient(anyhow::anyhow!(e)))?;

    tx.commit().await.map_err(db_failure)?;

    tracing::info!(
        lesson_id = %lesson.id,
        transcript_chars = transcript.chars().count(),
        "Lesson transcribed"
    );

    Ok(())
}

async fn execute_analysis(
    state: &AppState,
    engines: &Engines,
    ctx: &RequestContext,
    job: &Job,
) -> Result<(), JobFailure> {
    let lesson = load_lesson(state, ctx, job).await?;
    let Some(lesson) =
        claim_lesson_stage(state, ctx, &lesson, LessonStatus::Transcribed, LessonStatus::Analyzing)
            .await?
    else {
        return Ok(());
    };

    let transcript = lesson
        .transcript_text
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| JobFailure::permanent("lesson has no transcript to analyze"))?;

    let planned_objectives = match lesson.plan_id.as_deref() {
        Some(plan_id) => {
            repositories::objectives::list_codes_for_plan(state.db(), ctx.tenant_id(), plan_id)
                .await
                .map_err(db_failure)?
        }
        None => repositories::objectives::list_for_subject(
            state.db(),
            ctx.tenant_id(),
            &lesson.subject,
        )
        .await
        .map_err(db_failure)?
        .into_iter()
        .map(|objective| objective.code)
        .collect(),
    };

    let outcome = engines
        .analysis
        .analyze(AnalysisRequest {
            transcript: transcript.to_string(),
            subject: lesson.subject.clone(),
            class_id: lesson.class_id.clone(),
            planned_objectives,
        })
        .await?;

    let existing =
        repositories::analyses::find_by_lesson(state.db(), ctx.tenant_id(), &lesson.id)
            .await
            .map_err(db_failure)?;

    let now = primitive_now_utc();
    let mut tx = state.db().begin().await.map_err(db_failure)?;

    // A retry after a commit-then-crash already has the row; only the status
    // flip is still owed.
    if existing.is_none() {
        repositories::analyses::create(
            &mut *tx,
            repositories::analyses::CreateAnalysis {
                id: &Uuid::new_v4().to_string(),
                tenant_id: ctx.tenant_id(),
                lesson_id: &lesson.id,
                coverage: outcome.coverage,
                evaluation: outcome.evaluation,
                report_text: &outcome.report_text,
                exercises: outcome.exercises,
                alerts: outcome.alerts,
                model_version: &outcome.model_version,
                prompt_version: &outcome.prompt_version,
                cost_cents: outcome.cost_cents,
                processing_seconds: Some(outcome.processing_seconds),
                now,
            },
        )
        .await
        .map_err(db_failure)?;
    }

    let moved = repositories::lessons::transition(
        &mut *tx,
        ctx.tenant_id(),
        &lesson.id,
        LessonStatus::Analyzing,
        LessonStatus::Analyzed,
        now,
    )
    .await
    .map_err(db_failure)?;
    if !moved {
        tx.rollback().await.map_err(db_failure)?;
        tracing::info!(lesson_id = %lesson.id, "Analysis discarded, lesson moved concurrently");
        return Ok(());
    }

    tx.commit().await.map_err(db_failure)?;

    metrics::histogram!("lesson_analysis_seconds").record(outcome.processing_seconds);
    tracing::info!(
        lesson_id = %lesson.id,
        model = %outcome.model_version,
        processing_seconds = outcome.processing_seconds,
        "Lesson analyzed, awaiting review"
    );

    Ok(())
}

async fn execute_report_diff(
    state: &AppState,
    ctx: &RequestContext,
    job: &Job,
) -> Result<(), JobFailure> {
    let analysis_id = payload_analysis_id(&job.payload.0)?;
    let analysis = repositories::analyses::find_by_id(state.db(), ctx.tenant_id(), analysis_id)
        .await
        .map_err(db_failure)?
        .ok_or_else(|| JobFailure::permanent("analysis no longer exists"))?;

    let existing =
        repositories::feedback::list_by_analysis(state.db(), ctx.tenant_id(), &analysis.id)
            .await
            .map_err(db_failure)?;
    if existing.iter().any(|signal| signal.kind == FeedbackKind::EditDiff) {
        return Ok(());
    }

    let mut payload = json!({ "exercises_edited": analysis.exercises_edited.is_some() });
    if let Some(edited) = analysis.report_text_edited.as_deref() {
        let diff = report_diff::diff_reports(&analysis.report_text, edited);
        payload["report"] =
            serde_json::to_value(&diff).map_err(|e| JobFailure::transient(anyhow::anyhow!(e)))?;
    }

    repositories::feedback::insert(
        state.db(),
        &Uuid::new_v4().to_string(),
        ctx.tenant_id(),
        &analysis.id,
        FeedbackKind::EditDiff,
        payload,
        primitive_now_utc(),
    )
    .await
    .map_err(db_failure)?;

    tracing::info!(analysis_id = %analysis.id, "Edit diff signal recorded");

    Ok(())
}

async fn execute_rejection_feedback(
    state: &AppState,
    ctx: &RequestContext,
    job: &Job,
) -> Result<(), JobFailure> {
    let analysis_id = payload_analysis_id(&job.payload.0)?;
    let analysis = repositories::analyses::find_by_id(state.db(), ctx.tenant_id(), analysis_id)
        .await
        .map_err(db_failure)?
        .ok_or_else(|| JobFailure::permanent("analysis no longer exists"))?;

    let existing =
        repositories::feedback::list_by_analysis(state.db(), ctx.tenant_id(), &analysis.id)
            .await
            .map_err(db_failure)?;
    if existing.iter().any(|signal| signal.kind == FeedbackKind::Rejection) {
        return Ok(());
    }

    let reason = job
        .payload
        .0
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| analysis.rejection_reason.clone())
        .ok_or_else(|| JobFailure::permanent("rejection feedback has no reason"))?;

    repositories::feedback::insert(
        state.db(),
        &Uuid::new_v4().to_string(),
        ctx.tenant_id(),
        &analysis.id,
        FeedbackKind::Rejection,
        json!({ "reason": reason, "model_version": analysis.model_version }),
        primitive_now_utc(),
    )
    .await
    .map_err(db_failure)?;

    tracing::info!(analysis_id = %analysis.id, "Rejection signal recorded");

    Ok(())
}

async fn execute_coverage_refresh(
    state: &AppState,
    ctx: &RequestContext,
    job: &Job,
) -> Result<(), JobFailure> {
    let plan_id = job
        .payload
        .0
        .get("plan_id")
        .and_then(Value::as_str)
        .ok_or_else(|| JobFailure::permanent("coverage refresh payload missing plan_id"))?;

    let plan = repositories::plans::find_by_id(state.db(), ctx.tenant_id(), plan_id)
        .await
        .map_err(db_failure)?
        .ok_or_else(|| JobFailure::permanent("plan no longer exists"))?;

    crate::services::coverage::refresh_view_for_plan(state.db(), ctx, &plan)
        .await
        .map_err(|e| JobFailure::transient(anyhow::anyhow!(e)))?;

    Ok(())
}

async fn load_lesson(
    state: &AppState,
    ctx: &RequestContext,
    job: &Job,
) -> Result<Lesson, JobFailure> {
    let lesson_id = job
        .lesson_id
        .as_deref()
        .ok_or_else(|| JobFailure::permanent("processing job has no lesson"))?;
    repositories::lessons::find_by_id(state.db(), ctx.tenant_id(), lesson_id)
        .await
        .map_err(db_failure)?
        .ok_or_else(|| JobFailure::permanent("lesson no longer exists"))
}

/// Moves the lesson into the stage's working status. Returns None when the
/// lesson is elsewhere and the job should complete as a no-op; a lesson
/// already in the working status is this job's own earlier attempt and
/// processing continues.
async fn claim_lesson_stage(
    state: &AppState,
    ctx: &RequestContext,
    lesson: &Lesson,
    from: LessonStatus,
    working: LessonStatus,
) -> Result<Option<Lesson>, JobFailure> {
    let moved = repositories::lessons::transition(
        state.db(),
        ctx.tenant_id(),
        &lesson.id,
        from,
        working,
        primitive_now_utc(),
    )
    .await
    .map_err(db_failure)?;

    if moved || lesson.status == working {
        let current =
            repositories::lessons::find_by_id(state.db(), ctx.tenant_id(), &lesson.id)
                .await
                .map_err(db_failure)?
                .ok_or_else(|| JobFailure::permanent("lesson no longer exists"))?;
        return Ok(Some(current));
    }

    tracing::info!(
        lesson_id = %lesson.id,
        status = ?lesson.status,
        expected = ?from,
        "Skipping job, lesson is not at the expected stage"
    );
    Ok(None)
}

fn payload_analysis_id(payload: &Value) -> Result<&str, JobFailure> {
    payload
        .get("analysis_id")
        .and_then(Value::as_str)
        .ok_or_else(|| JobFailure::permanent("job payload missing analysis_id"))
}

fn db_failure(err: sqlx::Error) -> JobFailure {
    JobFailure::transient(anyhow::anyhow!(err).context("database operation failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt_with_bounded_jitter() {
        for (attempt, base_expected) in [(1, 5), (2, 10), (3, 20), (4, 40)] {
            let delay = backoff_delay(5, attempt);
            let floor = Duration::from_secs(base_expected);
            assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
            assert!(delay < floor + Duration::from_secs(1), "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn backoff_treats_zeroth_attempt_as_first() {
        assert!(backoff_delay(5, 0) >= Duration::from_secs(5));
    }

    #[test]
    fn backoff_does_not_overflow_on_large_attempts() {
        let delay = backoff_delay(5, 1000);
        assert!(delay >= Duration::from_secs(5));
    }

    #[test]
    fn transient_failure_with_attempts_left_is_retried() {
        let failure = JobFailure::transient(anyhow::anyhow!("engine returned status 502"));
        assert!(should_retry(&failure, 1, 3));
        assert!(should_retry(&failure, 2, 3));
    }

    #[test]
    fn transient_failure_out_of_attempts_ends_processing() {
        let failure = JobFailure::transient(anyhow::anyhow!("engine returned status 502"));
        assert!(!should_retry(&failure, 3, 3));
        assert!(!should_retry(&failure, 4, 3));
    }

    #[test]
    fn permanent_failure_is_never_retried() {
        let failure = JobFailure::permanent("transcription produced an empty transcript");
        assert!(!should_retry(&failure, 1, 3));
    }
}
