use anyhow::Result;
use serde_json::json;

use crate::core::errors::JobFailure;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::JobKind;
use crate::repositories;
use crate::services::dispatch;
use crate::tasks::processing;

/// Returns jobs stuck in `running` to the queue. A job sits there past the
/// cutoff only when the worker that claimed it died mid-attempt; the attempt
/// was already counted at claim time, so jobs out of attempts fail instead.
pub(crate) async fn recover_stale_jobs(state: &AppState) -> Result<()> {
    let now = primitive_now_utc();
    // Twice the attempt timeout: a live attempt can never last that long.
    let grace = time::Duration::seconds(
        (state.settings().jobs().attempt_timeout_seconds * 2) as i64,
    );
    let stale = repositories::jobs::list_stale_running(state.db(), now - grace).await?;

    for job in stale {
        if job.attempts < job.max_attempts {
            repositories::jobs::reschedule(
                state.db(),
                &job.id,
                now,
                "attempt lost, worker did not settle the job",
                now,
            )
            .await?;
            tracing::warn!(job_id = %job.id, kind = job.kind.as_str(), "Stale running job requeued");
        } else {
            let failure = JobFailure::permanent("attempt lost and no attempts remain");
            processing::give_up(state, &job, &failure).await?;
        }
    }

    Ok(())
}

/// Enqueues a coverage refresh for every active plan. The idempotency key
/// makes this safe to run on a timer; a still-queued refresh is not
/// duplicated.
pub(crate) async fn dispatch_coverage_refreshes(state: &AppState) -> Result<()> {
    let plans = repositories::plans::list_active(state.db()).await?;

    let mut enqueued = 0usize;
    for plan in &plans {
        let landed = dispatch::dispatch_unbound(
            state.db(),
            state.settings().jobs(),
            &plan.tenant_id,
            JobKind::CoverageRefresh,
            json!({ "plan_id": plan.id }),
        )
        .await?;
        if landed {
            enqueued += 1;
        }
    }

    tracing::debug!(plans = plans.len(), enqueued, "Coverage refresh sweep complete");

    Ok(())
}
