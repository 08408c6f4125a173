use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::tasks::maintenance;
use crate::tasks::processing::{self, Engines};

pub async fn run(state: AppState) -> Result<()> {
    let engines = Engines::from_settings(state.settings())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let concurrency = state.settings().jobs().worker_concurrency;
    let mut handles = Vec::with_capacity(concurrency + 2);

    for _ in 0..concurrency {
        handles.push(tokio::spawn(job_worker(
            state.clone(),
            engines.clone(),
            shutdown_rx.clone(),
        )));
    }

    handles.push(tokio::spawn(stale_recovery_loop(state.clone(), shutdown_rx.clone())));
    handles.push(tokio::spawn(coverage_refresh_loop(state.clone(), shutdown_rx.clone())));

    tracing::info!(concurrency, "Worker scheduler started");

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn job_worker(state: AppState, engines: Engines, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match repositories::jobs::claim_next(state.db(), primitive_now_utc()).await {
            Ok(Some(job)) => {
                if let Err(err) = processing::process_claimed(&state, &engines, &job).await {
                    tracing::error!(
                        job_id = %job.id,
                        kind = job.kind.as_str(),
                        error = %err,
                        "Failed to settle job after attempt"
                    );
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(error = %err, "Failed to claim job"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(Duration::from_secs(2)) => {}
        }
    }
}

async fn stale_recovery_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick =
        interval(Duration::from_secs(state.settings().jobs().stale_recovery_interval_seconds));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::recover_stale_jobs(&state).await {
                    tracing::error!(error = %err, "recover_stale_jobs failed");
                }
            }
        }
    }
}

async fn coverage_refresh_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick =
        interval(Duration::from_secs(state.settings().jobs().coverage_refresh_interval_seconds));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::dispatch_coverage_refreshes(&state).await {
                    tracing::error!(error = %err, "dispatch_coverage_refreshes failed");
                }
            }
        }
    }
}
