pub mod core;
pub mod db;
pub mod repositories;
pub mod schemas;
pub mod services;
pub mod tasks;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::storage::StorageService;

/// Boots the lesson-processing worker: config, telemetry, database,
/// migrations, optional object storage, then the job scheduler until a
/// shutdown signal arrives.
pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let storage = StorageService::from_settings(&settings).await?;
    if storage.is_none() {
        tracing::warn!("Object storage not configured; audio lessons cannot be processed");
    }

    let state = AppState::new(settings, db_pool, storage);

    tracing::info!(
        environment = %state.settings().runtime().environment.as_str(),
        "Lesson-processing worker starting"
    );

    tasks::scheduler::run(state).await?;

    Ok(())
}
