use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::storage::StorageService;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    storage: Option<StorageService>,
}

impl AppState {
    pub fn new(settings: Settings, db: PgPool, storage: Option<StorageService>) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, storage }) }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub fn storage(&self) -> Option<&StorageService> {
        self.inner.storage.as_ref()
    }
}
