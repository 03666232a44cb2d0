use crate::market::persistence::CredentialStore;
use crate::market::registry::TrackerRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

pub struct AppState {
    pub started_at: Instant,
    pub db_pool: SqlitePool,
    pub credential_store: Arc<dyn CredentialStore>,
    pub registry: Mutex<TrackerRegistry>,
}

impl AppState {
    pub fn new(
        db_pool: SqlitePool,
        credential_store: Arc<dyn CredentialStore>,
        registry: TrackerRegistry,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            db_pool,
            credential_store,
            registry: Mutex::new(registry),
        }
    }
}
