use crate::{error::AppError, state::AppState};
use serde::Serialize;
use sqlx::SqlitePool;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
    pub db: &'static str,
    pub trackers: usize,
    pub active_trackers: usize,
    pub has_credential: bool,
}

async fn probe_db(pool: &SqlitePool) -> &'static str {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await
    {
        Ok(_) => "ok",
        Err(_) => "error",
    }
}

pub async fn health(state: &AppState) -> Result<HealthResponse, AppError> {
    let db = probe_db(&state.db_pool).await;
    let registry = state.registry.lock().await;

    Ok(HealthResponse {
        status: "ok",
        uptime_ms: state.started_at.elapsed().as_millis(),
        db,
        trackers: registry.len(),
        active_trackers: registry.active_count(),
        has_credential: registry.has_credential(),
    })
}
