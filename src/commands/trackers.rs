use crate::error::AppError;
use crate::market::orderbook::align_depth;
use crate::market::types::{OrderBookRow, TrackedInstrument, TrackerId, TrackerSnapshot};
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectSymbolArgs {
    pub id: u64,
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackerRemoveResult {
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResult {
    pub has_credential: bool,
    pub active_trackers: usize,
}

/// Order book of one tracker cut to the configured depth. Both sides always
/// hold exactly `rows` entries so they can be laid out side by side.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackerDepth {
    pub id: TrackerId,
    pub symbol: String,
    pub rows: usize,
    pub bids: Vec<OrderBookRow>,
    pub offers: Vec<OrderBookRow>,
}

pub async fn add_tracker(state: &AppState) -> Result<TrackedInstrument, AppError> {
    let mut registry = state.registry.lock().await;
    Ok(registry.add())
}

pub async fn remove_tracker(state: &AppState, id: u64) -> Result<TrackerRemoveResult, AppError> {
    let mut registry = state.registry.lock().await;
    let removed = registry.remove(TrackerId(id)).await?;
    Ok(TrackerRemoveResult { removed })
}

pub async fn select_tracker_symbol(
    state: &AppState,
    args: SelectSymbolArgs,
) -> Result<TrackedInstrument, AppError> {
    let mut registry = state.registry.lock().await;
    registry.select_symbol(TrackerId(args.id), &args.symbol).await
}

/// Persists the credential first so a storage failure leaves the running
/// trackers untouched.
pub async fn set_auth_token(state: &AppState, value: &str) -> Result<CredentialResult, AppError> {
    state.credential_store.save(value).await?;

    let mut registry = state.registry.lock().await;
    registry.set_credential(value).await;
    Ok(CredentialResult {
        has_credential: registry.has_credential(),
        active_trackers: registry.active_count(),
    })
}

/// Pushes the stored credential, if any, into the registry.
pub async fn restore_credential(state: &AppState) -> Result<CredentialResult, AppError> {
    let stored = state.credential_store.load().await?;

    let mut registry = state.registry.lock().await;
    if let Some(value) = stored {
        info!("restoring saved credential");
        registry.set_credential(&value).await;
    }
    Ok(CredentialResult {
        has_credential: registry.has_credential(),
        active_trackers: registry.active_count(),
    })
}

pub async fn tracker_statuses(state: &AppState) -> Result<Vec<TrackerSnapshot>, AppError> {
    let registry = state.registry.lock().await;
    Ok(registry.snapshots().await)
}

pub async fn tracker_depth(state: &AppState, id: u64) -> Result<TrackerDepth, AppError> {
    let registry = state.registry.lock().await;
    let rows = registry.config().depth_rows;
    let snapshot = registry.snapshot(TrackerId(id)).await?;

    let (bids, offers) = match &snapshot.quote.data {
        Some(quote) => quote.depth(rows),
        None => align_depth(&[], &[], rows),
    };

    Ok(TrackerDepth {
        id: snapshot.id,
        symbol: snapshot.symbol,
        rows,
        bids,
        offers,
    })
}
