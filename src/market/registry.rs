use crate::error::AppError;
use crate::market::poller::{InstrumentPoller, PollerContext};
use crate::market::stockbit::QuoteSource;
use crate::market::types::{
    normalize_symbol, PollerConfig, TrackedInstrument, TrackerEvent, TrackerId, TrackerSnapshot,
};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The set of tracked instruments. Never empty: it starts with one tracker
/// and refuses to remove the last one.
pub struct TrackerRegistry {
    context: PollerContext,
    credential: String,
    next_id: u64,
    pollers: BTreeMap<TrackerId, InstrumentPoller>,
}

impl TrackerRegistry {
    pub fn new(source: Arc<dyn QuoteSource>, config: PollerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut registry = Self {
            context: PollerContext {
                source,
                config,
                events,
            },
            credential: String::new(),
            next_id: 1,
            pollers: BTreeMap::new(),
        };
        registry.add();
        registry
    }

    pub fn config(&self) -> &PollerConfig {
        &self.context.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.context.events.subscribe()
    }

    pub fn has_credential(&self) -> bool {
        !self.credential.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pollers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pollers.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.pollers
            .values()
            .filter(|poller| poller.is_active())
            .count()
    }

    pub fn first_id(&self) -> Option<TrackerId> {
        self.pollers.keys().next().copied()
    }

    pub fn tracked(&self) -> Vec<TrackedInstrument> {
        self.pollers
            .values()
            .map(|poller| TrackedInstrument {
                id: poller.id(),
                symbol: poller.symbol().to_string(),
            })
            .collect()
    }

    pub fn add(&mut self) -> TrackedInstrument {
        let id = TrackerId(self.next_id);
        self.next_id += 1;

        let poller = InstrumentPoller::new(id, self.credential.clone(), self.context.clone());
        self.pollers.insert(id, poller);
        let _ = self
            .context
            .events
            .send(TrackerEvent::Updated(TrackerSnapshot::idle(id)));
        info!(tracker = %id, "tracker added");

        TrackedInstrument {
            id,
            symbol: String::new(),
        }
    }

    /// Returns `Ok(false)` when `id` is the only tracker left.
    pub async fn remove(&mut self, id: TrackerId) -> Result<bool, AppError> {
        if self.pollers.len() <= 1 {
            return Ok(false);
        }

        let poller = self
            .pollers
            .remove(&id)
            .ok_or(AppError::TrackerNotFound(id.0))?;
        poller.shutdown().await;
        let _ = self.context.events.send(TrackerEvent::Removed { id });
        info!(tracker = %id, "tracker removed");

        Ok(true)
    }

    pub async fn select_symbol(
        &mut self,
        id: TrackerId,
        raw_symbol: &str,
    ) -> Result<TrackedInstrument, AppError> {
        let poller = self
            .pollers
            .get_mut(&id)
            .ok_or(AppError::TrackerNotFound(id.0))?;
        let symbol = normalize_symbol(raw_symbol)?;

        poller.set_symbol(symbol.clone()).await;
        Ok(TrackedInstrument { id, symbol })
    }

    /// Restarts every tracker that has a symbol with the new credential.
    /// Setting the value already in use is a no-op.
    pub async fn set_credential(&mut self, value: &str) {
        let credential = value.trim().to_string();
        if credential == self.credential {
            return;
        }
        self.credential = credential;

        let credential = &self.credential;
        join_all(
            self.pollers
                .values_mut()
                .map(|poller| poller.set_credential(credential.clone())),
        )
        .await;
        info!(
            active = self.active_count(),
            cleared = credential.is_empty(),
            "credential updated"
        );
    }

    pub async fn snapshot(&self, id: TrackerId) -> Result<TrackerSnapshot, AppError> {
        let poller = self
            .pollers
            .get(&id)
            .ok_or(AppError::TrackerNotFound(id.0))?;
        Ok(poller.snapshot().await)
    }

    pub async fn snapshots(&self) -> Vec<TrackerSnapshot> {
        join_all(self.pollers.values().map(|poller| poller.snapshot())).await
    }

    pub async fn shutdown(&mut self) {
        let pollers = std::mem::take(&mut self.pollers);
        join_all(pollers.into_values().map(|poller| poller.shutdown())).await;
    }
}
