use crate::error::FetchError;
use crate::market::chart::merge_payload;
use crate::market::orderbook::reduce;
use crate::market::stockbit::QuoteSource;
use crate::market::types::{
    now_unix_ms, ChartRow, FetchStats, PollPhase, PollerConfig, QuoteSnapshot, TrackerEvent,
    TrackerId, TrackerSnapshot,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a polling task needs from its registry.
#[derive(Clone)]
pub struct PollerContext {
    pub source: Arc<dyn QuoteSource>,
    pub config: PollerConfig,
    pub events: broadcast::Sender<TrackerEvent>,
}

pub struct PollHandle {
    pub cancellation_token: CancellationToken,
    pub join_handle: JoinHandle<()>,
}

/// Owns the fetch lifecycle of one tracked instrument. At most one poll
/// loop is alive per instance: every restart cancels and joins the previous
/// loop before a new one is spawned.
pub struct InstrumentPoller {
    id: TrackerId,
    symbol: String,
    credential: String,
    context: PollerContext,
    status_store: Arc<RwLock<TrackerSnapshot>>,
    stats: Arc<Mutex<FetchStats>>,
    handle: Option<PollHandle>,
}

impl InstrumentPoller {
    pub fn new(id: TrackerId, credential: String, context: PollerContext) -> Self {
        Self {
            id,
            symbol: String::new(),
            credential,
            context,
            status_store: Arc::new(RwLock::new(TrackerSnapshot::idle(id))),
            stats: Arc::new(Mutex::new(FetchStats::default())),
            handle: None,
        }
    }

    pub fn id(&self) -> TrackerId {
        self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        self.status_store.read().await.clone()
    }

    /// Selecting a symbol always restarts the cycle, even for the same symbol.
    pub async fn set_symbol(&mut self, symbol: String) {
        self.symbol = symbol;
        self.reconcile().await;
    }

    pub async fn set_credential(&mut self, credential: String) {
        self.credential = credential;
        self.reconcile().await;
    }

    pub async fn shutdown(mut self) {
        self.stop().await;
    }

    async fn reconcile(&mut self) {
        self.stop().await;

        if self.symbol.is_empty() || self.credential.is_empty() {
            self.publish_phase(PollPhase::Idle).await;
            return;
        }

        self.publish_phase(PollPhase::Active).await;
        self.start();
    }

    fn start(&mut self) {
        let cancellation_token = CancellationToken::new();
        let poll_loop = PollLoop {
            id: self.id,
            symbol: self.symbol.clone(),
            credential: self.credential.clone(),
            context: self.context.clone(),
            status_store: Arc::clone(&self.status_store),
            stats: Arc::clone(&self.stats),
            cancel_token: cancellation_token.clone(),
        };

        info!(tracker = %self.id, symbol = %self.symbol, "starting poll loop");
        let join_handle = tokio::spawn(run_poll_loop(poll_loop));
        self.handle = Some(PollHandle {
            cancellation_token,
            join_handle,
        });
    }

    async fn stop(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };

        handle.cancellation_token.cancel();
        let _ = handle.join_handle.await;
        debug!(tracker = %self.id, "poll loop stopped");
        true
    }

    async fn publish_phase(&self, phase: PollPhase) {
        let snapshot = {
            let mut writable = self.status_store.write().await;
            writable.symbol = self.symbol.clone();
            writable.phase = phase;
            writable.quote.loading = false;
            writable.chart.loading = false;
            writable.stats = *self.stats.lock();
            writable.clone()
        };
        let _ = self.context.events.send(TrackerEvent::Updated(snapshot));
    }
}

struct PollLoop {
    id: TrackerId,
    symbol: String,
    credential: String,
    context: PollerContext,
    status_store: Arc<RwLock<TrackerSnapshot>>,
    stats: Arc<Mutex<FetchStats>>,
    cancel_token: CancellationToken,
}

impl PollLoop {
    /// Applies `update` to the status store unless this loop has been
    /// cancelled, in which case the result belongs to a superseded cycle.
    async fn publish<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut TrackerSnapshot),
    {
        let snapshot = {
            let mut writable = self.status_store.write().await;
            if self.cancel_token.is_cancelled() {
                return false;
            }
            update(&mut *writable);
            writable.stats = *self.stats.lock();
            writable.clone()
        };
        let _ = self.context.events.send(TrackerEvent::Updated(snapshot));
        true
    }
}

async fn run_poll_loop(poll: PollLoop) {
    let mut ticker = tokio::time::interval(poll.context.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = poll.cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // The next tick is only awaited once this cycle is done, so fetches
        // for one instrument never overlap.
        tokio::select! {
            biased;
            _ = poll.cancel_token.cancelled() => break,
            _ = poll_cycle(&poll) => {}
        }
    }

    debug!(tracker = %poll.id, symbol = %poll.symbol, "poll loop exited");
}

async fn poll_cycle(poll: &PollLoop) {
    let began = poll
        .publish(|status| {
            status.quote.begin();
            status.chart.begin();
        })
        .await;
    if !began {
        return;
    }

    let started_at = Instant::now();
    let (quote, chart) = tokio::join!(fetch_quote(poll), fetch_chart(poll));
    let round_trip_ms = started_at.elapsed().as_millis().min(u64::MAX as u128) as u64;
    poll.stats
        .lock()
        .record_cycle(round_trip_ms, quote.is_err() || chart.is_err());

    let now_ms = now_unix_ms();
    let quote_outcome = quote.map_err(|error| {
        warn!(tracker = %poll.id, symbol = %poll.symbol, %error, "order book fetch failed");
        format!("failed to fetch order book for {}: {error}", poll.symbol)
    });
    let chart_outcome = chart.map_err(|error| {
        warn!(tracker = %poll.id, symbol = %poll.symbol, %error, "chart fetch failed");
        format!("failed to fetch chart data for {}: {error}", poll.symbol)
    });

    poll.publish(move |status| {
        match quote_outcome {
            Ok(snapshot) => status.quote.succeed(snapshot, now_ms),
            Err(message) => status.quote.fail(message),
        }
        match chart_outcome {
            Ok(rows) => status.chart.succeed(rows, now_ms),
            Err(message) => status.chart.fail(message),
        }
    })
    .await;
}

async fn fetch_quote(poll: &PollLoop) -> Result<QuoteSnapshot, FetchError> {
    let payload = poll
        .context
        .source
        .fetch_order_book(&poll.symbol, &poll.credential)
        .await?;
    reduce(payload)
}

async fn fetch_chart(poll: &PollLoop) -> Result<Vec<ChartRow>, FetchError> {
    let payload = poll
        .context
        .source
        .fetch_chart_events(
            &poll.symbol,
            &poll.credential,
            poll.context.config.chart_interval_minutes,
        )
        .await?;
    merge_payload(payload)
}
