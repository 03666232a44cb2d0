//! Scripted in-memory quote source shared by the poller and registry tests.

use crate::error::FetchError;
use crate::market::stockbit::QuoteSource;
use crate::market::types::{
    RawChartData, RawChartPayload, RawEvent, RawMetric, RawQuoteData, RawQuotePayload, RawRow,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub symbol: String,
    pub credential: String,
    pub at: tokio::time::Instant,
}

#[derive(Debug, Default)]
pub struct ScriptedSource {
    order_book_calls: Mutex<Vec<FetchCall>>,
    chart_calls: Mutex<Vec<FetchCall>>,
    delay: Mutex<Duration>,
    fail_order_book: AtomicBool,
    fail_chart: AtomicBool,
    order_book_in_flight: AtomicUsize,
    max_order_book_in_flight: AtomicUsize,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedSource {
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn fail_order_book(&self, fail: bool) {
        self.fail_order_book.store(fail, Ordering::SeqCst);
    }

    pub fn fail_chart(&self, fail: bool) {
        self.fail_chart.store(fail, Ordering::SeqCst);
    }

    pub fn order_book_calls(&self) -> Vec<FetchCall> {
        self.order_book_calls.lock().clone()
    }

    pub fn chart_calls(&self) -> Vec<FetchCall> {
        self.chart_calls.lock().clone()
    }

    pub fn max_order_book_in_flight(&self) -> usize {
        self.max_order_book_in_flight.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn call(symbol: &str, credential: &str) -> FetchCall {
    FetchCall {
        symbol: symbol.to_string(),
        credential: credential.to_string(),
        at: tokio::time::Instant::now(),
    }
}

fn event(time: &str, lot: &str) -> RawEvent {
    RawEvent {
        time: time.to_string(),
        lot: RawMetric {
            raw: lot.to_string(),
            formatted: Some(lot.to_string()),
        },
        frequency: RawMetric::default(),
    }
}

pub fn sample_quote_payload(symbol: &str) -> RawQuotePayload {
    let row = |price: &str| RawRow {
        price: price.to_string(),
        que_num: "4".to_string(),
        volume: "2500".to_string(),
        change_percentage: "0.00".to_string(),
    };

    RawQuotePayload {
        data: Some(RawQuoteData {
            bid: vec![row("1000"), row("995")],
            offer: vec![row("1005")],
            lastprice: 1000.0,
            change: 5.0,
            percentage_change: 0.5,
            previous: 995.0,
            symbol: symbol.to_string(),
            ..Default::default()
        }),
        message: None,
    }
}

pub fn sample_chart_payload() -> RawChartPayload {
    RawChartPayload {
        data: Some(RawChartData {
            buy: vec![event("09:00", "100")],
            sell: vec![event("09:00", "50"), event("09:01", "10")],
        }),
        message: None,
    }
}

#[async_trait]
impl QuoteSource for ScriptedSource {
    async fn fetch_order_book(
        &self,
        symbol: &str,
        credential: &str,
    ) -> Result<RawQuotePayload, FetchError> {
        self.order_book_calls.lock().push(call(symbol, credential));
        let in_flight = self.order_book_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_order_book_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.order_book_in_flight);

        self.wait().await;
        if self.fail_order_book.load(Ordering::SeqCst) {
            return Err(FetchError::NetworkFailure("connection reset".to_string()));
        }
        Ok(sample_quote_payload(symbol))
    }

    async fn fetch_chart_events(
        &self,
        symbol: &str,
        credential: &str,
        _time_interval_minutes: u32,
    ) -> Result<RawChartPayload, FetchError> {
        self.chart_calls.lock().push(call(symbol, credential));

        self.wait().await;
        if self.fail_chart.load(Ordering::SeqCst) {
            return Err(FetchError::BadStatus(502));
        }
        Ok(sample_chart_payload())
    }
}

/// Lets spawned poll loops run their immediate first cycle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
