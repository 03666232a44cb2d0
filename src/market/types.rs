use crate::error::AppError;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_BASE_URL: &str = "https://exodus.stockbit.com";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_DEPTH_ROWS: usize = 10;
pub const DEFAULT_CHART_INTERVAL_MINUTES: u32 = 1;
pub const MIN_POLL_INTERVAL_MS: u64 = 5_000;
pub const MAX_POLL_INTERVAL_MS: u64 = 3_600_000;
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 1_000;
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 120_000;
pub const MIN_DEPTH_ROWS: usize = 1;
pub const MAX_DEPTH_ROWS: usize = 50;
pub const MIN_CHART_INTERVAL_MINUTES: u32 = 1;
pub const MAX_CHART_INTERVAL_MINUTES: u32 = 60;
pub const SYMBOL_LEN: usize = 4;

pub fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerId(pub u64);

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedInstrument {
    pub id: TrackerId,
    pub symbol: String,
}

/// Trims and upper-cases a user supplied ticker. An empty input clears the
/// selection; anything else must be a four character alphanumeric code.
pub fn normalize_symbol(raw: &str) -> Result<String, AppError> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Ok(symbol);
    }

    if symbol.len() != SYMBOL_LEN || !symbol.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidArgument(format!(
            "symbol must be {SYMBOL_LEN} alphanumeric ASCII characters, got '{}'",
            raw.trim()
        )));
    }

    Ok(symbol)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollerSettingsArgs {
    pub base_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub depth_rows: Option<usize>,
    pub chart_interval_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    pub base_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub depth_rows: usize,
    pub chart_interval_minutes: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            depth_rows: DEFAULT_DEPTH_ROWS,
            chart_interval_minutes: DEFAULT_CHART_INTERVAL_MINUTES,
        }
    }
}

impl PollerSettingsArgs {
    pub fn normalize(self) -> Result<PollerConfig, AppError> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(AppError::InvalidArgument(
                "baseUrl must start with http:// or https://".to_string(),
            ));
        }

        let poll_interval_ms = self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&poll_interval_ms) {
            return Err(AppError::InvalidArgument(format!(
                "pollIntervalMs must be between {MIN_POLL_INTERVAL_MS} and {MAX_POLL_INTERVAL_MS}"
            )));
        }

        let request_timeout_ms = self
            .request_timeout_ms
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        if !(MIN_REQUEST_TIMEOUT_MS..=MAX_REQUEST_TIMEOUT_MS).contains(&request_timeout_ms) {
            return Err(AppError::InvalidArgument(format!(
                "requestTimeoutMs must be between {MIN_REQUEST_TIMEOUT_MS} and {MAX_REQUEST_TIMEOUT_MS}"
            )));
        }

        let depth_rows = self.depth_rows.unwrap_or(DEFAULT_DEPTH_ROWS);
        if !(MIN_DEPTH_ROWS..=MAX_DEPTH_ROWS).contains(&depth_rows) {
            return Err(AppError::InvalidArgument(format!(
                "depthRows must be between {MIN_DEPTH_ROWS} and {MAX_DEPTH_ROWS}"
            )));
        }

        let chart_interval_minutes = self
            .chart_interval_minutes
            .unwrap_or(DEFAULT_CHART_INTERVAL_MINUTES);
        if !(MIN_CHART_INTERVAL_MINUTES..=MAX_CHART_INTERVAL_MINUTES)
            .contains(&chart_interval_minutes)
        {
            return Err(AppError::InvalidArgument(format!(
                "chartIntervalMinutes must be between {MIN_CHART_INTERVAL_MINUTES} and {MAX_CHART_INTERVAL_MINUTES}"
            )));
        }

        Ok(PollerConfig {
            base_url,
            poll_interval: Duration::from_millis(poll_interval_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
            depth_rows,
            chart_interval_minutes,
        })
    }
}

// Wire types. Every field defaults so a sparse but well-formed payload still
// decodes; only a missing `data` object is treated as malformed. Scalar fields
// are read leniently: a null, a number where text is expected or text where a
// number is expected degrades that one field instead of failing the payload.

struct TextVisitor;

impl<'de> Visitor<'de> for TextVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a string, a number or null")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(value.to_string())
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Self::Value, E> {
        Ok(value)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(value.to_string())
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(value.to_string())
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        Ok(value.to_string())
    }

    fn visit_bool<E: de::Error>(self, _value: bool) -> Result<Self::Value, E> {
        Ok(String::new())
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(String::new())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(String::new())
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

struct NumberVisitor;

impl<'de> Visitor<'de> for NumberVisitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a number, a numeric string or null")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(Some(value as f64))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(Some(value as f64))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        Ok(Some(value).filter(|value| value.is_finite()))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite()))
    }

    fn visit_bool<E: de::Error>(self, _value: bool) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    deserializer.deserialize_any(TextVisitor)
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(deserializer.deserialize_any(NumberVisitor)?.unwrap_or(0.0))
}

fn lenient_optional_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    deserializer.deserialize_any(NumberVisitor)
}

/// A null in place of an object or array reads as its default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawQuotePayload {
    pub data: Option<RawQuoteData>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawQuoteData {
    #[serde(deserialize_with = "null_as_default")]
    pub bid: Vec<RawRow>,
    #[serde(deserialize_with = "null_as_default")]
    pub offer: Vec<RawRow>,
    #[serde(deserialize_with = "lenient_optional_number")]
    pub average: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub lastprice: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub change: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub percentage_change: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub open: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub high: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub low: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub previous: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub volume: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub value: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub frequency: f64,
    #[serde(deserialize_with = "lenient_text")]
    pub symbol: String,
    #[serde(deserialize_with = "null_as_default")]
    pub total_bid_offer: RawTotalBidOffer,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRow {
    #[serde(deserialize_with = "lenient_text")]
    pub price: String,
    #[serde(deserialize_with = "lenient_text")]
    pub que_num: String,
    #[serde(deserialize_with = "lenient_text")]
    pub volume: String,
    #[serde(deserialize_with = "lenient_text")]
    pub change_percentage: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTotalBidOffer {
    #[serde(deserialize_with = "null_as_default")]
    pub bid: RawSideTotal,
    #[serde(deserialize_with = "null_as_default")]
    pub offer: RawSideTotal,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSideTotal {
    #[serde(deserialize_with = "lenient_text")]
    pub freq: String,
    #[serde(deserialize_with = "lenient_text")]
    pub lot: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawChartPayload {
    pub data: Option<RawChartData>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawChartData {
    #[serde(deserialize_with = "null_as_default")]
    pub buy: Vec<RawEvent>,
    #[serde(deserialize_with = "null_as_default")]
    pub sell: Vec<RawEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawEvent {
    #[serde(deserialize_with = "lenient_text")]
    pub time: String,
    #[serde(deserialize_with = "null_as_default")]
    pub lot: RawMetric,
    #[serde(deserialize_with = "null_as_default")]
    pub frequency: RawMetric,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawMetric {
    #[serde(deserialize_with = "lenient_text")]
    pub raw: String,
    pub formatted: Option<String>,
}

// Normalized, presentation-facing types.

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriceClass {
    Above,
    Below,
    Equal,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookRow {
    pub price: String,
    pub que_num: String,
    pub volume: String,
    pub change_percentage: String,
    pub price_class: PriceClass,
}

impl OrderBookRow {
    pub fn placeholder() -> Self {
        Self {
            price: String::new(),
            que_num: String::new(),
            volume: String::new(),
            change_percentage: String::new(),
            price_class: PriceClass::Neutral,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.price.is_empty()
            && self.que_num.is_empty()
            && self.volume.is_empty()
            && self.change_percentage.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SideTotals {
    pub frequency: String,
    pub lot: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BidOfferTotals {
    pub bid: SideTotals,
    pub offer: SideTotals,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSnapshot {
    pub symbol: String,
    pub last_price: f64,
    pub change: f64,
    pub percentage_change: f64,
    pub change_direction: ChangeDirection,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub previous: f64,
    pub volume: f64,
    pub value: f64,
    pub frequency: f64,
    pub average: Option<f64>,
    pub bids: Vec<OrderBookRow>,
    pub offers: Vec<OrderBookRow>,
    pub totals: BidOfferTotals,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartRow {
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PollPhase {
    Idle,
    Active,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedState<T> {
    pub loading: bool,
    pub error: Option<String>,
    pub data: Option<T>,
    pub updated_at_ms: Option<i64>,
}

impl<T> Default for FeedState<T> {
    fn default() -> Self {
        Self {
            loading: false,
            error: None,
            data: None,
            updated_at_ms: None,
        }
    }
}

impl<T> FeedState<T> {
    pub fn begin(&mut self) {
        self.loading = true;
        self.error = None;
    }

    pub fn succeed(&mut self, data: T, now_ms: i64) {
        self.data = Some(data);
        self.error = None;
        self.loading = false;
        self.updated_at_ms = Some(now_ms);
    }

    /// Keeps whatever data was held before; stale data beats no data.
    pub fn fail(&mut self, message: String) {
        self.error = Some(message);
        self.loading = false;
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FetchStats {
    pub cycles: u64,
    pub failures: u64,
    pub last_round_trip_ms: Option<u64>,
}

impl FetchStats {
    pub fn record_cycle(&mut self, round_trip_ms: u64, failed: bool) {
        self.cycles = self.cycles.saturating_add(1);
        if failed {
            self.failures = self.failures.saturating_add(1);
        }
        self.last_round_trip_ms = Some(round_trip_ms);
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub id: TrackerId,
    pub symbol: String,
    pub phase: PollPhase,
    pub quote: FeedState<QuoteSnapshot>,
    pub chart: FeedState<Vec<ChartRow>>,
    pub stats: FetchStats,
}

impl TrackerSnapshot {
    pub fn idle(id: TrackerId) -> Self {
        Self {
            id,
            symbol: String::new(),
            phase: PollPhase::Idle,
            quote: FeedState::default(),
            chart: FeedState::default(),
            stats: FetchStats::default(),
        }
    }

    pub fn loading(&self) -> bool {
        self.quote.loading || self.chart.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.quote.error.as_deref().or(self.chart.error.as_deref())
    }

    /// One line summary used by the console shell.
    pub fn summary(&self) -> String {
        let symbol = if self.symbol.is_empty() {
            "-"
        } else {
            self.symbol.as_str()
        };
        let mut line = format!("{} {symbol} [{:?}]", self.id, self.phase);

        if let Some(quote) = &self.quote.data {
            line.push_str(&format!(
                " last={} chg={:+} ({:+}%) bids={} offers={}",
                quote.last_price,
                quote.change,
                quote.percentage_change,
                quote.bids.len(),
                quote.offers.len()
            ));
        }
        if let Some(rows) = &self.chart.data {
            line.push_str(&format!(" chart={} buckets", rows.len()));
        }
        if self.loading() {
            line.push_str(" loading");
        }
        if let Some(error) = self.error() {
            line.push_str(&format!(" error=\"{error}\""));
        }
        line
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TrackerEvent {
    Updated(TrackerSnapshot),
    Removed { id: TrackerId },
}
