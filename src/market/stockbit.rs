use crate::error::{AppError, FetchError};
use crate::market::types::{PollerConfig, RawChartPayload, RawQuotePayload};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;

/// Remote quote service. Every polling task fetches through this seam.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_order_book(
        &self,
        symbol: &str,
        credential: &str,
    ) -> Result<RawQuotePayload, FetchError>;

    async fn fetch_chart_events(
        &self,
        symbol: &str,
        credential: &str,
        time_interval_minutes: u32,
    ) -> Result<RawChartPayload, FetchError>;
}

fn order_book_endpoint(base_url: &str, symbol: &str) -> String {
    format!(
        "{base_url}/company-price-feed/v2/orderbook/companies/{}",
        symbol.to_ascii_uppercase()
    )
}

fn chart_endpoint(base_url: &str, symbol: &str, time_interval_minutes: u32) -> String {
    format!(
        "{base_url}/order-trade/trade-book/chart?symbol={}&time_interval={time_interval_minutes}m",
        symbol.to_ascii_uppercase()
    )
}

fn bearer(credential: &str) -> String {
    format!("Bearer {}", credential.trim())
}

#[derive(Debug, Clone)]
pub struct StockbitClient {
    http_client: Client,
    base_url: String,
}

impl StockbitClient {
    pub fn new(config: &PollerConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: String,
        credential: &str,
    ) -> Result<T, FetchError> {
        let response = self
            .http_client
            .get(endpoint)
            .header(AUTHORIZATION, bearer(credential))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        let mut body = response.bytes().await?.to_vec();
        let payload = simd_json::serde::from_slice::<T>(&mut body)?;
        Ok(payload)
    }
}

#[async_trait]
impl QuoteSource for StockbitClient {
    async fn fetch_order_book(
        &self,
        symbol: &str,
        credential: &str,
    ) -> Result<RawQuotePayload, FetchError> {
        let endpoint = order_book_endpoint(&self.base_url, symbol);
        self.get_json(endpoint, credential).await
    }

    async fn fetch_chart_events(
        &self,
        symbol: &str,
        credential: &str,
        time_interval_minutes: u32,
    ) -> Result<RawChartPayload, FetchError> {
        let endpoint = chart_endpoint(&self.base_url, symbol, time_interval_minutes);
        self.get_json(endpoint, credential).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::chart::merge_payload;
    use crate::market::orderbook::reduce;
    use crate::market::types::DEFAULT_BASE_URL;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn order_book_endpoint_uses_uppercase_symbol() {
        let endpoint = order_book_endpoint(DEFAULT_BASE_URL, "bbca");
        assert_eq!(
            endpoint,
            "https://exodus.stockbit.com/company-price-feed/v2/orderbook/companies/BBCA"
        );
    }

    #[test]
    fn chart_endpoint_includes_symbol_and_interval() {
        let endpoint = chart_endpoint(DEFAULT_BASE_URL, "tlkm", 5);
        assert!(endpoint.contains("/order-trade/trade-book/chart"));
        assert!(endpoint.contains("symbol=TLKM"));
        assert!(endpoint.ends_with("time_interval=5m"));
    }

    #[test]
    fn bearer_header_trims_credential() {
        assert_eq!(bearer(" token-123 \n"), "Bearer token-123");
    }

    #[test]
    fn client_builds_from_default_config() {
        let client = StockbitClient::new(&PollerConfig::default())
            .expect("default config should build a client");
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }

    fn client_for(server: &MockServer) -> StockbitClient {
        let config = PollerConfig {
            base_url: server.uri(),
            ..PollerConfig::default()
        };
        StockbitClient::new(&config).expect("mock server url should build a client")
    }

    const ORDER_BOOK_BODY: &str = r#"{"data":{"bid":[{"price":"9000","que_num":"12","volume":"3400","change_percentage":"0.00"}],"offer":[],"lastprice":9000,"previous":8975,"symbol":"BBCA"},"message":"ok"}"#;

    #[tokio::test]
    async fn order_book_request_carries_bearer_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/company-price-feed/v2/orderbook/companies/BBCA"))
            .and(header("authorization", "Bearer tok"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ORDER_BOOK_BODY))
            .expect(1)
            .mount(&server)
            .await;

        let payload = client_for(&server)
            .fetch_order_book("bbca", " tok ")
            .await
            .expect("authorized request should succeed");

        let snapshot = reduce(payload).expect("payload should reduce");
        assert_eq!(snapshot.symbol, "BBCA");
        assert_eq!(snapshot.bids.len(), 1);
        server.verify().await;
    }

    #[tokio::test]
    async fn chart_request_sends_symbol_and_interval() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/order-trade/trade-book/chart"))
            .and(query_param("symbol", "TLKM"))
            .and(query_param("time_interval", "5m"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data":{"buy":[{"time":"09:00","lot":{"raw":"40"}}],"sell":[]}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let payload = client_for(&server)
            .fetch_chart_events("tlkm", "tok", 5)
            .await
            .expect("chart request should succeed");

        let rows = merge_payload(payload).expect("payload should merge");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].buy, Some(40.0));
        server.verify().await;
    }

    #[tokio::test]
    async fn non_success_status_is_bad_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"message":"expired"}"#))
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_order_book("BBCA", "stale").await;

        assert_eq!(result.err(), Some(FetchError::BadStatus(401)));
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_order_book("BBCA", "tok").await;

        assert!(matches!(result, Err(FetchError::MalformedPayload(_))));
    }

    #[tokio::test]
    async fn body_without_data_fails_to_reduce() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"message":"no data"}"#))
            .mount(&server)
            .await;

        let payload = client_for(&server)
            .fetch_order_book("BBCA", "tok")
            .await
            .expect("well formed json should decode");

        assert!(matches!(
            reduce(payload),
            Err(FetchError::MalformedPayload(_))
        ));
    }
}
