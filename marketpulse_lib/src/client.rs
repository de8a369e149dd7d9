//! Rate-limited wrapper around the FMP API client.

use std::sync::Arc;

use chrono::NaiveDate;
use fmp_api::types::HistoricalPriceSeries;
use fmp_api::{Client, Endpoint, Error, StockIndex};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::Settings;
use crate::rate_limiter::RateLimiter;

/// API client that waits on the shared [`RateLimiter`] before every request.
///
/// Cloning is cheap and every clone draws from the same call budget, so
/// concurrent workers each get their own handle.
#[derive(Clone)]
pub struct ThrottledClient {
    inner: Client,
    limiter: Arc<RateLimiter>,
}

impl ThrottledClient {
    pub fn new(inner: Client, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }

    /// Build a client and a fresh limiter from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, Error> {
        let inner = Client::with_base_url(&settings.fmp_api.uri, settings.fmp_api.key.clone())?;
        let limiter = RateLimiter::new(
            settings.rate_limit.calls_per_window,
            settings.rate_limit.window(),
        );
        Ok(Self::new(inner, Arc::new(limiter)))
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// One throttled round trip. The outcome is recorded on the tracker.
    pub async fn fetch(&self, endpoint: &Endpoint) -> Result<Value, Error> {
        self.limiter.acquire().await;
        let result = self.inner.fetch(endpoint).await;
        match &result {
            Ok(_) => self.limiter.tracker().record_success(),
            Err(_) => self.limiter.tracker().record_failure(),
        }
        result
    }

    pub async fn fetch_as<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T, Error> {
        let value = self.fetch(endpoint).await?;
        serde_json::from_value(value).map_err(|e| Error::Parse {
            source: e,
            body: String::new(),
        })
    }

    /// Fetch an endpoint that answers with a JSON array and return its
    /// elements untouched, so each one can be converted on its own.
    pub async fn fetch_records(&self, endpoint: &Endpoint) -> Result<Vec<Value>, Error> {
        self.fetch_as::<Vec<Value>>(endpoint).await
    }

    pub async fn index_constituents(&self, index: StockIndex) -> Result<Vec<Value>, Error> {
        self.fetch_records(&Endpoint::IndexConstituents(index)).await
    }

    pub async fn stock_list(&self) -> Result<Vec<Value>, Error> {
        self.fetch_records(&Endpoint::StockList).await
    }

    pub async fn quote(&self, symbol: &str) -> Result<Vec<Value>, Error> {
        self.fetch_records(&Endpoint::Quote(symbol.to_string())).await
    }

    /// Raw elements of the `historical` array. Unknown symbols (`{}`) give
    /// an empty list.
    pub async fn historical_prices(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Value>, Error> {
        let endpoint = Endpoint::HistoricalPrices {
            symbol: symbol.to_string(),
            from,
            to,
        };
        let series: HistoricalPriceSeries<Value> = self.fetch_as(&endpoint).await?;
        Ok(series.historical)
    }

    pub async fn historical_market_cap(&self, symbol: &str, limit: u32) -> Result<Vec<Value>, Error> {
        let endpoint = Endpoint::HistoricalMarketCap {
            symbol: symbol.to_string(),
            limit,
        };
        self.fetch_records(&endpoint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, budget: u64) -> ThrottledClient {
        let inner = Client::with_base_url(&format!("{}/api/v3/", server.uri()), "k").unwrap();
        ThrottledClient::new(
            inner,
            Arc::new(RateLimiter::new(budget, Duration::from_secs(60))),
        )
    }

    #[tokio::test]
    async fn every_fetch_counts_against_the_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/stock/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"symbol": "SPY"},
                {"symbol": "QQQ"}
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server, 10);
        let records = client.stock_list().await.unwrap();
        assert_eq!(records.len(), 2);
        let _ = client.clone().stock_list().await.unwrap();

        let window = client.limiter().snapshot().unwrap();
        assert_eq!(window.completed_calls, 2);
        let summary = client.limiter().tracker().summary();
        assert_eq!(summary.requests_made, 2);
        assert_eq!(summary.requests_succeeded, 2);
    }

    #[tokio::test]
    async fn failures_are_tracked_and_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/quote/ZZZZ"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = client_for(&server, 10);
        let err = client.quote("ZZZZ").await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 502, .. }));
        assert_eq!(client.limiter().tracker().summary().requests_failed, 1);
    }

    #[tokio::test]
    async fn object_body_is_not_a_record_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/stock/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"a": 1})))
            .mount(&server)
            .await;

        let client = client_for(&server, 10);
        assert!(matches!(client.stock_list().await, Err(Error::Parse { .. })));
    }

    #[tokio::test]
    async fn historical_prices_keep_elements_raw() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/historical-price-full/AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "symbol": "AAPL",
                "historical": [
                    {"date": "2024-01-03", "close": 1.0},
                    {"date": "2024-01-02", "close": "n/a"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/historical-price-full/NONE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = client_for(&server, 10);
        let day = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap();
        let records = client.historical_prices("AAPL", day, day).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["close"], "n/a");
        assert!(client.historical_prices("NONE", day, day).await.unwrap().is_empty());
    }

    #[test]
    fn from_settings_uses_configured_budget() {
        let settings = Settings::from_json_str(
            r#"{ "fmp_api": { "uri": "http://localhost:1/", "key": "k" },
                 "rate_limit": { "calls_per_window": 7, "window_secs": 3 } }"#,
        )
        .unwrap();
        let client = ThrottledClient::from_settings(&settings).unwrap();
        assert_eq!(client.limiter().calls_per_window(), 7);
        assert_eq!(client.limiter().window_duration(), Duration::from_secs(3));
    }
}
