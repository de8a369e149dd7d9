//! Typed views of FMP response records.
//!
//! Only `symbol` (and the date or timestamp of price records) is required;
//! FMP routinely returns `null` or omits the rest, so everything else is
//! optional. Volume-like counts sometimes arrive as JSON floats and are
//! accepted as integers.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// One row of `sp500_constituent` / `nasdaq_constituent` / `dowjones_constituent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConstituent {
    pub symbol: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub sub_sector: Option<String>,
    pub head_quarter: Option<String>,
    pub date_first_added: Option<String>,
    pub cik: Option<String>,
    pub founded: Option<String>,
}

/// One row of `stock/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockListEntry {
    pub symbol: String,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub exchange: Option<String>,
    pub exchange_short_name: Option<String>,
    #[serde(rename = "type")]
    pub security_type: Option<String>,
}

/// One element of the `quote/{symbol}` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub changes_percentage: Option<f64>,
    pub change: Option<f64>,
    pub day_low: Option<f64>,
    pub day_high: Option<f64>,
    pub year_high: Option<f64>,
    pub year_low: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub market_cap: Option<i64>,
    pub price_avg50: Option<f64>,
    pub price_avg200: Option<f64>,
    pub exchange: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub volume: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub avg_volume: Option<i64>,
    pub open: Option<f64>,
    pub previous_close: Option<f64>,
    pub eps: Option<f64>,
    pub pe: Option<f64>,
    pub earnings_announcement: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub shares_outstanding: Option<i64>,
    /// Unix seconds of the quote.
    pub timestamp: i64,
}

/// Response of `historical-price-full/{symbol}`.
///
/// An unknown symbol comes back as `{}`, which parses as an empty series.
/// Use `HistoricalPriceSeries<serde_json::Value>` to keep the elements raw
/// and convert them one by one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPriceSeries<T = HistoricalPrice> {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default = "Vec::new")]
    pub historical: Vec<T>,
}

/// One day of a historical price series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalPrice {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub volume: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub unadjusted_volume: Option<i64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub vwap: Option<f64>,
    pub label: Option<String>,
    pub change_over_time: Option<f64>,
}

/// One element of `historical-market-capitalization/{symbol}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCapPoint {
    #[serde(default)]
    pub symbol: Option<String>,
    pub date: NaiveDate,
    pub market_cap: Option<f64>,
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let number: Option<serde_json::Number> = Option::deserialize(deserializer)?;
    Ok(number.and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))))
}
