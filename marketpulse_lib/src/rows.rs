//! Persistable rows and their conversion from raw API records.
//!
//! Raw records arrive as `serde_json::Value` objects, one per element of the
//! response array. Each converter either yields a typed row or a
//! [`RecordError`]; a bad record never affects its neighbours.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use fmp_api::types::{HistoricalPrice, IndexConstituent, Quote, StockListEntry};
use fmp_api::StockIndex;
use serde::Serialize;
use serde_json::Value;

/// Why a single record could not become a row.
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record has no {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),
}

/// A constituent of one of the tracked indices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexConstituentRow {
    /// Selects the destination table.
    #[serde(skip)]
    pub index: StockIndex,
    pub symbol: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub sub_sector: Option<String>,
    pub head_quarter: Option<String>,
    pub date_first_added: Option<String>,
    pub cik: Option<String>,
    pub founded: Option<String>,
}

impl IndexConstituentRow {
    pub fn from_record(index: StockIndex, record: Value) -> Result<Self, RecordError> {
        let c: IndexConstituent = parse_record(record)?;
        Ok(Self {
            index,
            symbol: c.symbol,
            name: c.name,
            sector: c.sector,
            sub_sector: c.sub_sector,
            head_quarter: c.head_quarter,
            date_first_added: c.date_first_added,
            cik: c.cik,
            founded: c.founded,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalStockRow {
    pub symbol: String,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub exchange: Option<String>,
    pub exchange_short_name: Option<String>,
    pub security_type: Option<String>,
}

impl GlobalStockRow {
    pub fn from_record(record: Value) -> Result<Self, RecordError> {
        let e: StockListEntry = parse_record(record)?;
        Ok(Self {
            symbol: e.symbol,
            name: e.name,
            price: e.price,
            exchange: e.exchange,
            exchange_short_name: e.exchange_short_name,
            security_type: e.security_type,
        })
    }
}

/// One daily quote, keyed by symbol and the quote's own timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPriceRow {
    pub symbol: String,
    pub date_time: NaiveDateTime,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub changes_percentage: Option<f64>,
    pub change: Option<f64>,
    pub day_low: Option<f64>,
    pub day_high: Option<f64>,
    pub year_high: Option<f64>,
    pub year_low: Option<f64>,
    pub market_cap: Option<i64>,
    pub price_avg50: Option<f64>,
    pub price_avg200: Option<f64>,
    pub exchange: Option<String>,
    pub volume: Option<i64>,
    pub avg_volume: Option<i64>,
    pub open: Option<f64>,
    pub previous_close: Option<f64>,
    pub eps: Option<f64>,
    pub pe: Option<f64>,
    pub earnings_announcement: Option<String>,
    pub shares_outstanding: Option<i64>,
}

impl DailyPriceRow {
    pub fn from_record(record: Value) -> Result<Self, RecordError> {
        let q: Quote = parse_record(record)?;
        let date_time = DateTime::from_timestamp(q.timestamp, 0)
            .ok_or_else(|| RecordError::InvalidValue {
                field: "timestamp",
                reason: format!("{} is out of range", q.timestamp),
            })?
            .naive_utc();
        Ok(Self {
            symbol: q.symbol,
            date_time,
            name: q.name,
            price: q.price,
            changes_percentage: q.changes_percentage,
            change: q.change,
            day_low: q.day_low,
            day_high: q.day_high,
            year_high: q.year_high,
            year_low: q.year_low,
            market_cap: q.market_cap,
            price_avg50: q.price_avg50,
            price_avg200: q.price_avg200,
            exchange: q.exchange,
            volume: q.volume,
            avg_volume: q.avg_volume,
            open: q.open,
            previous_close: q.previous_close,
            eps: q.eps,
            pe: q.pe,
            earnings_announcement: q.earnings_announcement,
            shares_outstanding: q.shares_outstanding,
        })
    }
}

/// One day of a symbol's price history with the market cap joined in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalPriceRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<i64>,
    pub unadjusted_volume: Option<i64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub vwap: Option<f64>,
    pub label: Option<String>,
    pub change_over_time: Option<f64>,
    /// `None` when the market-cap series has no entry for this date.
    pub market_cap: Option<f64>,
}

impl HistoricalPriceRow {
    /// Convert one element of a `historical` array. The element carries no
    /// symbol of its own; `market_cap` is asked for the cap on its date.
    pub fn from_record(
        symbol: &str,
        record: Value,
        market_cap: impl FnOnce(NaiveDate) -> Option<f64>,
    ) -> Result<Self, RecordError> {
        if !record.is_object() {
            return Err(RecordError::NotAnObject);
        }
        let price: HistoricalPrice = serde_json::from_value(record)?;
        let cap = market_cap(price.date);
        Ok(Self::from_price(symbol, &price, cap))
    }

    fn from_price(symbol: &str, price: &HistoricalPrice, market_cap: Option<f64>) -> Self {
        Self {
            symbol: symbol.to_string(),
            date: price.date,
            open: price.open,
            high: price.high,
            low: price.low,
            close: price.close,
            adj_close: price.adj_close,
            volume: price.volume,
            unadjusted_volume: price.unadjusted_volume,
            change: price.change,
            change_percent: price.change_percent,
            vwap: price.vwap,
            label: price.label.clone(),
            change_over_time: price.change_over_time,
            market_cap,
        }
    }
}

fn parse_record<T: serde::de::DeserializeOwned>(record: Value) -> Result<T, RecordError> {
    let object = record.as_object().ok_or(RecordError::NotAnObject)?;
    if object.get("symbol").map_or(true, Value::is_null) {
        return Err(RecordError::MissingField("symbol"));
    }
    Ok(serde_json::from_value(record)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constituent_keeps_index_and_nullable_fields() {
        let row = IndexConstituentRow::from_record(
            StockIndex::Nasdaq,
            json!({"symbol": "MSFT", "name": "Microsoft", "sector": null}),
        )
        .unwrap();
        assert_eq!(row.index, StockIndex::Nasdaq);
        assert_eq!(row.symbol, "MSFT");
        assert_eq!(row.sector, None);
        assert_eq!(row.founded, None);
    }

    #[test]
    fn missing_symbol_is_rejected() {
        let err = GlobalStockRow::from_record(json!({"name": "No Symbol"})).unwrap_err();
        assert!(matches!(err, RecordError::MissingField("symbol")));

        let err = GlobalStockRow::from_record(json!({"symbol": null})).unwrap_err();
        assert!(matches!(err, RecordError::MissingField("symbol")));
    }

    #[test]
    fn non_object_record_is_rejected() {
        let err = GlobalStockRow::from_record(json!("AAPL")).unwrap_err();
        assert!(matches!(err, RecordError::NotAnObject));
    }

    #[test]
    fn wrong_field_type_is_json_error() {
        let err = GlobalStockRow::from_record(json!({"symbol": "SPY", "price": "cheap"})).unwrap_err();
        assert!(matches!(err, RecordError::Json(_)));
    }

    #[test]
    fn daily_row_keyed_by_quote_timestamp() {
        let row = DailyPriceRow::from_record(json!({
            "symbol": "AAPL",
            "price": 192.25,
            "marketCap": 2947931000000i64,
            "timestamp": 1717185601
        }))
        .unwrap();
        assert_eq!(row.date_time.to_string(), "2024-05-31 20:00:01");
        assert_eq!(row.market_cap, Some(2_947_931_000_000));
    }

    #[test]
    fn daily_row_requires_timestamp() {
        let err = DailyPriceRow::from_record(json!({"symbol": "AAPL", "price": 1.0})).unwrap_err();
        assert!(matches!(err, RecordError::Json(_)));
    }

    #[test]
    fn historical_record_takes_symbol_and_cap_from_caller() {
        let row = HistoricalPriceRow::from_record(
            "AAPL",
            json!({"date": "2024-01-02", "close": 185.64, "volume": 82488700.0}),
            |date| (date.to_string() == "2024-01-02").then_some(2.87e12),
        )
        .unwrap();
        assert_eq!(row.symbol, "AAPL");
        assert_eq!(row.volume, Some(82_488_700));
        assert_eq!(row.market_cap, Some(2.87e12));
    }

    #[test]
    fn historical_record_with_bad_field_is_malformed() {
        let err = HistoricalPriceRow::from_record("AAPL", json!({"date": "2024-01-02", "close": "n/a"}), |_| None)
            .unwrap_err();
        assert!(matches!(err, RecordError::Json(_)));

        let err = HistoricalPriceRow::from_record("AAPL", json!({"close": 1.0}), |_| None).unwrap_err();
        assert!(matches!(err, RecordError::Json(_)));

        let err = HistoricalPriceRow::from_record("AAPL", json!([1, 2]), |_| None).unwrap_err();
        assert!(matches!(err, RecordError::NotAnObject));
    }

    #[test]
    fn out_of_range_timestamp_is_invalid() {
        let err = DailyPriceRow::from_record(json!({"symbol": "AAPL", "timestamp": i64::MAX}))
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidValue { field: "timestamp", .. }));
    }
}
