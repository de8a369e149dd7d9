//! Join a symbol's price history with its market-cap history by date.

use std::collections::HashMap;

use chrono::NaiveDate;
use fmp_api::types::MarketCapPoint;
use serde_json::Value;

use crate::rows::{HistoricalPriceRow, RecordError};

/// One result per price element, in price order.
///
/// The market cap is taken from the cap entry with the same date, or left
/// `None` when there is none. A price element that cannot be converted
/// yields an `Err` in its slot and its neighbours are unaffected. Cap
/// elements that cannot be parsed are skipped. When the cap series repeats
/// a date, the later entry wins.
pub fn join(
    symbol: &str,
    prices: Vec<Value>,
    caps: Vec<Value>,
) -> Vec<Result<HistoricalPriceRow, RecordError>> {
    let mut cap_by_date: HashMap<NaiveDate, Option<f64>> = HashMap::with_capacity(caps.len());
    for record in caps {
        match serde_json::from_value::<MarketCapPoint>(record) {
            Ok(point) => {
                cap_by_date.insert(point.date, point.market_cap);
            }
            Err(e) => tracing::warn!("{}: skipping malformed market cap entry: {}", symbol, e),
        }
    }

    prices
        .into_iter()
        .map(|record| {
            HistoricalPriceRow::from_record(symbol, record, |date| {
                cap_by_date.get(&date).copied().flatten()
            })
        })
        .collect()
}
