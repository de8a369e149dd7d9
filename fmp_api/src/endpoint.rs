//! Query-string constructors for every FMP resource the pipeline reads.
//!
//! Each variant only knows how to render its own path and parameters; the
//! [`Client`](crate::Client) prepends the base URI and appends the API key.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Default number of records requested from the historical market-cap endpoint.
pub const DEFAULT_MARKET_CAP_LIMIT: u32 = 2000;

/// Stock indices whose constituent lists are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockIndex {
    Sp500,
    Nasdaq,
    DowJones,
}

impl StockIndex {
    /// All tracked indices, in load order.
    pub const ALL: [StockIndex; 3] = [StockIndex::Sp500, StockIndex::Nasdaq, StockIndex::DowJones];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sp500 => "sp500",
            Self::Nasdaq => "nasdaq",
            Self::DowJones => "dowjones",
        }
    }

    fn constituent_path(&self) -> &'static str {
        match self {
            Self::Sp500 => "sp500_constituent?",
            Self::Nasdaq => "nasdaq_constituent?",
            Self::DowJones => "dowjones_constituent?",
        }
    }
}

impl fmt::Display for StockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockIndex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sp500" | "s&p500" | "s&p 500" => Ok(Self::Sp500),
            "nasdaq" => Ok(Self::Nasdaq),
            "dowjones" | "dow" | "djia" => Ok(Self::DowJones),
            other => Err(format!(
                "unknown index '{}'. Valid options: sp500, nasdaq, dowjones",
                other
            )),
        }
    }
}

/// One upstream resource, with whatever parameters it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Constituents of a stock index (JSON array).
    IndexConstituents(StockIndex),
    /// Every listed security known to the API (JSON array).
    StockList,
    /// Latest quote for a single symbol (JSON array of one).
    Quote(String),
    /// Daily OHLCV series for a symbol between two dates (JSON object with `historical`).
    HistoricalPrices {
        symbol: String,
        from: NaiveDate,
        to: NaiveDate,
    },
    /// Daily market-cap series for a symbol, newest first (JSON array).
    HistoricalMarketCap { symbol: String, limit: u32 },
}

impl Endpoint {
    /// Historical market caps with the default record limit.
    pub fn historical_market_cap(symbol: impl Into<String>) -> Self {
        Self::HistoricalMarketCap {
            symbol: symbol.into(),
            limit: DEFAULT_MARKET_CAP_LIMIT,
        }
    }

    /// Renders the path and parameters. The result always ends in `?` or `&`
    /// so the API key parameter can be appended directly.
    pub fn query_string(&self) -> String {
        match self {
            Self::IndexConstituents(index) => index.constituent_path().to_string(),
            Self::StockList => "stock/list?".to_string(),
            Self::Quote(symbol) => format!("quote/{}?", symbol),
            Self::HistoricalPrices { symbol, from, to } => format!(
                "historical-price-full/{}?from={}&to={}&",
                symbol,
                from.format("%Y-%m-%d"),
                to.format("%Y-%m-%d")
            ),
            Self::HistoricalMarketCap { symbol, limit } => {
                format!("historical-market-capitalization/{}?limit={}&", symbol, limit)
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let query = self.query_string();
        let path = query.split('?').next().unwrap_or(&query);
        f.write_str(path)
    }
}
