//! SQLite storage for MarketPulse data.
//!
//! Writes are upserts only. [`Db::load`] gives every row its own
//! transaction, so a row that violates a constraint is rolled back and
//! counted without disturbing the rest of the batch.

use std::path::Path;

use fmp_api::StockIndex;
use rusqlite::{params, Connection, ErrorCode, Transaction};
use serde::Serialize;

use crate::rows::{
    DailyPriceRow, GlobalStockRow, HistoricalPriceRow, IndexConstituentRow, RecordError,
};

const SCHEMA_VERSION: i32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl DbError {
    /// True for UNIQUE / CHECK / NOT NULL / foreign key failures.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

/// Outcome counts for one [`Db::load`] batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Records handed to the loader.
    pub attempted: usize,
    /// Rows committed.
    pub loaded: usize,
    /// Rows the database refused; each was rolled back on its own.
    pub rejected: usize,
    /// Records that could not be converted into a row.
    pub malformed: usize,
}

impl LoadReport {
    pub fn merge(&mut self, other: LoadReport) {
        self.attempted += other.attempted;
        self.loaded += other.loaded;
        self.rejected += other.rejected;
        self.malformed += other.malformed;
    }
}

/// A row that knows how to upsert itself inside a transaction.
pub trait Upsert {
    /// Short label for log lines, usually the row's key.
    fn key(&self) -> String;

    fn upsert(&self, tx: &Transaction<'_>) -> Result<(), rusqlite::Error>;
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Create tables and indexes if missing. Safe to call on every start.
    pub fn init(&self) -> Result<(), DbError> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        let schema = include_str!("../../schema/sqlite.sql");
        self.conn.execute_batch(schema)?;

        if version < SCHEMA_VERSION {
            self.conn
                .pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(())
    }

    /// Convert and upsert each record in its own transaction.
    ///
    /// Never fails as a whole: conversion failures count as `malformed`,
    /// database failures as `rejected`, and the loop continues either way.
    pub fn load<T, R, F>(&mut self, records: impl IntoIterator<Item = T>, mut convert: F) -> LoadReport
    where
        F: FnMut(T) -> Result<R, RecordError>,
        R: Upsert,
    {
        let mut report = LoadReport::default();
        for record in records {
            report.attempted += 1;
            let row = match convert(record) {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!("Skipping malformed record: {}", e);
                    report.malformed += 1;
                    continue;
                }
            };
            match self.upsert_one(&row) {
                Ok(()) => report.loaded += 1,
                Err(e) if e.is_constraint_violation() => {
                    tracing::warn!("Constraint violation for {}, row rolled back: {}", row.key(), e);
                    report.rejected += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to upsert {}: {}", row.key(), e);
                    report.rejected += 1;
                }
            }
        }
        report
    }

    fn upsert_one<R: Upsert>(&mut self, row: &R) -> Result<(), DbError> {
        // Dropping an uncommitted transaction rolls it back.
        let tx = self.conn.transaction()?;
        row.upsert(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Symbols of an index, sorted.
    pub fn index_symbols(&self, index: StockIndex) -> Result<Vec<String>, DbError> {
        let sql = format!("SELECT symbol FROM {} ORDER BY symbol", index.as_str());
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row?);
        }
        Ok(symbols)
    }

    /// Row count of any table this crate owns.
    pub fn count(&self, table: Table) -> Result<i64, DbError> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }
}

/// Tables managed by [`Db`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Index(StockIndex),
    GlobalStocks,
    DailyPrices,
    HistoricalPrices,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Index(index) => index.as_str(),
            Self::GlobalStocks => "globalstocks",
            Self::DailyPrices => "daily_prices",
            Self::HistoricalPrices => "historical_prices",
        }
    }
}

impl Upsert for IndexConstituentRow {
    fn key(&self) -> String {
        format!("{}/{}", self.index, self.symbol)
    }

    fn upsert(&self, tx: &Transaction<'_>) -> Result<(), rusqlite::Error> {
        let sql = format!(
            "INSERT INTO {} (
               symbol, name, sector, sub_sector, head_quarter, date_first_added, cik, founded
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(symbol) DO UPDATE SET
               name = excluded.name,
               sector = excluded.sector,
               sub_sector = excluded.sub_sector,
               head_quarter = excluded.head_quarter,
               date_first_added = excluded.date_first_added,
               cik = excluded.cik,
               founded = excluded.founded",
            self.index.as_str()
        );
        tx.execute(
            &sql,
            params![
                self.symbol,
                self.name,
                self.sector,
                self.sub_sector,
                self.head_quarter,
                self.date_first_added,
                self.cik,
                self.founded
            ],
        )?;
        Ok(())
    }
}

impl Upsert for GlobalStockRow {
    fn key(&self) -> String {
        self.symbol.clone()
    }

    fn upsert(&self, tx: &Transaction<'_>) -> Result<(), rusqlite::Error> {
        tx.execute(
            "INSERT INTO globalstocks (
               symbol, name, price, exchange, exchange_short_name, security_type
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(symbol) DO UPDATE SET
               name = excluded.name,
               price = excluded.price,
               exchange = excluded.exchange,
               exchange_short_name = excluded.exchange_short_name,
               security_type = excluded.security_type",
            params![
                self.symbol,
                self.name,
                self.price,
                self.exchange,
                self.exchange_short_name,
                self.security_type
            ],
        )?;
        Ok(())
    }
}

impl Upsert for DailyPriceRow {
    fn key(&self) -> String {
        format!("{}@{}", self.symbol, self.date_time)
    }

    fn upsert(&self, tx: &Transaction<'_>) -> Result<(), rusqlite::Error> {
        tx.execute(
            "INSERT INTO daily_prices (
               symbol, date_time, name, price, changes_percentage, change, day_low, day_high,
               year_high, year_low, market_cap, price_avg50, price_avg200, exchange, volume,
               avg_volume, open, previous_close, eps, pe, earnings_announcement, shares_outstanding
             ) VALUES (
               ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
               ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22
             )
             ON CONFLICT(symbol, date_time) DO UPDATE SET
               name = excluded.name,
               price = excluded.price,
               changes_percentage = excluded.changes_percentage,
               change = excluded.change,
               day_low = excluded.day_low,
               day_high = excluded.day_high,
               year_high = excluded.year_high,
               year_low = excluded.year_low,
               market_cap = excluded.market_cap,
               price_avg50 = excluded.price_avg50,
               price_avg200 = excluded.price_avg200,
               exchange = excluded.exchange,
               volume = excluded.volume,
               avg_volume = excluded.avg_volume,
               open = excluded.open,
               previous_close = excluded.previous_close,
               eps = excluded.eps,
               pe = excluded.pe,
               earnings_announcement = excluded.earnings_announcement,
               shares_outstanding = excluded.shares_outstanding",
            params![
                self.symbol,
                self.date_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                self.name,
                self.price,
                self.changes_percentage,
                self.change,
                self.day_low,
                self.day_high,
                self.year_high,
                self.year_low,
                self.market_cap,
                self.price_avg50,
                self.price_avg200,
                self.exchange,
                self.volume,
                self.avg_volume,
                self.open,
                self.previous_close,
                self.eps,
                self.pe,
                self.earnings_announcement,
                self.shares_outstanding
            ],
        )?;
        Ok(())
    }
}

impl Upsert for HistoricalPriceRow {
    fn key(&self) -> String {
        format!("{}@{}", self.symbol, self.date)
    }

    fn upsert(&self, tx: &Transaction<'_>) -> Result<(), rusqlite::Error> {
        tx.execute(
            "INSERT INTO historical_prices (
               symbol, date_time, open, high, low, close, adj_close, volume, unadjusted_volume,
               change, change_percent, vwap, label, change_over_time, market_cap
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(symbol, date_time) DO UPDATE SET
               open = excluded.open,
               high = excluded.high,
               low = excluded.low,
               close = excluded.close,
               adj_close = excluded.adj_close,
               volume = excluded.volume,
               unadjusted_volume = excluded.unadjusted_volume,
               change = excluded.change,
               change_percent = excluded.change_percent,
               vwap = excluded.vwap,
               label = excluded.label,
               change_over_time = excluded.change_over_time,
               market_cap = excluded.market_cap",
            params![
                self.symbol,
                self.date.format("%Y-%m-%d").to_string(),
                self.open,
                self.high,
                self.low,
                self.close,
                self.adj_close,
                self.volume,
                self.unadjusted_volume,
                self.change,
                self.change_percent,
                self.vwap,
                self.label,
                self.change_over_time,
                self.market_cap
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn open_test_db() -> Db {
        let db = Db::open_in_memory().expect("open in-memory db");
        db.init().expect("init schema");
        db
    }

    fn get_user_version(db: &Db) -> i32 {
        db.conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("read user_version")
    }

    fn historical(symbol: &str, day: u32, close: f64, cap: Option<f64>) -> HistoricalPriceRow {
        HistoricalPriceRow {
            symbol: symbol.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: None,
            high: None,
            low: None,
            close: Some(close),
            adj_close: None,
            volume: Some(1000),
            unadjusted_volume: None,
            change: None,
            change_percent: None,
            vwap: None,
            label: None,
            change_over_time: None,
            market_cap: cap,
        }
    }

    fn identity<R>(row: R) -> Result<R, RecordError> {
        Ok(row)
    }

    #[test]
    fn init_is_idempotent_and_versioned() {
        let db = open_test_db();
        db.init().expect("second init");
        assert_eq!(get_user_version(&db), SCHEMA_VERSION);
        for table in [
            Table::Index(StockIndex::Sp500),
            Table::Index(StockIndex::Nasdaq),
            Table::Index(StockIndex::DowJones),
            Table::GlobalStocks,
            Table::DailyPrices,
            Table::HistoricalPrices,
        ] {
            assert_eq!(db.count(table).unwrap(), 0, "{}", table.name());
        }
    }

    #[test]
    fn same_key_twice_keeps_one_row_with_latest_payload() {
        let mut db = open_test_db();
        let report = db.load(
            vec![historical("AAPL", 2, 185.0, None), historical("AAPL", 2, 186.5, Some(2.9e12))],
            identity,
        );
        assert_eq!(report.loaded, 2);
        assert_eq!(db.count(Table::HistoricalPrices).unwrap(), 1);

        let (close, cap): (f64, Option<f64>) = db
            .conn
            .query_row(
                "SELECT close, market_cap FROM historical_prices WHERE symbol = 'AAPL' AND date_time = '2024-01-02'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(close, 186.5);
        assert_eq!(cap, Some(2.9e12));
    }

    #[test]
    fn constraint_violation_does_not_stop_later_rows() {
        let mut db = open_test_db();
        let rows = vec![
            historical("AAPL", 2, 1.0, None),
            historical("", 2, 2.0, None),
            historical("MSFT", 2, 3.0, None),
            historical("GOOG", 2, 4.0, None),
        ];
        let report = db.load(rows, identity);

        assert_eq!(
            report,
            LoadReport {
                attempted: 4,
                loaded: 3,
                rejected: 1,
                malformed: 0
            }
        );
        assert_eq!(db.count(Table::HistoricalPrices).unwrap(), 3);
    }

    #[test]
    fn malformed_records_are_counted_and_skipped() {
        let mut db = open_test_db();
        let records = vec![
            json!({"symbol": "SPY", "name": "SPDR S&P 500", "price": 510.2, "type": "etf"}),
            json!({"name": "no symbol"}),
            json!({"symbol": "QQQ", "price": "not a number"}),
            json!({"symbol": "IWM", "type": "etf"}),
        ];
        let report = db.load(records, GlobalStockRow::from_record);

        assert_eq!(report.attempted, 4);
        assert_eq!(report.loaded, 2);
        assert_eq!(report.malformed, 2);
        assert_eq!(db.count(Table::GlobalStocks).unwrap(), 2);
    }

    #[test]
    fn duplicate_index_symbol_keeps_second_row() {
        let mut db = open_test_db();
        let records = vec![
            json!({"symbol": "XYZ", "name": "Xyz Corp", "sector": "Energy"}),
            json!({"symbol": "XYZ", "name": "Xyz Holdings", "sector": "Utilities"}),
        ];
        let report = db.load(records, |r| IndexConstituentRow::from_record(StockIndex::Sp500, r));
        assert_eq!(report.loaded, 2);

        assert_eq!(db.index_symbols(StockIndex::Sp500).unwrap(), vec!["XYZ"]);
        let (name, sector): (String, String) = db
            .conn
            .query_row("SELECT name, sector FROM sp500 WHERE symbol = 'XYZ'", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(name, "Xyz Holdings");
        assert_eq!(sector, "Utilities");
    }

    #[test]
    fn constituents_land_in_their_own_index_table() {
        let mut db = open_test_db();
        db.load(vec![json!({"symbol": "AAPL"})], |r| {
            IndexConstituentRow::from_record(StockIndex::DowJones, r)
        });
        db.load(vec![json!({"symbol": "MSFT"}), json!({"symbol": "AAPL"})], |r| {
            IndexConstituentRow::from_record(StockIndex::Nasdaq, r)
        });

        assert_eq!(db.index_symbols(StockIndex::DowJones).unwrap(), vec!["AAPL"]);
        assert_eq!(db.index_symbols(StockIndex::Nasdaq).unwrap(), vec!["AAPL", "MSFT"]);
        assert!(db.index_symbols(StockIndex::Sp500).unwrap().is_empty());
    }

    #[test]
    fn daily_quotes_keyed_by_timestamp() {
        let mut db = open_test_db();
        let records = vec![
            json!({"symbol": "AAPL", "price": 190.0, "timestamp": 1717185601}),
            json!({"symbol": "AAPL", "price": 191.0, "timestamp": 1717185601}),
            json!({"symbol": "AAPL", "price": 192.0, "timestamp": 1717272001}),
        ];
        let report = db.load(records, DailyPriceRow::from_record);
        assert_eq!(report.loaded, 3);
        assert_eq!(db.count(Table::DailyPrices).unwrap(), 2);

        let price: f64 = db
            .conn
            .query_row(
                "SELECT price FROM daily_prices WHERE date_time = '2024-05-31 20:00:01'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(price, 191.0);
    }

    #[test]
    fn merge_reports() {
        let mut total = LoadReport::default();
        total.merge(LoadReport {
            attempted: 3,
            loaded: 2,
            rejected: 1,
            malformed: 0,
        });
        total.merge(LoadReport {
            attempted: 1,
            loaded: 0,
            rejected: 0,
            malformed: 1,
        });
        assert_eq!(total.attempted, 4);
        assert_eq!(total.loaded, 2);
        assert_eq!(total.rejected, 1);
        assert_eq!(total.malformed, 1);
    }
}
