//! Read-only sector and market-cap queries over the S&P 500 tables.
//!
//! Missing data never errors: unknown sectors sum to zero and dates without
//! history come back as `None`.

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use rusqlite::params;
use serde::Serialize;

use crate::db::{Db, DbError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectorSubsector {
    pub sector: Option<String>,
    #[serde(rename = "subSector")]
    pub sub_sector: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectorMarketCap {
    pub sector: String,
    pub total_marketcap: i64,
}

/// Dates compared by [`periodic_market_caps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodDates {
    pub current: NaiveDate,
    pub previous_day: NaiveDate,
    pub one_week: NaiveDate,
    pub one_month: NaiveDate,
    pub three_months: NaiveDate,
    pub six_months: NaiveDate,
    pub one_year: NaiveDate,
}

impl PeriodDates {
    /// The reference day is yesterday. Every look-back date lands on the
    /// previous working day when it falls on a weekend.
    pub fn from_today(today: NaiveDate) -> Self {
        let current = today - Days::new(1);
        let months_back = |n: u32| {
            previous_working_date(current.checked_sub_months(Months::new(n)).unwrap_or(current))
        };
        Self {
            current,
            previous_day: previous_working_date(current - Days::new(1)),
            one_week: previous_working_date(current - Days::new(7)),
            one_month: months_back(1),
            three_months: months_back(3),
            six_months: months_back(6),
            one_year: months_back(12),
        }
    }
}

/// Historical market-cap totals for one sector. `None` means no rows on that date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodicMarketCap {
    pub sector: String,
    pub current_marketcap: Option<f64>,
    pub previous_marketcap: Option<f64>,
    pub oneweek_back: Option<f64>,
    pub onemonth_back: Option<f64>,
    pub threemonths_back: Option<f64>,
    pub sixmonths_back: Option<f64>,
    pub oneyear_back: Option<f64>,
}

/// Saturday and Sunday move back to Friday; weekdays are returned as is.
pub fn previous_working_date(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Days::new(1),
        Weekday::Sun => date - Days::new(2),
        _ => date,
    }
}

/// `$` followed by the whole-dollar amount with thousands separators.
pub fn format_usd(amount: i128) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

/// Distinct S&P 500 sectors, sorted.
pub fn sectors(db: &Db) -> Result<Vec<String>, DbError> {
    let mut stmt = db.conn().prepare(
        "SELECT DISTINCT sector FROM sp500 WHERE sector IS NOT NULL ORDER BY sector",
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Distinct (sector, sub-sector) pairs, optionally limited to one sector.
pub fn sectors_subsectors(db: &Db, sector: Option<&str>) -> Result<Vec<SectorSubsector>, DbError> {
    let mut stmt = db.conn().prepare(
        "SELECT DISTINCT sector, sub_sector FROM sp500
         WHERE (?1 IS NULL OR sector = ?1)
         ORDER BY sector, sub_sector",
    )?;
    let rows = stmt.query_map(params![sector], |row| {
        Ok(SectorSubsector {
            sector: row.get(0)?,
            sub_sector: row.get(1)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Sum of each sector member's latest daily-quote market cap.
pub fn sector_market_cap(db: &Db, sector: &str) -> Result<i64, DbError> {
    let total: i64 = db.conn().query_row(
        "SELECT COALESCE(SUM(d.market_cap), 0)
         FROM sp500 s
         JOIN daily_prices d ON d.symbol = s.symbol
         WHERE s.sector = ?1
           AND d.date_time = (SELECT MAX(d2.date_time) FROM daily_prices d2 WHERE d2.symbol = s.symbol)",
        params![sector],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// [`sector_market_cap`] for every sector, sorted by sector name.
pub fn all_sector_market_caps(db: &Db) -> Result<Vec<SectorMarketCap>, DbError> {
    let mut stmt = db.conn().prepare(
        "SELECT s.sector, COALESCE(SUM(d.market_cap), 0)
         FROM sp500 s
         LEFT JOIN daily_prices d ON d.symbol = s.symbol
           AND d.date_time = (SELECT MAX(d2.date_time) FROM daily_prices d2 WHERE d2.symbol = s.symbol)
         WHERE s.sector IS NOT NULL
         GROUP BY s.sector
         ORDER BY s.sector",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(SectorMarketCap {
            sector: row.get(0)?,
            total_marketcap: row.get(1)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Per-sector historical market-cap totals on the [`PeriodDates`] derived from `today`.
pub fn periodic_market_caps(db: &Db, today: NaiveDate) -> Result<Vec<PeriodicMarketCap>, DbError> {
    let dates = PeriodDates::from_today(today);
    let mut stmt = db.conn().prepare(
        "SELECT SUM(h.market_cap)
         FROM historical_prices h
         JOIN sp500 s ON s.symbol = h.symbol
         WHERE s.sector = ?1 AND h.date_time = ?2",
    )?;

    let mut out = Vec::new();
    for sector in sectors(db)? {
        let mut total_on = |date: NaiveDate| -> Result<Option<f64>, DbError> {
            let day = date.format("%Y-%m-%d").to_string();
            Ok(stmt.query_row(params![sector, day], |row| row.get(0))?)
        };
        let current_marketcap = total_on(dates.current)?;
        let previous_marketcap = total_on(dates.previous_day)?;
        let oneweek_back = total_on(dates.one_week)?;
        let onemonth_back = total_on(dates.one_month)?;
        let threemonths_back = total_on(dates.three_months)?;
        let sixmonths_back = total_on(dates.six_months)?;
        let oneyear_back = total_on(dates.one_year)?;
        out.push(PeriodicMarketCap {
            sector,
            current_marketcap,
            previous_marketcap,
            oneweek_back,
            onemonth_back,
            threemonths_back,
            sixmonths_back,
            oneyear_back,
        });
    }
    Ok(out)
}
