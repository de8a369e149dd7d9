//! Full ingestion job: index companies, global stocks, historical series,
//! daily quotes.
//!
//! Stages always run in that order. A stage that fails is logged and the
//! next one still runs; inside a stage, one failing index or symbol never
//! stops the others. The historical stage fans out over a bounded pool of
//! workers that share the client's rate limiter, while a single receive loop
//! owns the database and writes every row.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use fmp_api::StockIndex;
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::client::ThrottledClient;
use crate::config::Settings;
use crate::db::{Db, LoadReport};
use crate::error::SyncError;
use crate::rate_limiter::TrackerSummary;
use crate::rows::{DailyPriceRow, GlobalStockRow, HistoricalPriceRow, IndexConstituentRow, RecordError};
use crate::series;

/// Sync stages, declared in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IndexCompanies,
    GlobalStocks,
    HistoricalPrices,
    DailyPrices,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::IndexCompanies,
        Stage::GlobalStocks,
        Stage::HistoricalPrices,
        Stage::DailyPrices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IndexCompanies => "index",
            Self::GlobalStocks => "global",
            Self::HistoricalPrices => "historical",
            Self::DailyPrices => "daily",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "index" | "index_companies" => Ok(Self::IndexCompanies),
            "global" | "global_stocks" => Ok(Self::GlobalStocks),
            "historical" | "historical_prices" => Ok(Self::HistoricalPrices),
            "daily" | "daily_prices" => Ok(Self::DailyPrices),
            other => Err(format!(
                "unknown stage '{}'. Valid options: index, global, historical, daily",
                other
            )),
        }
    }
}

/// What one stage did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    /// Units of work that produced data (indices for the index stage,
    /// symbols for the per-symbol stages).
    pub processed: usize,
    /// Symbols with no upstream data.
    pub skipped: usize,
    /// Units whose fetch failed.
    pub failed: usize,
    pub load: LoadReport,
    /// Set when the stage could not run at all.
    pub error: Option<String>,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            processed: 0,
            skipped: 0,
            failed: 0,
            load: LoadReport::default(),
            error: None,
        }
    }
}

/// Result of a whole [`Syncer::run`].
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub stages: Vec<StageReport>,
    pub requests: TrackerSummary,
}

/// Message sent from historical fetch tasks to the writer.
struct HistoryFetch {
    symbol: String,
    /// `Ok(None)` when either series came back empty.
    result: Result<Option<Vec<Result<HistoricalPriceRow, RecordError>>>, fmp_api::Error>,
}

/// Drives the ingestion stages against one client and one database.
pub struct Syncer {
    client: ThrottledClient,
    settings: Arc<Settings>,
    today: NaiveDate,
}

impl Syncer {
    pub fn new(client: ThrottledClient, settings: Arc<Settings>) -> Self {
        Self {
            client,
            settings,
            today: chrono::Local::now().date_naive(),
        }
    }

    /// Build the client and its rate limiter from settings.
    pub fn from_settings(settings: Arc<Settings>) -> Result<Self, fmp_api::Error> {
        let client = ThrottledClient::from_settings(&settings)?;
        Ok(Self::new(client, settings))
    }

    /// Override the upper bound of historical price requests.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn client(&self) -> &ThrottledClient {
        &self.client
    }

    /// Run the requested stages in canonical order, each at most once.
    pub async fn run(&self, db: &mut Db, stages: &[Stage]) -> SyncSummary {
        let mut ordered = stages.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut reports = Vec::with_capacity(ordered.len());
        for stage in ordered {
            reports.push(self.run_stage(db, stage).await);
        }

        let requests = self.client.limiter().tracker().summary();
        tracing::info!(
            "Sync finished: {} requests ({} failed), {} throttle sleeps totalling {:.1}s",
            requests.requests_made,
            requests.requests_failed,
            requests.throttle_sleeps,
            requests.total_throttle_secs
        );
        SyncSummary {
            stages: reports,
            requests,
        }
    }

    pub async fn run_stage(&self, db: &mut Db, stage: Stage) -> StageReport {
        tracing::info!("Starting stage: {}", stage);
        let result = match stage {
            Stage::IndexCompanies => Ok(self.sync_index_companies(db).await),
            Stage::GlobalStocks => self.sync_global_stocks(db).await,
            Stage::HistoricalPrices => self.sync_historical_prices(db).await,
            Stage::DailyPrices => self.sync_daily_prices(db).await,
        };

        match result {
            Ok(report) => {
                tracing::info!(
                    "Finished stage {}: {} processed, {} skipped, {} failed, {} rows loaded ({} rejected, {} malformed)",
                    stage,
                    report.processed,
                    report.skipped,
                    report.failed,
                    report.load.loaded,
                    report.load.rejected,
                    report.load.malformed
                );
                report
            }
            Err(e) => {
                tracing::error!("Stage {} failed: {}", stage, e);
                let mut report = StageReport::new(stage);
                report.error = Some(e.to_string());
                report
            }
        }
    }

    async fn sync_index_companies(&self, db: &mut Db) -> StageReport {
        let mut report = StageReport::new(Stage::IndexCompanies);
        for index in StockIndex::ALL {
            match self.client.index_constituents(index).await {
                Ok(records) => {
                    let load = db.load(records, |record| IndexConstituentRow::from_record(index, record));
                    tracing::info!("Loaded {} of {} {} constituents", load.loaded, load.attempted, index);
                    report.load.merge(load);
                    report.processed += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to fetch {} constituents: {}", index, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn sync_global_stocks(&self, db: &mut Db) -> Result<StageReport, SyncError> {
        let mut report = StageReport::new(Stage::GlobalStocks);
        let records = self.client.stock_list().await?;
        report.load = db.load(records, GlobalStockRow::from_record);
        report.processed = 1;
        Ok(report)
    }

    async fn sync_historical_prices(&self, db: &mut Db) -> Result<StageReport, SyncError> {
        let mut report = StageReport::new(Stage::HistoricalPrices);
        let symbols = self.universe(db)?;
        let concurrency = self.settings.sync.concurrency.max(1);
        let from = self.settings.fmp_api.from_date;
        let to = self.today;
        let limit = self.settings.sync.market_cap_limit;
        tracing::info!(
            "Fetching historical series for {} symbols ({} to {}, {} worker(s))",
            symbols.len(),
            from,
            to,
            concurrency
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::channel::<HistoryFetch>(concurrency * 2);
        let mut join_set = JoinSet::new();

        for symbol in symbols {
            let sem = Arc::clone(&semaphore);
            let sender = tx.clone();
            let client = self.client.clone();

            join_set.spawn(async move {
                let Ok(_permit) = sem.acquire().await else {
                    return;
                };
                let result = fetch_history(&client, &symbol, from, to, limit).await;
                let _ = sender.send(HistoryFetch { symbol, result }).await;
            });
        }
        drop(tx);

        while let Some(fetch) = rx.recv().await {
            match fetch.result {
                Ok(Some(rows)) => {
                    let load = db.load(rows, |row| row);
                    tracing::info!("{}: loaded {} historical rows", fetch.symbol, load.loaded);
                    report.load.merge(load);
                    report.processed += 1;
                }
                Ok(None) => {
                    tracing::info!("{}: market data not available, skipping", fetch.symbol);
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!("{}: historical fetch failed: {}", fetch.symbol, e);
                    report.failed += 1;
                }
            }
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("Historical fetch task ended abnormally: {}", e);
            }
        }

        Ok(report)
    }

    async fn sync_daily_prices(&self, db: &mut Db) -> Result<StageReport, SyncError> {
        let mut report = StageReport::new(Stage::DailyPrices);
        let symbols = self.universe(db)?;
        tracing::info!("Fetching daily quotes for {} symbols", symbols.len());

        for symbol in &symbols {
            match self.client.quote(symbol).await {
                Ok(records) if records.is_empty() => {
                    tracing::info!("{}: no quote available, skipping", symbol);
                    report.skipped += 1;
                }
                Ok(records) => {
                    let load = db.load(records, DailyPriceRow::from_record);
                    report.load.merge(load);
                    report.processed += 1;
                }
                Err(e) => {
                    tracing::warn!("{}: quote fetch failed: {}", symbol, e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Symbols of the configured index, as persisted by the index stage.
    fn universe(&self, db: &Db) -> Result<Vec<String>, SyncError> {
        let index = self.settings.sync.universe;
        let symbols = db.index_symbols(index)?;
        if symbols.is_empty() {
            tracing::warn!("No {} constituents stored; run the index stage first", index);
        }
        Ok(symbols)
    }
}

/// Price series first, then market caps, then the join. An empty price
/// series short-circuits without spending a call on market caps.
async fn fetch_history(
    client: &ThrottledClient,
    symbol: &str,
    from: NaiveDate,
    to: NaiveDate,
    limit: u32,
) -> Result<Option<Vec<Result<HistoricalPriceRow, RecordError>>>, fmp_api::Error> {
    let prices = client.historical_prices(symbol, from, to).await?;
    if prices.is_empty() {
        return Ok(None);
    }
    let caps = client.historical_market_cap(symbol, limit).await?;
    if caps.is_empty() {
        return Ok(None);
    }
    Ok(Some(series::join(symbol, prices, caps)))
}
