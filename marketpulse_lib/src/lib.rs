//! Library layer for MarketPulse: throttled FMP ingestion into SQLite and
//! sector queries on top of it.
//!
//! Wraps the `fmp_api` crate with a shared call-budget limiter, converts raw
//! records into rows, upserts them one transaction at a time, and sequences
//! the sync stages.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod rate_limiter;
pub mod rows;
pub mod sectors;
pub mod series;
pub mod sync;

pub use fmp_api;
pub use fmp_api::types;
pub use fmp_api::{Endpoint, StockIndex};

pub use client::ThrottledClient;
pub use config::{ConfigError, Settings};
pub use db::{Db, DbError, LoadReport, Table};
pub use error::SyncError;
pub use rate_limiter::{RateLimiter, RequestTracker, TrackerSummary};
pub use rows::RecordError;
pub use sync::{Stage, StageReport, SyncSummary, Syncer};
