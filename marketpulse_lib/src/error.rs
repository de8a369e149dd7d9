//! Error types for the sync pipeline.

use std::fmt;

use crate::db::DbError;

/// A failure that stops one unit of sync work (a stage, an index, or a
/// symbol). The orchestrator logs it and moves on; it never aborts a run.
#[derive(Debug)]
pub enum SyncError {
    /// An error from the FMP API client (network, status, or parse).
    Api(fmp_api::Error),
    /// A database read needed to plan the work failed.
    Db(DbError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api(e) => write!(f, "API error: {}", e),
            Self::Db(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Api(e) => Some(e),
            Self::Db(e) => Some(e),
        }
    }
}

impl From<fmp_api::Error> for SyncError {
    fn from(e: fmp_api::Error) -> Self {
        Self::Api(e)
    }
}

impl From<DbError> for SyncError {
    fn from(e: DbError) -> Self {
        Self::Db(e)
    }
}
