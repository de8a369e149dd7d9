//! The `sync` subcommand: ingest FMP data into SQLite.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Args;
use marketpulse_lib::{Db, Settings, Stage, Syncer};

use crate::output::{print_sync_summary, OutputFormat};

/// Arguments for the `sync` subcommand.
#[derive(Args)]
pub struct SyncArgs {
    /// Stage to run (index, global, historical, daily). Repeatable; default is all, in order.
    #[arg(long = "stage", value_parser = parse_stage)]
    pub stages: Vec<Stage>,

    /// Concurrent workers for the historical stage (overrides settings)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// SQLite database path (overrides settings)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    s.parse()
}

pub async fn run(args: &SyncArgs, mut settings: Settings, format: &OutputFormat) -> Result<()> {
    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 {
            return Err(anyhow!("--concurrency must be at least 1"));
        }
        settings.sync.concurrency = concurrency;
    }
    if let Some(ref path) = args.db {
        settings.database.path = path.clone();
    }

    let stages: Vec<Stage> = if args.stages.is_empty() {
        Stage::ALL.to_vec()
    } else {
        args.stages.clone()
    };

    let mut db = Db::open(&settings.database.path)?;
    db.init()?;

    eprintln!(
        "Starting sync into {} (stages: {}, {} historical worker(s))",
        settings.database.path.display(),
        stages
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        settings.sync.concurrency
    );

    let syncer = Syncer::from_settings(Arc::new(settings))?;
    let summary = syncer.run(&mut db, &stages).await;

    print_sync_summary(&summary, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stage_accepts_short_and_long_names() {
        assert_eq!(parse_stage("index").unwrap(), Stage::IndexCompanies);
        assert_eq!(parse_stage("daily_prices").unwrap(), Stage::DailyPrices);
        assert!(parse_stage("hourly").is_err());
    }
}
