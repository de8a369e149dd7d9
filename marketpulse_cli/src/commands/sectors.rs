//! The `sectors` subcommand: read-only queries over the local database.

use anyhow::Result;
use clap::{Args, Subcommand};
use marketpulse_lib::{sectors, Db, Settings};

use crate::output::{
    print_market_caps, print_periodic, print_sectors, print_subsectors, OutputFormat,
};

#[derive(Args)]
pub struct SectorsArgs {
    #[command(subcommand)]
    pub query: SectorsQuery,
}

#[derive(Subcommand)]
pub enum SectorsQuery {
    /// List distinct S&P 500 sectors
    List,
    /// List sector / sub-sector pairs
    Subsectors {
        /// Only sub-sectors of this sector
        #[arg(long)]
        sector: Option<String>,
    },
    /// Total market cap from the latest daily quotes
    Marketcap {
        /// Only this sector (default: every sector)
        #[arg(long)]
        sector: Option<String>,
    },
    /// Market caps over the last day, week, months and year
    Periodic,
}

pub fn run(args: &SectorsArgs, settings: &Settings, format: &OutputFormat) -> Result<()> {
    let db = Db::open(&settings.database.path)?;
    db.init()?;

    match &args.query {
        SectorsQuery::List => print_sectors(&sectors::sectors(&db)?, format),
        SectorsQuery::Subsectors { sector } => {
            print_subsectors(&sectors::sectors_subsectors(&db, sector.as_deref())?, format)
        }
        SectorsQuery::Marketcap { sector: Some(sector) } => {
            let total = sectors::sector_market_cap(&db, sector)?;
            print_market_caps(
                &[sectors::SectorMarketCap {
                    sector: sector.clone(),
                    total_marketcap: total,
                }],
                format,
            )
        }
        SectorsQuery::Marketcap { sector: None } => {
            print_market_caps(&sectors::all_sector_market_caps(&db)?, format)
        }
        SectorsQuery::Periodic => {
            let today = chrono::Local::now().date_naive();
            print_periodic(&sectors::periodic_market_caps(&db, today)?, format)
        }
    }
    Ok(())
}
