use marketpulse_lib::sectors::{
    format_usd, PeriodicMarketCap, SectorMarketCap, SectorSubsector,
};
use marketpulse_lib::{StageReport, SyncSummary};
use serde::Serialize;
use tabled::{Table, Tabled};

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled, Serialize)]
struct SectorRow {
    #[tabled(rename = "Sector")]
    #[serde(rename = "sector")]
    sector: String,
}

#[derive(Tabled, Serialize)]
struct SubsectorRow {
    #[tabled(rename = "Sector")]
    #[serde(rename = "sector")]
    sector: String,
    #[tabled(rename = "Sub-Sector")]
    #[serde(rename = "subSector")]
    sub_sector: String,
}

#[derive(Tabled, Serialize)]
struct MarketCapRow {
    #[tabled(rename = "Sector")]
    #[serde(rename = "sector")]
    sector: String,
    #[tabled(rename = "Market Cap")]
    #[serde(rename = "total_marketcap")]
    total_marketcap: String,
}

#[derive(Tabled)]
struct PeriodicRow {
    #[tabled(rename = "Sector")]
    sector: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Prev Day")]
    previous: String,
    #[tabled(rename = "1W")]
    one_week: String,
    #[tabled(rename = "1M")]
    one_month: String,
    #[tabled(rename = "3M")]
    three_months: String,
    #[tabled(rename = "6M")]
    six_months: String,
    #[tabled(rename = "1Y")]
    one_year: String,
}

#[derive(Tabled)]
struct StageRow {
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Processed")]
    processed: usize,
    #[tabled(rename = "Skipped")]
    skipped: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Loaded")]
    loaded: usize,
    #[tabled(rename = "Rejected")]
    rejected: usize,
    #[tabled(rename = "Malformed")]
    malformed: usize,
    #[tabled(rename = "Error")]
    error: String,
}

// -- Row builders --

fn build_sector_rows(sectors: &[String]) -> Vec<SectorRow> {
    sectors
        .iter()
        .map(|s| SectorRow { sector: s.clone() })
        .collect()
}

fn build_subsector_rows(pairs: &[SectorSubsector]) -> Vec<SubsectorRow> {
    pairs
        .iter()
        .map(|p| SubsectorRow {
            sector: p.sector.clone().unwrap_or_default(),
            sub_sector: p.sub_sector.clone().unwrap_or_default(),
        })
        .collect()
}

fn build_market_cap_rows(caps: &[SectorMarketCap]) -> Vec<MarketCapRow> {
    caps.iter()
        .map(|c| MarketCapRow {
            sector: c.sector.clone(),
            total_marketcap: format_usd(c.total_marketcap as i128),
        })
        .collect()
}

fn build_periodic_rows(caps: &[PeriodicMarketCap]) -> Vec<PeriodicRow> {
    caps.iter()
        .map(|c| PeriodicRow {
            sector: c.sector.clone(),
            current: format_optional_usd(c.current_marketcap),
            previous: format_optional_usd(c.previous_marketcap),
            one_week: format_optional_usd(c.oneweek_back),
            one_month: format_optional_usd(c.onemonth_back),
            three_months: format_optional_usd(c.threemonths_back),
            six_months: format_optional_usd(c.sixmonths_back),
            one_year: format_optional_usd(c.oneyear_back),
        })
        .collect()
}

fn build_stage_rows(stages: &[StageReport]) -> Vec<StageRow> {
    stages
        .iter()
        .map(|s| StageRow {
            stage: s.stage.to_string(),
            processed: s.processed,
            skipped: s.skipped,
            failed: s.failed,
            loaded: s.load.loaded,
            rejected: s.load.rejected,
            malformed: s.load.malformed,
            error: s.error.clone().unwrap_or_default(),
        })
        .collect()
}

// -- Output --

pub fn print_sectors(sectors: &[String], format: &OutputFormat) {
    let rows = build_sector_rows(sectors);
    match format {
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Json => print_json(&rows),
    }
}

pub fn print_subsectors(pairs: &[SectorSubsector], format: &OutputFormat) {
    let rows = build_subsector_rows(pairs);
    match format {
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Json => print_json(&rows),
    }
}

pub fn print_market_caps(caps: &[SectorMarketCap], format: &OutputFormat) {
    let rows = build_market_cap_rows(caps);
    match format {
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Json => print_json(&rows),
    }
}

pub fn print_periodic(caps: &[PeriodicMarketCap], format: &OutputFormat) {
    match format {
        OutputFormat::Table => println!("{}", Table::new(build_periodic_rows(caps))),
        OutputFormat::Json => print_json(&caps),
    }
}

pub fn print_sync_summary(summary: &SyncSummary, format: &OutputFormat) {
    match format {
        OutputFormat::Table => {
            println!("{}", Table::new(build_stage_rows(&summary.stages)));
            let r = &summary.requests;
            println!(
                "{} requests ({} ok, {} failed), {} throttle sleeps ({:.1}s)",
                r.requests_made,
                r.requests_succeeded,
                r.requests_failed,
                r.throttle_sleeps,
                r.total_throttle_secs
            );
        }
        OutputFormat::Json => print_json(summary),
    }
}

// -- JSON output --

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}

fn format_optional_usd(value: Option<f64>) -> String {
    match value {
        Some(v) => format_usd(v.round() as i128),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketpulse_lib::{LoadReport, Stage};

    #[test]
    fn test_format_optional_usd() {
        assert_eq!(format_optional_usd(Some(1_234_567.6)), "$1,234,568");
        assert_eq!(format_optional_usd(None), "-");
    }

    #[test]
    fn test_build_market_cap_rows_formats_dollars() {
        let caps = vec![SectorMarketCap {
            sector: "Energy".into(),
            total_marketcap: 1_500_000_000_000,
        }];
        let rows = build_market_cap_rows(&caps);
        assert_eq!(rows[0].total_marketcap, "$1,500,000,000,000");
    }

    #[test]
    fn test_build_subsector_rows_fills_nulls() {
        let pairs = vec![SectorSubsector {
            sector: Some("Energy".into()),
            sub_sector: None,
        }];
        let rows = build_subsector_rows(&pairs);
        assert_eq!(rows[0].sector, "Energy");
        assert_eq!(rows[0].sub_sector, "");
    }

    #[test]
    fn test_build_stage_rows() {
        let stages = vec![StageReport {
            stage: Stage::HistoricalPrices,
            processed: 10,
            skipped: 2,
            failed: 1,
            load: LoadReport {
                attempted: 100,
                loaded: 99,
                rejected: 1,
                malformed: 0,
            },
            error: None,
        }];
        let rows = build_stage_rows(&stages);
        assert_eq!(rows[0].stage, "historical");
        assert_eq!(rows[0].loaded, 99);
        assert_eq!(rows[0].error, "");
    }

    #[test]
    fn test_subsector_json_uses_camel_case_key() {
        let rows = build_subsector_rows(&[SectorSubsector {
            sector: Some("Utilities".into()),
            sub_sector: Some("Electric Utilities".into()),
        }]);
        let value = serde_json::to_value(&rows).unwrap();
        assert_eq!(value[0]["subSector"], "Electric Utilities");
    }

    #[test]
    fn test_periodic_table_renders_missing_as_dash() {
        let caps = vec![PeriodicMarketCap {
            sector: "Energy".into(),
            current_marketcap: Some(1000.0),
            previous_marketcap: None,
            oneweek_back: None,
            onemonth_back: None,
            threemonths_back: None,
            sixmonths_back: None,
            oneyear_back: None,
        }];
        let rows = build_periodic_rows(&caps);
        assert_eq!(rows[0].current, "$1,000");
        assert_eq!(rows[0].previous, "-");
        let rendered = Table::new(rows).to_string();
        assert!(rendered.contains("Energy"));
    }
}
