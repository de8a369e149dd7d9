mod commands;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use marketpulse_lib::Settings;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "marketpulse")]
#[command(about = "Ingest FMP market data into SQLite and query sector market caps")]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, env = "MARKETPULSE_CONFIG", default_value = "config.json", global = true)]
    config: PathBuf,

    /// Output format: table or json
    #[arg(long, default_value = "table", global = true)]
    output: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch data from FMP and upsert it into the database
    Sync(commands::sync::SyncArgs),
    /// Query sectors and sector market caps
    Sectors(commands::sectors::SectorsArgs),
    /// Serve the sector query API over HTTP
    Serve(commands::serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("marketpulse=info".parse()?)
                .add_directive("marketpulse_lib=info".parse()?)
                .add_directive("fmp_api=info".parse()?),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    let settings = Settings::load(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;

    match &cli.command {
        Commands::Sync(args) => commands::sync::run(args, settings, &format).await?,
        Commands::Sectors(args) => commands::sectors::run(args, &settings, &format)?,
        Commands::Serve(args) => commands::serve::run(args, &settings).await?,
    }

    Ok(())
}
