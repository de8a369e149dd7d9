//! The `serve` subcommand: read-only HTTP API over sector queries.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Args;
use marketpulse_lib::sectors::{self, format_usd, PeriodicMarketCap, SectorSubsector};
use marketpulse_lib::{Db, DbError, Settings};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Args)]
pub struct ServeArgs {
    /// Bind address (overrides settings)
    #[arg(long)]
    pub host: Option<String>,

    /// Port (overrides settings)
    #[arg(long)]
    pub port: Option<u16>,
}

/// Shared handler state. SQLite connections are not `Sync`, so the one
/// connection sits behind a mutex.
#[derive(Clone)]
pub struct ApiState {
    db: Arc<Mutex<Db>>,
}

impl ApiState {
    pub fn new(db: Db) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    fn with_db<T>(&self, f: impl FnOnce(&Db) -> Result<T, DbError>) -> Result<T, ApiError> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        f(&db).map_err(ApiError)
    }
}

/// A database failure surfaced as a 500 with a JSON body.
#[derive(Debug)]
pub struct ApiError(DbError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Query failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SectorName {
    pub sector: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SectorTotal {
    pub sector: String,
    pub total_marketcap: String,
}

#[derive(Debug, Deserialize)]
pub struct SubsectorParams {
    pub sector: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/sectors", get(list_sectors))
        .route("/sectors/subsectors", get(list_subsectors))
        .route("/sectors/marketcap", get(all_market_caps))
        .route("/sectors/periodic_marketcap_data", get(periodic_market_caps))
        .route("/sectors/:sector/marketcap", get(sector_market_cap))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(args: &ServeArgs, settings: &Settings) -> Result<()> {
    let host = args.host.clone().unwrap_or_else(|| settings.server.host.clone());
    let port = args.port.unwrap_or(settings.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid address {}:{}", host, port))?;

    let db = Db::open(&settings.database.path)?;
    db.init()?;
    let app = router(ApiState::new(db));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    info!("Serving sector API on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("API server shutting down");
        })
        .await?;
    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_sectors(State(state): State<ApiState>) -> Result<Json<Vec<SectorName>>, ApiError> {
    let names = state.with_db(sectors::sectors)?;
    Ok(Json(
        names.into_iter().map(|sector| SectorName { sector }).collect(),
    ))
}

async fn list_subsectors(
    State(state): State<ApiState>,
    Query(params): Query<SubsectorParams>,
) -> Result<Json<Vec<SectorSubsector>>, ApiError> {
    let pairs = state.with_db(|db| sectors::sectors_subsectors(db, params.sector.as_deref()))?;
    Ok(Json(pairs))
}

async fn sector_market_cap(
    State(state): State<ApiState>,
    Path(sector): Path<String>,
) -> Result<Json<SectorTotal>, ApiError> {
    let total = state.with_db(|db| sectors::sector_market_cap(db, &sector))?;
    Ok(Json(SectorTotal {
        sector,
        total_marketcap: format_usd(total as i128),
    }))
}

async fn all_market_caps(
    State(state): State<ApiState>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let caps = state.with_db(sectors::all_sector_market_caps)?;
    Ok(Json(
        caps.into_iter()
            .map(|c| (c.sector, format_usd(c.total_marketcap as i128)))
            .collect(),
    ))
}

async fn periodic_market_caps(
    State(state): State<ApiState>,
) -> Result<Json<Vec<PeriodicMarketCap>>, ApiError> {
    let today = chrono::Local::now().date_naive();
    let caps = state.with_db(|db| sectors::periodic_market_caps(db, today))?;
    Ok(Json(caps))
}
