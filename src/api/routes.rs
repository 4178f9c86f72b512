use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::get_health;
use crate::client::PriceClient;
use crate::db::catalog::{refresh_catalog, CatalogRefreshSummary};
use crate::db::prices::{average_prices, latest_prices_by_platform, LatestPlatformPrice, PriceAverages};
use crate::error::AppError;
use crate::job::ingest::{ingest_id_range, parse_id_range, RangeIngestSummary};
use crate::job::latency::LatencySnapshot;
use crate::job::{JobStatus, StartRequest, WindowScheduler};
use crate::platform::platform_filter_aliases;
use crate::types::now_ms;

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub job: WindowScheduler,
    pub dual_job: WindowScheduler,
    /// Primary-credential client for the catalog refresh, the pricing
    /// passthroughs and one-shot range ingestion.
    pub client: Arc<dyn PriceClient>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .nest("/api/admin/job", job_routes(state.job.clone()))
        .nest("/api/admin/dualjob", job_routes(state.dual_job.clone()))
        .route("/api/base/fetch", post(post_base_fetch))
        .route("/api/price/single", get(get_upstream_price_single))
        .route("/api/price/batch", post(post_upstream_price_batch))
        .route("/api/admin/price/single", get(get_price_single))
        .route("/api/admin/price/avg", get(get_price_avg))
        .route("/api/admin/price/batch_by_id", post(post_price_batch_by_id))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

/// The same five control endpoints, bound to one scheduler.
fn job_routes(job: WindowScheduler) -> Router<ApiState> {
    Router::new()
        .route("/status", get(get_job_status))
        .route("/start", post(post_job_start))
        .route("/pause", post(post_job_pause))
        .route("/resume", post(post_job_resume))
        .route("/stop", post(post_job_stop))
        .with_state(job)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameQuery {
    pub market_hash_name: Option<String>,
    /// Any spelling of a marketplace; matches all of its aliases.
    pub platform: Option<String>,
}

impl NameQuery {
    fn required_name(&self) -> Result<String, AppError> {
        self.market_hash_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("marketHashName is required".to_string()))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPriceBody {
    pub market_hash_names: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSingleResponse {
    pub market_hash_name: String,
    pub prices: Vec<LatestPlatformPrice>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyResponse {
    pub job: LatencySnapshot,
    pub dual_job: LatencySnapshot,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_job_status(State(job): State<WindowScheduler>) -> Json<JobStatus> {
    Json(job.status())
}

/// An empty body starts with the defaults; a body with a non-integer field is a 400.
async fn post_job_start(State(job): State<WindowScheduler>, body: Bytes) -> Result<Json<JobStatus>, AppError> {
    let req = StartRequest::from_body(&body)?;
    Ok(Json(job.start(req).await?))
}

async fn post_job_pause(State(job): State<WindowScheduler>) -> Json<JobStatus> {
    Json(job.pause())
}

async fn post_job_resume(State(job): State<WindowScheduler>) -> Json<JobStatus> {
    Json(job.resume())
}

async fn post_job_stop(State(job): State<WindowScheduler>) -> Json<JobStatus> {
    Json(job.stop().await)
}

async fn post_base_fetch(State(state): State<ApiState>) -> Result<Json<CatalogRefreshSummary>, AppError> {
    let payload = state.client.fetch_all_items().await?;
    let summary = refresh_catalog(&state.pool, &payload).await?;
    Ok(Json(summary))
}

/// Upstream single-item price response, unmodified.
async fn get_upstream_price_single(
    State(state): State<ApiState>,
    Query(params): Query<NameQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let name = params.required_name()?;
    Ok(Json(state.client.fetch_price_single(&name).await?))
}

/// Upstream batch price response, unmodified. Nothing is stored.
async fn post_upstream_price_batch(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let parsed: BatchPriceBody = serde_json::from_slice(&body)?;
    let names = parsed
        .market_hash_names
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::BadRequest("marketHashNames must be a non-empty list".to_string()))?;
    Ok(Json(state.client.fetch_price_batch(&names).await?))
}

async fn get_price_single(
    State(state): State<ApiState>,
    Query(params): Query<NameQuery>,
) -> Result<Json<PriceSingleResponse>, AppError> {
    let name = params.required_name()?;

    let mut prices = latest_prices_by_platform(&state.pool, &name).await?;
    if let Some(platform) = params.platform.as_deref() {
        let aliases = platform_filter_aliases(platform);
        if !aliases.is_empty() {
            prices.retain(|p| aliases.contains(&p.platform));
        }
    }

    Ok(Json(PriceSingleResponse {
        market_hash_name: name,
        prices,
    }))
}

async fn get_price_avg(
    State(state): State<ApiState>,
    Query(params): Query<NameQuery>,
) -> Result<Json<PriceAverages>, AppError> {
    let name = params.required_name()?;
    Ok(Json(average_prices(&state.pool, &name, now_ms()).await?))
}

async fn post_price_batch_by_id(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<RangeIngestSummary>, AppError> {
    let value: serde_json::Value = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    let (start_id, end_id) = parse_id_range(&value)?;
    let summary = ingest_id_range(&state.pool, state.client.as_ref(), start_id, end_id).await?;
    Ok(Json(summary))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    Json(LatencyResponse {
        job: state.job.latency(),
        dual_job: state.dual_job.latency(),
    })
}
