mod api;
mod client;
mod config;
mod db;
mod error;
mod job;
mod normalizer;
mod platform;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::client::{CredentialSlot, PriceClient, SteamDtClient};
use crate::config::Config;
use crate::db::repair::repair_prices;
use crate::error::Result;
use crate::job::{CredentialStrategy, FailurePolicy, WindowScheduler};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);
    repair_prices(&pool).await;

    // --- Pricing API clients, one per credential ---
    let primary: Arc<dyn PriceClient> =
        Arc::new(SteamDtClient::new(&cfg.base_url, cfg.api_key.clone(), CredentialSlot::Primary)?);
    let first: Arc<dyn PriceClient> =
        Arc::new(SteamDtClient::new(&cfg.base_url, cfg.api_key_1.clone(), CredentialSlot::First)?);
    let second: Arc<dyn PriceClient> =
        Arc::new(SteamDtClient::new(&cfg.base_url, cfg.api_key_2.clone(), CredentialSlot::Second)?);

    for client in [&primary, &first, &second] {
        if !client.has_credential() {
            warn!(
                "{} not set: jobs using this credential will refuse to start",
                client.slot().error_code()
            );
        }
    }

    // --- Jobs (idle until started over the admin API) ---
    let job = WindowScheduler::new(
        "price_batch",
        pool.clone(),
        CredentialStrategy::Constant(Arc::clone(&primary)),
        FailurePolicy::Silent,
        cfg.job,
    );
    let dual_job = WindowScheduler::new(
        "dual_price_batch",
        pool.clone(),
        CredentialStrategy::Alternating { first, second },
        FailurePolicy::Recorded,
        cfg.dual_job,
    );
    info!(
        job_batch_size = cfg.job.batch_size,
        job_interval_secs = cfg.job.interval_secs,
        dual_batch_size = cfg.dual_job.batch_size,
        dual_interval_secs = cfg.dual_job.interval_secs,
        "Jobs configured: {} and {}",
        job.name(),
        dual_job.name()
    );

    // --- HTTP API server ---
    let api_state = ApiState {
        pool,
        job: job.clone(),
        dual_job: dual_job.clone(),
        client: primary,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Give in-flight windows their bounded chance to finish.
    job.stop().await;
    dual_job.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
