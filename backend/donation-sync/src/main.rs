//! Kiosk donation sync entry point.
//!
//! Opens the offline queue database, starts the connectivity probe and the
//! sync controller, and serves the local API the kiosk front-end polls.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use donation_sync::api::{self, ApiState};
use donation_sync::config::Config;
use donation_sync::connectivity::{self, Connectivity};
use donation_sync::controller::SyncController;
use donation_sync::db;
use donation_sync::gateway::DonationGateway;
use donation_sync::nocodb::NocoDbGateway;
use donation_sync::queue::{QueueStore, QUEUE_KEY};
use donation_sync::storage::SqliteSlot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Offline queue storage.
    let pool = db::init_pool(&config.database_url).await?;
    let queue = QueueStore::new(Arc::new(SqliteSlot::new(pool, QUEUE_KEY)));

    // The timeout here is the only one applied to gateway calls.
    let client = Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;
    let gateway: Arc<dyn DonationGateway> = Arc::new(NocoDbGateway::from_config(client, &config));

    // ─── Connectivity probe ───────────────────────────────
    let shutdown = CancellationToken::new();
    let initial = match gateway.ping().await {
        Ok(()) => Connectivity::Online,
        Err(e) => {
            warn!("Gateway unreachable at startup: {e}");
            Connectivity::Offline
        }
    };
    let (online_tx, online_rx) = connectivity::channel(initial);
    tokio::spawn(connectivity::run(
        Arc::clone(&gateway),
        online_tx,
        Duration::from_secs(config.connectivity_probe_secs),
        shutdown.clone(),
    ));

    // ─── Sync controller ──────────────────────────────────
    let controller = Arc::new(SyncController::new(gateway, queue, &config.channel));
    controller.initialize(online_rx).await;
    if controller.queue().has_pending().await {
        info!("Offline donations still pending; waiting for the gateway");
    }

    // ─── REST API ─────────────────────────────────────────
    let app = api::router(Arc::new(ApiState {
        controller: Arc::clone(&controller),
    }));

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("Kiosk API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    shutdown.cancel();
    controller.dispose();
    Ok(())
}
