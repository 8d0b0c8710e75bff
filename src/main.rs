use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, warn};

use pixflow::api::{self, AppState};
use pixflow::config::{GatewayConfig, PlatformSettings, ReconcilerConfig, ServerConfig};
use pixflow::database::{MemoryStore, Store};
use pixflow::logging::init_tracing;
use pixflow::payments::{DivpagClient, PaymentGateway};
use pixflow::services::{DepositService, LedgerPoster, LogNotifier, Notifier, WithdrawalService};
use pixflow::workers::ReconciliationEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting PIX payments backend");

    let server_config = ServerConfig::from_env();
    let reconciler_config = ReconcilerConfig::from_env();
    let gateway_config = GatewayConfig::from_env();
    gateway_config.validate().map_err(|e| {
        error!("Invalid gateway configuration: {}", e);
        e
    })?;

    let settings = PlatformSettings::load().context("loading platform settings")?;
    settings.validate().context("validating platform settings")?;
    let settings = Arc::new(settings);

    let store = build_store(&server_config).await?;

    let webhook_secret = gateway_config.webhook_secret.clone();
    let gateway: Arc<dyn PaymentGateway> = Arc::new(
        DivpagClient::new(gateway_config, settings.deposit_limits()).context("building gateway client")?,
    );
    let poster = LedgerPoster::new(settings.clone());
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let engine = Arc::new(ReconciliationEngine::new(
        store.clone(),
        gateway.clone(),
        poster.clone(),
        notifier.clone(),
        reconciler_config.clone(),
    ));
    let deposits = Arc::new(DepositService::new(store.clone(), gateway.clone(), settings.clone()));
    let withdrawals = Arc::new(WithdrawalService::new(
        store.clone(),
        gateway,
        poster,
        notifier,
        reconciler_config.payout_lock_timeout,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_engine = engine.clone();
    let worker_rx = shutdown_rx.clone();
    let worker = tokio::spawn(async move { worker_engine.run(worker_rx).await });

    let app = api::router(AppState {
        engine,
        deposits,
        withdrawals,
        store,
        webhook_secret,
        started_at: Instant::now(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], server_config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "HTTP server listening");

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let mut server_rx = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_rx.changed().await;
        })
        .await
        .map_err(|e| {
            error!("Server error: {}", e);
            e
        })?;

    if let Err(e) = worker.await {
        warn!("Reconciliation worker ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(feature = "database")]
async fn build_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn Store>> {
    match &config.database_url {
        Some(url) => {
            let store = pixflow::database::PgStore::connect(url, config.max_connections)
                .await
                .context("connecting to database")?;
            store.migrate().await.context("running migrations")?;
            info!("Using Postgres store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(not(feature = "database"))]
async fn build_store(_config: &ServerConfig) -> anyhow::Result<Arc<dyn Store>> {
    warn!("Built without the database feature, using in-memory store");
    Ok(Arc::new(MemoryStore::new()))
}
