mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use vigil_api::auth::{AppState, AppStateInner};
use vigil_api::routes;
use vigil_db::Database;
use vigil_lifecycle::SweepJob;
use vigil_lifecycle::scheduler::run_sweep_loop;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&config.db_path))?);

    let state: AppState = Arc::new(AppStateInner::new(db.clone(), config.api.clone()));

    let cancel = CancellationToken::new();
    let mut sweepers = Vec::new();
    if config.background_sweeps {
        let reconciler = state.reconciler.clone();
        let staleness = config.api.staleness;
        sweepers.push(tokio::spawn(run_sweep_loop(
            db.clone(),
            SweepJob::PresenceReconcile,
            config.reconcile_interval,
            cancel.clone(),
            move |now| reconciler.sweep(now, staleness),
        )));

        let expiry = state.expiry.clone();
        sweepers.push(tokio::spawn(run_sweep_loop(
            db.clone(),
            SweepJob::MessageExpiry,
            config.expiry_interval,
            cancel.clone(),
            move |now| expiry.sweep_messages(now),
        )));

        if let Some(retention) = config.api.purge_after {
            let expiry = state.expiry.clone();
            // Compaction is cheap to delay; run it hourly.
            sweepers.push(tokio::spawn(run_sweep_loop(
                db.clone(),
                SweepJob::TombstonePurge,
                std::time::Duration::from_secs(3600),
                cancel.clone(),
                move |now| expiry.purge(now, retention),
            )));
        }
    } else {
        info!("Background sweeps disabled; relying on the cron routes");
    }

    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Vigil server listening on {}", addr);
    info!(
        "Staleness threshold {}s, reconcile every {}s, expiry every {}s",
        config.api.staleness.as_secs(),
        config.reconcile_interval.as_secs(),
        config.expiry_interval.as_secs()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight sweeps finish their current batch; cursors carry the rest.
    cancel.cancel();
    for sweeper in sweepers {
        if let Err(e) = sweeper.await {
            error!("Sweep loop ended abnormally: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
