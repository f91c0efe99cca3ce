use std::future::IntoFuture;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::errors::{Error, Result};

use super::routes::{build_router, ApiState, HealthFlag};

/// Bind and serve until Ctrl-C or SIGTERM
pub async fn start_api_server(config: &ServerConfig, state: ApiState) -> Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| Error::configuration(format!("Invalid API address: {}", e)))?;

    let health = state.health.clone();
    let router: Router = build_router(state, config.cors);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::transport(format!("Failed to bind API server: {}", e)))?;

    info!(address = %addr, cors = config.cors, "Starting HTTP API server");
    health.set(true);

    let (stopping_tx, mut stopping_rx) = watch::channel(false);
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        shutdown_signal(health).await;
        let _ = stopping_tx.send(true);
    });

    // In-flight requests get the grace period once the signal fires
    let grace = config.shutdown_grace();
    let deadline = async move {
        if stopping_rx.wait_for(|stopping| *stopping).await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server.into_future() => {
            result.map_err(|e| Error::transport(format!("API server error: {}", e)))?;
        }
        _ = deadline => {
            warn!(grace_seconds = grace.as_secs(), "Shutdown grace period elapsed, closing open connections");
        }
    }

    info!("API server shutdown completed");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, reporting unhealthy before connections drain
pub async fn shutdown_signal(health: HealthFlag) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C listener failed");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM listener failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    health.set(false);
    info!("Shutdown signal received");
}
