use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use nli_server::{Config, ServiceState, router, startup};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    config.validate()?;
    info!("nli-service v{}", env!("CARGO_PKG_VERSION"));

    let state = Arc::new(ServiceState::new(config.model.clone(), config.device));
    let engine = Arc::new(startup::load_engine(&config).await?);
    state.mark_ready(Arc::clone(&engine))?;

    let listener = TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    info!(addr = %listener.local_addr()?, "listening");

    let signal_state = Arc::clone(&state);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_state.begin_shutdown();
        })
        .await
        .context("HTTP server failed")?;

    // Every handler has returned, so this should be the last reference.
    tokio::task::spawn_blocking(move || match Arc::try_unwrap(engine) {
        Ok(engine) => engine.shutdown(),
        Err(_) => warn!("engine still referenced at shutdown, workers left to exit on drop"),
    })
    .await?;

    info!("nli-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
