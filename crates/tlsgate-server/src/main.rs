//! tlsgate - TLS policy enforcement sidecar entry point

use anyhow::{Context, Result};
use std::sync::Arc;
use tlsgate_api::AppState;
use tlsgate_common::config::{Config, LoggingConfig};
use tlsgate_core::{create_tls_acceptor, EnforcementMetrics, PolicyStore};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting tlsgate on {}...", config.server.hostname);

    let metrics = Arc::new(EnforcementMetrics::new()?);

    // Load the enforcement policy; failures fall back to the fail-closed default
    let store = Arc::new(PolicyStore::open_with_metrics(
        config.policy.path.clone(),
        Some(metrics.clone()),
    ));
    let snapshot = store.current();
    if snapshot.is_fallback() {
        warn!("Running with fail-closed fallback policy");
    } else {
        info!("TLS policy version {} in force", snapshot.version);
    }

    // Check that the host's acceptor can be built from this policy
    match config.tls {
        Some(ref tls) if tls.is_configured() => {
            create_tls_acceptor(tls, &snapshot.policy)
                .context("TLS acceptor does not accept the current policy")?;
            info!("TLS acceptor configuration verified");
        }
        Some(_) => warn!("TLS certificate or key not found, skipping acceptor check"),
        None => info!("No TLS certificate configured"),
    }

    // Reload the policy on SIGHUP
    let reload_handle = spawn_reload_listener(store.clone());

    // Start API server
    let api_handle = {
        let mut state = AppState::new(store.clone(), metrics.clone());
        match config.webhook.secret {
            Some(ref secret) => state = state.with_webhook_secret(secret),
            None if config.webhook.enabled => {
                warn!("No webhook secret configured, all webhook requests will be rejected")
            }
            None => {}
        }

        let app = tlsgate_api::create_router(state, &config);
        let listener = tokio::net::TcpListener::bind(&config.api.bind)
            .await
            .with_context(|| format!("Failed to bind API server to {}", config.api.bind))?;
        info!("Starting API server on {}", config.api.bind);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("API server error: {}", e);
            }
        })
    };

    info!("tlsgate started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Cleanup
    api_handle.abort();
    if let Some(handle) = reload_handle {
        handle.abort();
    }

    info!("tlsgate shutdown complete");

    Ok(())
}

#[cfg(unix)]
fn spawn_reload_listener(store: Arc<PolicyStore>) -> Option<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!("Cannot listen for SIGHUP, policy reload disabled: {}", e);
            return None;
        }
    };

    Some(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading TLS policy");
            match store.reload() {
                Ok(snapshot) => info!("TLS policy version {} in force", snapshot.version),
                Err(e) => error!("Policy reload failed, fail-closed default in force: {}", e),
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_reload_listener(_store: Arc<PolicyStore>) -> Option<tokio::task::JoinHandle<()>> {
    None
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tlsgate=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "text" {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    }
}
