use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use request_admission::config::{RedisConfig, Settings};
use request_admission::core::{CounterStore, CsrfGuard, RateLimiter, RedisCounterStore};
use request_admission::http::{build_router, AppState};
use request_admission::service::AdmissionService;
use request_admission::utils::{init_logging, install_prometheus_recorder, log_service_event};

/// Connect to the counter store, or run without one when it is not configured
/// or cannot be reached. The rate limiter then applies its failure policy.
async fn connect_store(redis: &RedisConfig) -> Option<Arc<dyn CounterStore>> {
    let Some(url) = redis.url.as_deref() else {
        tracing::warn!("REDIS_URL not set, rate limiting falls back to the failure policy");
        return None;
    };

    match RedisCounterStore::connect(url, redis.token.as_deref(), redis.command_timeout()).await {
        Ok(store) => {
            log_service_event("redis_connected", true, None);
            Some(Arc::new(store))
        }
        Err(e) => {
            log_service_event("redis_connect_failed", false, Some(&e.to_string()));
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    init_logging();
    tracing::info!("Starting request admission service...");

    // Load configuration
    let settings = Settings::load().context("loading configuration")?;
    tracing::info!(
        host = %settings.server.host,
        port = %settings.server.port,
        failure_policy = %settings.rate_limit.failure_policy,
        "Configuration loaded"
    );

    let store = connect_store(&settings.redis).await;
    let rate_limiter = RateLimiter::new(store, &settings.rate_limit);
    let csrf = CsrfGuard::new(settings.csrf.clone());
    let admission = AdmissionService::new(rate_limiter, csrf);

    let mut state = AppState::new(admission);
    match install_prometheus_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics disabled"),
    }

    let app = build_router(state);
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("parsing listen address")?;

    log_service_event("server_listening", true, Some(&addr.to_string()));
    axum::Server::bind(&addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    tracing::info!("Request admission service stopped");
    Ok(())
}
