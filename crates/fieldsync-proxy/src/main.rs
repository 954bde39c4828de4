//! Fieldsync background network proxy.
//!
//! Long-lived worker fronting the application's outgoing HTTP traffic.
//! On startup it precaches the application shell into the current cache
//! generation, evicts superseded generations, then serves fetch events
//! until replaced by a newer version doing the same.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fieldsync_core::api::SubmitClient;
use fieldsync_core::config::Config;
use fieldsync_core::connectivity::ConnectivityMonitor;
use fieldsync_core::store::OfflineStore;
use fieldsync_core::sync::SyncCoordinator;

use fieldsync_proxy::cache::ResponseCache;
use fieldsync_proxy::lifecycle::WorkerLifecycle;
use fieldsync_proxy::notify::{LoggingViews, NotificationDispatcher};
use fieldsync_proxy::server::{build_router, ProxyState};

/// Timeout for upstream fetches. Navigations need to fail fast enough
/// that the offline fallback feels immediate on a dead link.
const UPSTREAM_TIMEOUT_SECS: u64 = 15;

/// Initialize the tracing subscriber: stderr plus a daily log file.
/// Use RUST_LOG to control the level (e.g. RUST_LOG=debug).
fn init_tracing(log_dir: std::path::PathBuf) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::daily(log_dir, "proxy.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load().context("Failed to load configuration")?;

    let cache_dir = config.cache_dir()?;
    let _log_guard = init_tracing(cache_dir.join("logs"));
    info!(version = env!("CARGO_PKG_VERSION"), "Fieldsync proxy starting");

    // The durable queue is shared with the application process through
    // this file alone; an open failure means sync is unavailable.
    let queue_path = config.queue_path()?;
    if let Some(parent) = queue_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = OfflineStore::open(&queue_path)
        .await
        .context("Offline store unavailable")?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(UPSTREAM_TIMEOUT_SECS))
        .build()?;

    // Install and activate this deployment's cache generation. A
    // precache failure aborts startup: this version must not serve.
    let cache = Arc::new(ResponseCache::new(
        cache_dir.join("responses"),
        &config.cache_generation,
    )?);
    let mut lifecycle = WorkerLifecycle::new();
    lifecycle
        .install(&client, &config.upstream_origin, &config.precache_manifest, &cache)
        .await
        .context("Precache failed, refusing to activate")?;
    lifecycle.activate(&cache)?;
    info!(generation = %config.cache_generation, "Cache generation active");

    let submitter = Arc::new(SubmitClient::new(&config.remote_base_url)?);
    let coordinator = SyncCoordinator::new(store, submitter, config.collections.clone());
    let monitor = ConnectivityMonitor::new(true);
    coordinator.watch_connectivity(&monitor);

    let state = ProxyState {
        config: Arc::new(config.clone()),
        cache,
        client,
        coordinator,
        monitor,
        notifier: Arc::new(NotificationDispatcher::new(Arc::new(LoggingViews))),
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Proxy listening");

    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
