//! Axum router setup for the proxy worker.
//!
//! Two route groups: platform event ingestion under `/internal/*`
//! (push delivery, deferred retry, connectivity signal, health), and a
//! fallback that feeds every other request through the fetch policies.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use fieldsync_core::config::Config;
use fieldsync_core::connectivity::ConnectivityMonitor;
use fieldsync_core::sync::SyncCoordinator;

use crate::cache::ResponseCache;
use crate::fetch;
use crate::notify::{Notification, NotificationDispatcher};

/// Largest request body the proxy will buffer for forwarding.
/// Field photos are the biggest payloads in practice; 25 MiB covers them.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// The one retry tag recognized as a queue-drain request. Retry events
/// carrying any other tag are acknowledged and ignored.
pub const DRAIN_RETRY_TAG: &str = "fieldsync-drain";

#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<Config>,
    pub cache: Arc<ResponseCache>,
    pub client: reqwest::Client,
    pub coordinator: Arc<SyncCoordinator>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub notifier: Arc<NotificationDispatcher>,
}

pub fn build_router(state: ProxyState) -> Router {
    let internal = Router::new()
        .route("/internal/health", get(health))
        .route("/internal/push", post(receive_push))
        .route("/internal/retry/{tag}", post(receive_retry))
        .route("/internal/notification-click", post(receive_notification_click))
        .route("/internal/connectivity", post(receive_connectivity));

    Router::new()
        .merge(internal)
        .fallback(fetch::handle_fetch)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Platform push delivery. Parsing is defensive; this endpoint cannot
/// fail on payload contents.
async fn receive_push(State(state): State<ProxyState>, body: Bytes) -> Json<Notification> {
    Json(state.notifier.dispatch(&body))
}

/// Platform deferred-retry signal. Only the well-known drain tag
/// triggers a reconciliation pass.
async fn receive_retry(State(state): State<ProxyState>, Path(tag): Path<String>) -> StatusCode {
    if tag != DRAIN_RETRY_TAG {
        debug!(tag = %tag, "Ignoring retry event with unknown tag");
        return StatusCode::NO_CONTENT;
    }

    match state.coordinator.drain().await {
        Ok(Some(report)) => {
            info!(
                synced = report.synced,
                failed = report.failed,
                "Deferred retry drain complete"
            );
            StatusCode::NO_CONTENT
        }
        // Another drain holds the flag; this pass is already covered
        Ok(None) => StatusCode::NO_CONTENT,
        Err(e) => {
            error!(error = %e, "Deferred retry drain failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[derive(Debug, Deserialize)]
struct NotificationClick {
    url: String,
}

/// Platform notification-click event: focus a client view already
/// showing the target URL, or open a new one.
async fn receive_notification_click(
    State(state): State<ProxyState>,
    Json(click): Json<NotificationClick>,
) -> StatusCode {
    match state.notifier.handle_click(&click.url).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            error!(url = %click.url, error = %e, "Notification click handling failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectivitySignal {
    online: bool,
}

/// Platform connectivity signal, forwarded to the monitor. A transition
/// to online triggers a drain through the coordinator's subscription.
async fn receive_connectivity(
    State(state): State<ProxyState>,
    Json(signal): Json<ConnectivitySignal>,
) -> StatusCode {
    state.monitor.set_online(signal.online);
    StatusCode::NO_CONTENT
}
