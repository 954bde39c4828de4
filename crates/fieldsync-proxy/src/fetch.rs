//! Fetch interception policies.
//!
//! Every request the proxy intercepts is classified once and answered
//! by exactly one of three policies. Nothing is ever dropped: the
//! response is the network's, a cached copy, or the offline fallback.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::cache::{is_cacheable_status, CachedResponse, ResponseCache};
use crate::server::ProxyState;

/// File extensions of versioned bundle assets, always safe to cache:
/// their content changes only when their URL does.
const STATIC_EXTENSIONS: &[&str] = &[
    ".js", ".css", ".woff", ".woff2", ".png", ".svg", ".ico", ".webmanifest",
];

/// Headers never forwarded from an upstream response.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// How an intercepted request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Full-page loads: network first, offline fallback on failure.
    NetworkFirst,
    /// Static/versioned resources: cached copy first, revalidated
    /// behind the response.
    CacheFirst,
    /// Everything else, live API traffic in particular: straight
    /// through, never cached, so stale transactional data is never served.
    Passthrough,
}

pub fn classify(
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    static_prefixes: &[String],
    static_api_paths: &[String],
) -> FetchPolicy {
    if method != Method::GET {
        return FetchPolicy::Passthrough;
    }
    if is_navigation(headers) {
        return FetchPolicy::NetworkFirst;
    }
    if is_static_resource(path, static_prefixes, static_api_paths) {
        return FetchPolicy::CacheFirst;
    }
    FetchPolicy::Passthrough
}

fn is_navigation(headers: &HeaderMap) -> bool {
    if let Some(mode) = headers.get("sec-fetch-mode") {
        if mode == "navigate" {
            return true;
        }
    }
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false)
}

fn is_static_resource(path: &str, static_prefixes: &[String], static_api_paths: &[String]) -> bool {
    static_prefixes.iter().any(|p| path.starts_with(p.as_str()))
        || static_api_paths.iter().any(|p| path.starts_with(p.as_str()))
        || STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Serve one intercepted request.
pub async fn handle_fetch(
    State(state): State<ProxyState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();

    match classify(
        &method,
        uri.path(),
        &headers,
        &state.config.static_prefixes,
        &state.config.static_api_paths,
    ) {
        FetchPolicy::NetworkFirst => navigation(state, path_and_query).await,
        FetchPolicy::CacheFirst => static_resource(state, path_and_query).await,
        FetchPolicy::Passthrough => passthrough(state, method, path_and_query, headers, body).await,
    }
}

/// Network-first with offline fallback. An upstream HTTP error is still
/// a network response and is returned unmodified; only a transport
/// failure falls back to the precached offline page.
async fn navigation(state: ProxyState, path: String) -> Response {
    let url = upstream_url(&state.config.upstream_origin, &path);
    match state.client.get(&url).send().await {
        Ok(response) => forward_response(response).await,
        Err(e) => {
            warn!(url = %url, error = %e, "Navigation fetch failed, serving offline page");
            offline_fallback(&state)
        }
    }
}

fn offline_fallback(state: &ProxyState) -> Response {
    let key = ResponseCache::request_key("GET", &state.config.offline_path);
    match state.cache.get(&key) {
        Some(entry) => cached_to_response(&entry),
        None => {
            // Precache is all-or-nothing, so this means we never installed
            error!("Offline fallback page missing from cache");
            (StatusCode::SERVICE_UNAVAILABLE, "offline").into_response()
        }
    }
}

/// Cache-first with background revalidation.
async fn static_resource(state: ProxyState, path: String) -> Response {
    let key = ResponseCache::request_key("GET", &path);

    if let Some(entry) = state.cache.get(&key) {
        debug!(path = %path, "Cache hit, revalidating behind the response");
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = fetch_and_cache(&state, &path).await {
                // The stale entry simply stays until a revalidation succeeds
                debug!(path = %path, error = %e, "Revalidation failed, keeping cached copy");
            }
        });
        return cached_to_response(&entry);
    }

    // No cached copy: wait on the network and populate for next time
    match fetch_and_cache(&state, &path).await {
        Ok(response) => response,
        Err(e) => {
            warn!(path = %path, error = %e, "Static fetch failed with no cached copy");
            (StatusCode::BAD_GATEWAY, "upstream unreachable").into_response()
        }
    }
}

/// Fetch `path` from upstream, updating the cache entry when the status
/// is cacheable. A cache write failure is logged and the network
/// response is still returned to the caller.
async fn fetch_and_cache(state: &ProxyState, path: &str) -> anyhow::Result<Response> {
    let url = upstream_url(&state.config.upstream_origin, path);
    let upstream = state.client.get(&url).send().await?;

    let status = upstream.status().as_u16();
    let headers = forwardable_headers(upstream.headers());
    let body = upstream.bytes().await?;

    if is_cacheable_status(status) {
        let key = ResponseCache::request_key("GET", path);
        let entry = CachedResponse::new(key, status, headers.clone(), &body);
        if let Err(e) = state.cache.put(&entry) {
            warn!(path = %path, error = %e, "Failed to update cache entry");
        }
    }

    Ok(build_response(status, &headers, body.to_vec()))
}

/// Straight through to the upstream, request and response untouched.
async fn passthrough(
    state: ProxyState,
    method: Method,
    path: String,
    mut headers: HeaderMap,
    body: Bytes,
) -> Response {
    let url = upstream_url(&state.config.upstream_origin, &path);
    headers.remove(header::HOST);

    let result = state
        .client
        .request(method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await;

    match result {
        Ok(upstream) => forward_response(upstream).await,
        Err(e) => {
            warn!(url = %url, error = %e, "Passthrough request failed");
            (StatusCode::BAD_GATEWAY, "upstream unreachable").into_response()
        }
    }
}

fn upstream_url(origin: &str, path: &str) -> String {
    format!("{}{}", origin.trim_end_matches('/'), path)
}

fn forwardable_headers(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

async fn forward_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status().as_u16();
    let headers = forwardable_headers(upstream.headers());
    match upstream.bytes().await {
        Ok(body) => build_response(status, &headers, body.to_vec()),
        Err(e) => {
            warn!(error = %e, "Failed to read upstream response body");
            (StatusCode::BAD_GATEWAY, "upstream body unreadable").into_response()
        }
    }
}

fn build_response(status: u16, headers: &[(String, String)], body: Vec<u8>) -> Response {
    let mut builder = Response::builder().status(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY));
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

fn cached_to_response(entry: &CachedResponse) -> Response {
    let body = match entry.body_bytes() {
        Ok(body) => body,
        Err(e) => {
            warn!(request_key = %entry.request_key, error = %e, "Cached body unreadable");
            Vec::new()
        }
    };
    build_response(entry.status, &entry.headers, body)
}

// ============================================================================
// Tests
// ============================================================================
