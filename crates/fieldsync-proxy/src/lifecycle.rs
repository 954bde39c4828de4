//! Install/activate lifecycle of the proxy worker.
//!
//! A new worker version moves `Installing -> Installed -> Activating ->
//! Active`. Install precaches the application shell into the current
//! cache generation, all-or-nothing; activation evicts every other
//! generation. A version whose precache fails never reaches `Active`,
//! and a failed install leaves previously active generations alone
//! (eviction only happens during activation).

use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use reqwest::{header, Client};
use tracing::{debug, info, warn};

use crate::cache::{is_cacheable_status, CachedResponse, ResponseCache};

/// Concurrent precache fetches during install.
/// The shell manifest is small; 4 keeps install quick without hammering
/// the upstream on first visit.
const MAX_CONCURRENT_PRECACHE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Active,
}

pub struct WorkerLifecycle {
    state: WorkerState,
}

impl Default for WorkerLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerLifecycle {
    pub fn new() -> Self {
        Self {
            state: WorkerState::Installing,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Precache the shell manifest into the current generation.
    ///
    /// All-or-nothing: if any entry fails to fetch, the install fails,
    /// the partially populated generation is discarded, and the worker
    /// stays in `Installing`.
    pub async fn install(
        &mut self,
        client: &Client,
        upstream_origin: &str,
        manifest: &[String],
        cache: &ResponseCache,
    ) -> Result<()> {
        if self.state != WorkerState::Installing {
            bail!("install is only valid from the installing state");
        }

        info!(
            generation = cache.generation(),
            entries = manifest.len(),
            "Precaching application shell"
        );

        let results: Vec<(String, Result<()>)> = stream::iter(manifest.iter().cloned())
            .map(|path| async move {
                let result = precache_one(client, upstream_origin, &path, cache).await;
                (path, result)
            })
            .buffer_unordered(MAX_CONCURRENT_PRECACHE)
            .collect()
            .await;

        for (path, result) in results {
            if let Err(e) = result {
                warn!(path = %path, error = %e, "Precache fetch failed, aborting install");
                cache.remove_generation(cache.generation())?;
                return Err(e).with_context(|| format!("Precache of {} failed", path));
            }
            debug!(path = %path, "Precached");
        }

        self.state = WorkerState::Installed;
        Ok(())
    }

    /// Delete every cache generation except the current one, then start
    /// serving. Old deployments' assets cannot leak into a new session.
    pub fn activate(&mut self, cache: &ResponseCache) -> Result<()> {
        if self.state != WorkerState::Installed {
            bail!("activate is only valid from the installed state");
        }
        self.state = WorkerState::Activating;

        let evicted = cache.evict_generations_except(cache.generation())?;
        if !evicted.is_empty() {
            info!(?evicted, "Evicted superseded cache generations");
        }

        self.state = WorkerState::Active;
        Ok(())
    }
}

async fn precache_one(
    client: &Client,
    upstream_origin: &str,
    path: &str,
    cache: &ResponseCache,
) -> Result<()> {
    let url = format!("{}{}", upstream_origin.trim_end_matches('/'), path);
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;

    let status = response.status().as_u16();
    if !is_cacheable_status(status) {
        bail!("Unexpected status {} for {}", status, url);
    }

    let headers = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| vec![("content-type".to_string(), v.to_string())])
        .unwrap_or_default();

    let body = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read body of {}", url))?;

    let entry = CachedResponse::new(ResponseCache::request_key("GET", path), status, headers, &body);
    cache.put(&entry)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manifest() -> Vec<String> {
        vec!["/".to_string(), "/offline".to_string()]
    }

    #[tokio::test]
    async fn test_install_then_activate_reaches_active() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>shell</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/offline"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>offline</html>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().to_path_buf(), "v1").unwrap();
        let client = Client::new();
        let mut lifecycle = WorkerLifecycle::new();

        lifecycle
            .install(&client, &server.uri(), &manifest(), &cache)
            .await
            .unwrap();
        assert_eq!(lifecycle.state(), WorkerState::Installed);

        lifecycle.activate(&cache).unwrap();
        assert_eq!(lifecycle.state(), WorkerState::Active);

        let offline = cache
            .get(&ResponseCache::request_key("GET", "/offline"))
            .expect("offline page precached");
        assert_eq!(offline.body_bytes().unwrap(), b"<html>offline</html>");
    }

    #[tokio::test]
    async fn test_failed_precache_never_activates() {
        // Scenario: one manifest fetch fails during install
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>shell</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/offline"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().to_path_buf(), "v1").unwrap();
        let client = Client::new();
        let mut lifecycle = WorkerLifecycle::new();

        let result = lifecycle
            .install(&client, &server.uri(), &manifest(), &cache)
            .await;
        assert!(result.is_err());
        assert_eq!(lifecycle.state(), WorkerState::Installing);

        // The partial precache was discarded wholesale
        assert!(cache.get(&ResponseCache::request_key("GET", "/")).is_none());

        // And activation is refused from this state
        assert!(lifecycle.activate(&cache).is_err());
        assert_ne!(lifecycle.state(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_activation_evicts_previous_deployment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();

        // A previous deployment left a populated generation behind
        let old = ResponseCache::new(dir.path().to_path_buf(), "v1").unwrap();
        let old_key = ResponseCache::request_key("GET", "/assets/app.v1.js");
        old.put(&CachedResponse::new(old_key.clone(), 200, vec![], b"old bundle"))
            .unwrap();

        let cache = ResponseCache::new(dir.path().to_path_buf(), "v2").unwrap();
        let client = Client::new();
        let mut lifecycle = WorkerLifecycle::new();
        lifecycle
            .install(&client, &server.uri(), &manifest(), &cache)
            .await
            .unwrap();
        lifecycle.activate(&cache).unwrap();

        assert_eq!(cache.list_generations().unwrap(), vec!["v2".to_string()]);
        assert!(old.get(&old_key).is_none());
    }
}
