//! Application configuration management.
//!
//! Configuration is shared by the application process and the proxy
//! worker and stored at `~/.config/fieldsync/config.json`. A missing
//! file yields the defaults; `FIELDSYNC_*` environment variables (or a
//! `.env` file loaded by the binary) override the endpoints.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::sync::CollectionRoute;

/// Application name used for config/cache/data directory paths
const APP_NAME: &str = "fieldsync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Durable queue database file name
const QUEUE_FILE: &str = "queue.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the remote service accepting queued records.
    pub remote_base_url: String,
    /// Origin the proxy forwards intercepted requests to.
    pub upstream_origin: String,
    /// Deployment version string naming the current cache generation.
    /// Bumping it on deploy is what evicts the previous generation.
    pub cache_generation: String,
    /// Address the proxy worker listens on.
    pub listen_addr: String,
    /// Collections this deployment drains, with their remote endpoints.
    pub collections: Vec<CollectionRoute>,
    /// Shell paths fetched and stored verbatim at install time.
    pub precache_manifest: Vec<String>,
    /// Path of the offline fallback page; must appear in the manifest.
    pub offline_path: String,
    /// Path prefixes served cache-first as static resources.
    pub static_prefixes: Vec<String>,
    /// API paths whose content is static enough to cache.
    pub static_api_paths: Vec<String>,
    /// Optional override for where the durable queue lives.
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_base_url: "http://localhost:3000/api".to_string(),
            upstream_origin: "http://localhost:3000".to_string(),
            cache_generation: "v1".to_string(),
            listen_addr: "127.0.0.1:8787".to_string(),
            collections: vec![
                CollectionRoute::new("daily-report", "/collections/daily-report/records"),
                CollectionRoute::new(
                    "safety-inspection",
                    "/collections/safety-inspection/records",
                ),
            ],
            precache_manifest: vec![
                "/".to_string(),
                "/offline".to_string(),
                "/manifest.webmanifest".to_string(),
                "/icons/icon-192.png".to_string(),
                "/icons/icon-512.png".to_string(),
            ],
            offline_path: "/offline".to_string(),
            static_prefixes: vec!["/assets/".to_string(), "/icons/".to_string()],
            static_api_paths: vec!["/api/reference/".to_string()],
            data_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("FIELDSYNC_REMOTE_URL") {
            self.remote_base_url = value;
        }
        if let Ok(value) = std::env::var("FIELDSYNC_UPSTREAM") {
            self.upstream_origin = value;
        }
        if let Ok(value) = std::env::var("FIELDSYNC_LISTEN") {
            self.listen_addr = value;
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Root for the proxy's response cache and logs.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Where the durable queue database lives.
    pub fn queue_path(&self) -> Result<PathBuf> {
        let data_dir = match self.data_dir {
            Some(ref dir) => dir.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?
                .join(APP_NAME),
        };
        Ok(data_dir.join(QUEUE_FILE))
    }
}

// ============================================================================
// Tests
// ============================================================================
