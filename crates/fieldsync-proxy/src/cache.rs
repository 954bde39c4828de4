//! Versioned response cache.
//!
//! Cached responses live in one directory per cache generation, named
//! after the deployment version. Entries are JSON files keyed by the
//! SHA-256 of the request identity. A superseded generation is evicted
//! as a whole directory during activation, never entry by entry, so a
//! new deployment can never serve a mix of old and new assets.

use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Directory under the cache root holding one subdirectory per generation
const GENERATIONS_DIR: &str = "generations";

/// Whether a network status is worth storing. Partial content is not:
/// a cached 206 would be replayed as a full response.
pub fn is_cacheable_status(status: u16) -> bool {
    (200..300).contains(&status) && status != 206
}

/// A stored network response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Canonical request identity this entry answers.
    pub request_key: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    body_b64: String,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(
        request_key: impl Into<String>,
        status: u16,
        headers: Vec<(String, String)>,
        body: &[u8],
    ) -> Self {
        Self {
            request_key: request_key.into(),
            status,
            headers,
            body_b64: BASE64.encode(body),
            stored_at: Utc::now(),
        }
    }

    pub fn body_bytes(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.body_b64)
            .context("Cached response body is not valid base64")
    }
}

/// Handle to one generation of the response cache.
pub struct ResponseCache {
    root: PathBuf,
    generation: String,
}

impl ResponseCache {
    /// Open the cache rooted at `cache_dir`, writing into `generation`.
    pub fn new(cache_dir: PathBuf, generation: impl Into<String>) -> Result<Self> {
        let generation = generation.into();
        let root = cache_dir.join(GENERATIONS_DIR);
        std::fs::create_dir_all(root.join(&generation))
            .with_context(|| format!("Failed to create cache generation {}", generation))?;
        Ok(Self { root, generation })
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    /// Canonical identity of a cacheable request. Only safe reads are
    /// ever cached, so in practice the method is always GET.
    pub fn request_key(method: &str, path: &str) -> String {
        format!("{} {}", method.to_ascii_uppercase(), path)
    }

    fn entry_path(&self, generation: &str, request_key: &str) -> PathBuf {
        let digest = Sha256::digest(request_key.as_bytes());
        let name: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        self.root.join(generation).join(format!("{}.json", name))
    }

    /// Look up an entry in the current generation. A missing or
    /// unreadable entry is a miss, never an error.
    pub fn get(&self, request_key: &str) -> Option<CachedResponse> {
        let path = self.entry_path(&self.generation, request_key);
        let contents = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(request_key, error = %e, "Discarding unreadable cache entry");
                None
            }
        }
    }

    /// Store an entry in the current generation, overwriting any
    /// previous response for the same request.
    pub fn put(&self, entry: &CachedResponse) -> Result<()> {
        let path = self.entry_path(&self.generation, &entry.request_key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string(entry)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write cache entry for {}", entry.request_key))?;
        debug!(request_key = %entry.request_key, generation = %self.generation, "Cached response");
        Ok(())
    }

    /// All generation names currently on disk.
    pub fn list_generations(&self) -> Result<Vec<String>> {
        let mut generations = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                generations.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        generations.sort();
        Ok(generations)
    }

    /// Delete every generation except `keep`, returning the evicted
    /// names. Each eviction removes the whole directory.
    pub fn evict_generations_except(&self, keep: &str) -> Result<Vec<String>> {
        let mut evicted = Vec::new();
        for generation in self.list_generations()? {
            if generation == keep {
                continue;
            }
            std::fs::remove_dir_all(self.root.join(&generation))
                .with_context(|| format!("Failed to evict cache generation {}", generation))?;
            evicted.push(generation);
        }
        Ok(evicted)
    }

    /// Remove one generation outright (used to discard a partial precache).
    pub fn remove_generation(&self, generation: &str) -> Result<()> {
        let path = self.root.join(generation);
        if path.exists() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove cache generation {}", generation))?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
