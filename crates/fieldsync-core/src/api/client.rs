//! HTTP client for submitting queued records to the remote service.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::OfflineRecord;
use crate::sync::{CollectionRoute, RecordSubmitter};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// Field connections are often poor; 30s tolerates slow links while a
/// hung submission still counts as a failure in the same drain pass.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum retries for rate-limited (429) submissions within one pass.
/// Anything left over simply stays pending for the next drain.
const MAX_RATE_LIMIT_RETRIES: u32 = 2;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 500;

/// Wire shape of one submitted record.
/// The remote endpoint deduplicates on `id`, which is what makes the
/// queue's at-least-once delivery safe.
#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    id: &'a str,
    captured_at: DateTime<Utc>,
    payload: &'a Value,
}

/// Submission client for the remote service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct SubmitClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl SubmitClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a client carrying a bearer token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    fn endpoint_url(&self, route: &CollectionRoute) -> String {
        format!("{}{}", self.base_url, route.endpoint)
    }
}

#[async_trait]
impl RecordSubmitter for SubmitClient {
    async fn submit(&self, route: &CollectionRoute, record: &OfflineRecord) -> Result<()> {
        let url = self.endpoint_url(route);
        let body = SubmitBody {
            id: &record.id,
            captured_at: record.captured_at,
            payload: &record.payload,
        };

        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self.client.post(&url).json(&body);
            if let Some(ref token) = self.token {
                request = request.bearer_auth(token);
            }

            // A transport error (timeout included) is a submission failure;
            // the coordinator leaves the record pending.
            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to submit record {} to {}", record.id, url))?;

            let status = response.status();
            if status.is_success() {
                debug!(id = %record.id, url = %url, "Record accepted by remote endpoint");
                return Ok(());
            }

            if status.as_u16() == 429 && retries < MAX_RATE_LIMIT_RETRIES {
                retries += 1;
                warn!(url = %url, retry = retries, backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body).into());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
