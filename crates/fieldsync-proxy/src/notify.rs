//! Push notification dispatch.
//!
//! Push payloads arrive from the platform while the proxy is active.
//! Parsing is defensive: a malformed or empty payload degrades to the
//! default notification rather than failing, so a bad payload is never
//! user-visible as an error. A click focuses an existing client view
//! already showing the target URL, or opens a new one.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Constants
// ============================================================================

/// Defaults substituted for missing or malformed payload fields
const DEFAULT_TITLE: &str = "Fieldsync";
const DEFAULT_BODY: &str = "You have new activity.";
const DEFAULT_ICON: &str = "/icons/icon-192.png";
const DEFAULT_BADGE: &str = "/icons/badge-72.png";
const DEFAULT_URL: &str = "/";

/// Raw push payload as delivered by the platform. Every field is
/// optional; see the defaults above.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub data: PushData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PushData {
    pub url: Option<String>,
}

impl PushPayload {
    /// Parse a raw payload, substituting the default notification for
    /// malformed JSON.
    pub fn parse(raw: &[u8]) -> Self {
        match serde_json::from_slice(raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Malformed push payload, using defaults");
                Self::default()
            }
        }
    }
}

/// A rendered, user-visible notification carrying a target URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub url: String,
}

impl From<PushPayload> for Notification {
    fn from(payload: PushPayload) -> Self {
        Self {
            title: payload.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: payload.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            icon: payload.icon.unwrap_or_else(|| DEFAULT_ICON.to_string()),
            badge: payload.badge.unwrap_or_else(|| DEFAULT_BADGE.to_string()),
            url: payload.data.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
        }
    }
}

/// Client views the dispatcher can focus or open. The production
/// implementation talks to whatever window system hosts the
/// application; tests substitute a fake.
#[async_trait]
pub trait ClientViews: Send + Sync {
    /// URLs of the currently open views.
    async fn open_urls(&self) -> Vec<String>;
    async fn focus(&self, url: &str) -> anyhow::Result<()>;
    async fn open(&self, url: &str) -> anyhow::Result<()>;
}

/// Fallback view handler for headless deployments: clicks are logged
/// and otherwise ignored.
pub struct LoggingViews;

#[async_trait]
impl ClientViews for LoggingViews {
    async fn open_urls(&self) -> Vec<String> {
        Vec::new()
    }

    async fn focus(&self, url: &str) -> anyhow::Result<()> {
        info!(url, "Would focus existing view");
        Ok(())
    }

    async fn open(&self, url: &str) -> anyhow::Result<()> {
        info!(url, "Would open new view");
        Ok(())
    }
}

pub struct NotificationDispatcher {
    views: Arc<dyn ClientViews>,
}

impl NotificationDispatcher {
    pub fn new(views: Arc<dyn ClientViews>) -> Self {
        Self { views }
    }

    /// Render the notification for a received push payload.
    pub fn dispatch(&self, raw: &[u8]) -> Notification {
        let notification = Notification::from(PushPayload::parse(raw));
        info!(
            title = %notification.title,
            url = %notification.url,
            "Showing notification"
        );
        notification
    }

    /// Focus an existing view already showing the target URL, else open
    /// a new one.
    pub async fn handle_click(&self, url: &str) -> anyhow::Result<()> {
        let open = self.views.open_urls().await;
        if open.iter().any(|candidate| candidate == url) {
            self.views.focus(url).await
        } else {
            self.views.open(url).await
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeViews {
        urls: Vec<String>,
        focused: Mutex<Vec<String>>,
        opened: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ClientViews for FakeViews {
        async fn open_urls(&self) -> Vec<String> {
            self.urls.clone()
        }

        async fn focus(&self, url: &str) -> anyhow::Result<()> {
            self.focused.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn open(&self, url: &str) -> anyhow::Result<()> {
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_full_payload_renders_verbatim() {
        let raw = br#"{
            "title": "Inspection due",
            "body": "Crane inspection expires today",
            "icon": "/icons/crane.png",
            "badge": "/icons/badge.png",
            "data": {"url": "/safety-inspections/18"}
        }"#;
        let notification = Notification::from(PushPayload::parse(raw));
        assert_eq!(notification.title, "Inspection due");
        assert_eq!(notification.url, "/safety-inspections/18");
    }

    #[test]
    fn test_malformed_payload_falls_back_to_defaults() {
        for raw in [&b"not json at all"[..], &b""[..], &br#"{"data": 42}"#[..]] {
            let notification = Notification::from(PushPayload::parse(raw));
            assert_eq!(notification.title, DEFAULT_TITLE);
            assert_eq!(notification.body, DEFAULT_BODY);
            assert_eq!(notification.url, DEFAULT_URL);
        }
    }

    #[test]
    fn test_partial_payload_keeps_what_it_can() {
        let raw = br#"{"title": "Shift report filed"}"#;
        let notification = Notification::from(PushPayload::parse(raw));
        assert_eq!(notification.title, "Shift report filed");
        assert_eq!(notification.body, DEFAULT_BODY);
    }

    #[tokio::test]
    async fn test_click_focuses_existing_view() {
        let views = Arc::new(FakeViews {
            urls: vec!["/safety-inspections/18".to_string()],
            ..FakeViews::default()
        });
        let dispatcher = NotificationDispatcher::new(Arc::clone(&views) as Arc<dyn ClientViews>);

        let notification =
            dispatcher.dispatch(br#"{"data": {"url": "/safety-inspections/18"}}"#);
        dispatcher.handle_click(&notification.url).await.unwrap();

        assert_eq!(views.focused.lock().unwrap().as_slice(), ["/safety-inspections/18"]);
        assert!(views.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_click_opens_new_view_when_absent() {
        let views = Arc::new(FakeViews::default());
        let dispatcher = NotificationDispatcher::new(Arc::clone(&views) as Arc<dyn ClientViews>);

        let notification = dispatcher.dispatch(br#"{"data": {"url": "/jobs/7"}}"#);
        dispatcher.handle_click(&notification.url).await.unwrap();

        assert!(views.focused.lock().unwrap().is_empty());
        assert_eq!(views.opened.lock().unwrap().as_slice(), ["/jobs/7"]);
    }
}
