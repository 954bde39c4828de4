//! Connectivity monitoring.
//!
//! Single source of truth for "is the network currently reachable".
//! This is a thin observer over a platform-reported signal, not a
//! prober: it never tests reachability against the remote service.
//!
//! Subscribers are notified once per actual transition. Delivery is
//! fire-and-forget on a spawned task per callback, so a slow subscriber
//! cannot block the monitor or its peers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

type Callback = Arc<dyn Fn(bool) + Send + Sync>;

pub struct ConnectivityMonitor {
    online: AtomicBool,
    subscribers: RwLock<Vec<Callback>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(initially_online),
            subscribers: RwLock::new(Vec::new()),
        })
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Register a callback invoked with the new state, once per actual
    /// transition.
    pub fn subscribe(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(callback));
    }

    /// Ingest the platform signal. Re-reporting the current state does
    /// not notify anyone. Must be called from within a Tokio runtime.
    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return;
        }

        debug!(online, "Connectivity transition");
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for callback in subscribers.iter() {
            let callback = Arc::clone(callback);
            tokio::spawn(async move {
                callback(online);
            });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
