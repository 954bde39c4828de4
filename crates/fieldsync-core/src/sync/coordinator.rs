use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::models::OfflineRecord;
use crate::store::{OfflineStore, StoreError};

/// A statically enumerated collection paired with the remote endpoint
/// path that accepts its records. The integrating application supplies
/// the full list; collections are never discovered dynamically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRoute {
    pub collection: String,
    pub endpoint: String,
}

impl CollectionRoute {
    pub fn new(collection: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Remote submission seam.
///
/// Delivery is at-least-once: a failed submission leaves the record
/// pending and the same record will be submitted again on the next
/// drain, so the endpoint behind this trait must deduplicate by the
/// record's stable id.
#[async_trait]
pub trait RecordSubmitter: Send + Sync {
    async fn submit(&self, route: &CollectionRoute, record: &OfflineRecord) -> anyhow::Result<()>;
}

/// Outcome of one drain pass, for logging and status surfaces.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub submitted: u32,
    pub synced: u32,
    pub failed: u32,
}

pub struct SyncCoordinator {
    store: OfflineStore,
    submitter: Arc<dyn RecordSubmitter>,
    routes: Vec<CollectionRoute>,
    draining: AtomicBool,
}

impl SyncCoordinator {
    pub fn new(
        store: OfflineStore,
        submitter: Arc<dyn RecordSubmitter>,
        routes: Vec<CollectionRoute>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            submitter,
            routes,
            draining: AtomicBool::new(false),
        })
    }

    /// One pass over every known collection.
    ///
    /// Returns `Ok(None)` when another drain is already in progress in
    /// this process; the in-memory flag guarantees at most one
    /// concurrent pass per process. Cross-process races with the proxy
    /// worker are tolerated: endpoint idempotency is the safety net.
    pub async fn drain(&self) -> Result<Option<DrainReport>, StoreError> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Drain already in progress, skipping");
            return Ok(None);
        }

        let result = self.drain_collections().await;
        self.draining.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    async fn drain_collections(&self) -> Result<DrainReport, StoreError> {
        let mut report = DrainReport::default();

        for route in &self.routes {
            let pending = self.store.get_pending(&route.collection).await?;
            if pending.is_empty() {
                // Nothing queued: skip without touching the network
                continue;
            }

            info!(
                collection = %route.collection,
                pending = pending.len(),
                "Draining collection"
            );

            for record in &pending {
                report.submitted += 1;
                match self.submitter.submit(route, record).await {
                    Ok(()) => {
                        self.store.mark_synced(&route.collection, &record.id).await?;
                        report.synced += 1;
                        info!(collection = %route.collection, id = %record.id, "Record synced");
                    }
                    Err(e) => {
                        // One record's failure never aborts the batch
                        report.failed += 1;
                        warn!(
                            collection = %route.collection,
                            id = %record.id,
                            error = %e,
                            "Submission failed, record stays pending"
                        );
                    }
                }
            }
        }

        info!(
            submitted = report.submitted,
            synced = report.synced,
            failed = report.failed,
            "Drain pass complete"
        );
        Ok(report)
    }

    /// Wire this coordinator to the connectivity monitor: a transition
    /// to online triggers a drain pass. Explicit `drain()` calls remain
    /// available for manual retry actions; there is no periodic poll.
    pub fn watch_connectivity(self: &Arc<Self>, monitor: &ConnectivityMonitor) {
        let coordinator = Arc::clone(self);
        monitor.subscribe(move |online| {
            if !online {
                return;
            }
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                if let Err(e) = coordinator.drain().await {
                    warn!(error = %e, "Drain after reconnect failed");
                }
            });
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
