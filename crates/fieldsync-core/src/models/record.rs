use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Synchronization state of a locally captured record.
///
/// Starts at `Pending` and transitions to `Synced` exactly once, on
/// confirmed remote acceptance. It never reverts: a synced record is
/// never re-submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
}

impl SyncStatus {
    /// Stable string form used in the durable store.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "synced" => Some(SyncStatus::Synced),
            _ => None,
        }
    }
}

/// A domain record captured while offline, queued for remote submission.
///
/// `id` is stable for the record's lifetime and uniquely identifies it
/// within its collection; the remote endpoint deduplicates on it.
/// `captured_at` is set at capture time and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineRecord {
    pub id: String,
    pub collection: String,
    pub payload: Value,
    pub captured_at: DateTime<Utc>,
    pub sync_status: SyncStatus,
}

impl OfflineRecord {
    /// Capture a new record with a generated id.
    pub fn new(collection: impl Into<String>, payload: Value) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), collection, payload)
    }

    /// Capture a new record with a caller-supplied id.
    pub fn with_id(id: impl Into<String>, collection: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            payload,
            captured_at: Utc::now(),
            sync_status: SyncStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.sync_status == SyncStatus::Pending
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_starts_pending_with_generated_id() {
        let record = OfflineRecord::new("daily-report", json!({"note": "poured footings"}));
        assert!(record.is_pending());
        assert_eq!(record.collection, "daily-report");
        // Generated ids are uuids: 36 chars with dashes
        assert_eq!(record.id.len(), 36);
    }

    #[test]
    fn test_with_id_keeps_caller_id() {
        let record = OfflineRecord::with_id("r1", "safety-inspection", json!({}));
        assert_eq!(record.id, "r1");
    }

    #[test]
    fn test_sync_status_round_trips_through_store_form() {
        assert_eq!(SyncStatus::parse(SyncStatus::Pending.as_str()), Some(SyncStatus::Pending));
        assert_eq!(SyncStatus::parse(SyncStatus::Synced.as_str()), Some(SyncStatus::Synced));
        assert_eq!(SyncStatus::parse("deleted"), None);
    }
}
