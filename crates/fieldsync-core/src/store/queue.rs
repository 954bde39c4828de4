//! SQLite-backed implementation of the durable local queue.
//!
//! One database file holds every collection partition plus the
//! settings partition. The application process and the proxy worker
//! both open this file independently; consistency between them rests
//! on SQLite's own atomicity, not on coordination logic here.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::models::{OfflineRecord, SyncStatus};

use super::StoreError;

// ============================================================================
// Constants
// ============================================================================

/// Maximum pooled connections per process.
/// The queue sees one writer and a handful of readers; 5 is plenty.
const MAX_CONNECTIONS: u32 = 5;

/// Current schema version, recorded in `PRAGMA user_version`.
/// Opening an older store applies the missing statements in order.
const SCHEMA_VERSION: i32 = 1;

const CREATE_RECORDS: &str = r#"
CREATE TABLE IF NOT EXISTS offline_records (
    collection  TEXT NOT NULL,
    id          TEXT NOT NULL,
    payload     TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    sync_status TEXT NOT NULL DEFAULT 'pending',
    synced_at   TEXT,
    PRIMARY KEY (collection, id)
)
"#;

/// Index backing `get_pending`: the pending scan must stay an index
/// scan as the queue grows, not a full collection scan.
const CREATE_PENDING_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_offline_records_status
    ON offline_records (collection, sync_status)
"#;

const CREATE_SETTINGS: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

// ============================================================================
// Store
// ============================================================================

/// Handle to the durable queue.
/// Clone is cheap - the underlying pool is reference-counted.
#[derive(Clone)]
pub struct OfflineStore {
    pool: SqlitePool,
}

impl OfflineStore {
    /// Open (creating if missing) and migrate the store at `path`.
    ///
    /// Any failure here surfaces as [`StoreError::Unavailable`]; no
    /// handle exists afterwards, so queue operations cannot silently
    /// no-op against a broken store.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;

        let store = Self { pool };
        store
            .migrate()
            .await
            .map_err(|e| StoreError::Unavailable(format!("schema migration failed: {}", e)))?;

        debug!(path = %path.display(), "Offline store opened");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let row = sqlx::query("PRAGMA user_version").fetch_one(&self.pool).await?;
        let version: i32 = row.try_get(0)?;

        if version < SCHEMA_VERSION {
            sqlx::query(CREATE_RECORDS).execute(&self.pool).await?;
            sqlx::query(CREATE_PENDING_INDEX).execute(&self.pool).await?;
            sqlx::query(CREATE_SETTINGS).execute(&self.pool).await?;
            sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    // ===== Queue operations =====

    /// Insert or overwrite a record, returning its id.
    ///
    /// Re-saving an existing id overwrites the payload only: neither
    /// `captured_at` nor `sync_status` of the stored row is touched, so
    /// an edit-and-resave cannot resurrect a synced record into the
    /// pending set. Completion implies the row is in the database file.
    pub async fn save(&self, record: &OfflineRecord) -> Result<String, StoreError> {
        let payload = serde_json::to_string(&record.payload)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO offline_records (collection, id, payload, captured_at, sync_status)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (collection, id) DO UPDATE SET payload = excluded.payload
            "#,
        )
        .bind(&record.collection)
        .bind(&record.id)
        .bind(&payload)
        .bind(timestamp(record.captured_at))
        .bind(record.sync_status.as_str())
        .execute(&self.pool)
        .await?;

        debug!(collection = %record.collection, id = %record.id, "Saved offline record");
        Ok(record.id.clone())
    }

    /// All records in a collection, oldest capture first.
    pub async fn get_all(&self, collection: &str) -> Result<Vec<OfflineRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT collection, id, payload, captured_at, sync_status
            FROM offline_records
            WHERE collection = ?1
            ORDER BY captured_at ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Records still awaiting remote submission, oldest capture first.
    /// Served by the status index, not a collection scan.
    pub async fn get_pending(&self, collection: &str) -> Result<Vec<OfflineRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT collection, id, payload, captured_at, sync_status
            FROM offline_records
            WHERE collection = ?1 AND sync_status = ?2
            ORDER BY captured_at ASC
            "#,
        )
        .bind(collection)
        .bind(SyncStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Number of records awaiting submission in a collection.
    pub async fn pending_count(&self, collection: &str) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM offline_records WHERE collection = ?1 AND sync_status = ?2",
        )
        .bind(collection)
        .bind(SyncStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    /// Flip a record Pending -> Synced, stamping `synced_at`.
    ///
    /// A record that no longer exists or is already synced is a logged
    /// no-op: a drain replay must never corrupt state or count as a
    /// submission failure.
    pub async fn mark_synced(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE offline_records
            SET sync_status = ?1, synced_at = ?2
            WHERE collection = ?3 AND id = ?4 AND sync_status = ?5
            "#,
        )
        .bind(SyncStatus::Synced.as_str())
        .bind(timestamp(Utc::now()))
        .bind(collection)
        .bind(id)
        .bind(SyncStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(collection, id, "mark_synced matched no pending record");
        }
        Ok(())
    }

    /// Permanently remove a record regardless of status.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM offline_records WHERE collection = ?1 AND id = ?2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Explicit cleanup: drop synced records whose sync predates `older_than`.
    /// Returns the number of rows removed.
    pub async fn purge_synced(
        &self,
        collection: &str,
        older_than: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM offline_records
            WHERE collection = ?1 AND sync_status = ?2 AND synced_at < ?3
            "#,
        )
        .bind(collection)
        .bind(SyncStatus::Synced.as_str())
        .bind(timestamp(older_than))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ===== Settings partition =====

    pub async fn save_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }
}

/// Fixed-width RFC 3339 with microseconds, so lexicographic order in
/// the database matches chronological order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<OfflineRecord, StoreError> {
    let payload: String = row.try_get("payload")?;
    let captured_at: String = row.try_get("captured_at")?;
    let status: String = row.try_get("sync_status")?;

    Ok(OfflineRecord {
        collection: row.try_get("collection")?,
        id: row.try_get("id")?,
        payload: serde_json::from_str(&payload).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        captured_at: DateTime::parse_from_rfc3339(&captured_at)
            .map_err(|e| StoreError::Corrupt(format!("captured_at: {}", e)))?
            .with_timezone(&Utc),
        sync_status: SyncStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown sync_status {:?}", status)))?,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_store() -> (OfflineStore, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = OfflineStore::open(&dir.path().join("queue.db"))
            .await
            .expect("open store");
        (store, dir)
    }

    #[tokio::test]
    async fn test_save_and_get_all_round_trip() {
        let (store, _dir) = open_store().await;
        let record = OfflineRecord::with_id("r1", "daily-report", json!({"crew": 4}));
        store.save(&record).await.unwrap();

        let all = store.get_all("daily-report").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "r1");
        assert_eq!(all[0].payload, json!({"crew": 4}));
        assert!(all[0].is_pending());
    }

    #[tokio::test]
    async fn test_get_pending_filters_and_orders_by_capture() {
        let (store, _dir) = open_store().await;

        let mut first = OfflineRecord::with_id("r1", "daily-report", json!({}));
        first.captured_at = Utc::now() - Duration::minutes(5);
        let second = OfflineRecord::with_id("r2", "daily-report", json!({}));

        // Insert newest first to prove ordering comes from captured_at
        store.save(&second).await.unwrap();
        store.save(&first).await.unwrap();
        store.mark_synced("daily-report", "r2").await.unwrap();

        let pending = store.get_pending("daily-report").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "r1");

        let all = store.get_all("daily-report").await.unwrap();
        assert_eq!(all[0].id, "r1");
        assert_eq!(all[1].id, "r2");
    }

    #[tokio::test]
    async fn test_resave_overwrites_payload_but_not_status() {
        let (store, _dir) = open_store().await;
        let record = OfflineRecord::with_id("r1", "daily-report", json!({"rev": 1}));
        store.save(&record).await.unwrap();
        store.mark_synced("daily-report", "r1").await.unwrap();

        // A re-save from a caller still holding a Pending copy
        let edited = OfflineRecord::with_id("r1", "daily-report", json!({"rev": 2}));
        store.save(&edited).await.unwrap();

        let all = store.get_all("daily-report").await.unwrap();
        assert_eq!(all[0].payload, json!({"rev": 2}));
        assert_eq!(all[0].sync_status, SyncStatus::Synced);
        assert!(store.get_pending("daily-report").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_synced_is_one_way_and_replay_safe() {
        let (store, _dir) = open_store().await;
        let record = OfflineRecord::with_id("r1", "daily-report", json!({}));
        store.save(&record).await.unwrap();

        store.mark_synced("daily-report", "r1").await.unwrap();
        // Replay and unknown-id calls are no-ops, not errors
        store.mark_synced("daily-report", "r1").await.unwrap();
        store.mark_synced("daily-report", "ghost").await.unwrap();

        assert_eq!(store.pending_count("daily-report").await.unwrap(), 0);
        assert_eq!(store.get_all("daily-report").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_regardless_of_status() {
        let (store, _dir) = open_store().await;
        store
            .save(&OfflineRecord::with_id("r1", "daily-report", json!({})))
            .await
            .unwrap();
        store.mark_synced("daily-report", "r1").await.unwrap();
        store.delete("daily-report", "r1").await.unwrap();

        assert!(store.get_all("daily-report").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collections_are_separate_partitions() {
        let (store, _dir) = open_store().await;
        store
            .save(&OfflineRecord::with_id("r1", "daily-report", json!({})))
            .await
            .unwrap();
        store
            .save(&OfflineRecord::with_id("r1", "safety-inspection", json!({})))
            .await
            .unwrap();

        assert_eq!(store.get_pending("daily-report").await.unwrap().len(), 1);
        assert_eq!(store.get_pending("safety-inspection").await.unwrap().len(), 1);

        store.mark_synced("daily-report", "r1").await.unwrap();
        assert_eq!(store.pending_count("daily-report").await.unwrap(), 0);
        assert_eq!(store.pending_count("safety-inspection").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_synced_spares_pending_and_recent() {
        let (store, _dir) = open_store().await;
        store
            .save(&OfflineRecord::with_id("old", "daily-report", json!({})))
            .await
            .unwrap();
        store
            .save(&OfflineRecord::with_id("keep", "daily-report", json!({})))
            .await
            .unwrap();
        store.mark_synced("daily-report", "old").await.unwrap();

        let purged = store
            .purge_synced("daily-report", Utc::now() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);

        let remaining = store.get_all("daily-report").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "keep");
    }

    #[tokio::test]
    async fn test_settings_partition_is_independent() {
        let (store, _dir) = open_store().await;
        assert_eq!(store.get_setting("site").await.unwrap(), None);

        store.save_setting("site", "north-yard").await.unwrap();
        store.save_setting("site", "south-yard").await.unwrap();
        assert_eq!(
            store.get_setting("site").await.unwrap().as_deref(),
            Some("south-yard")
        );

        // Settings live outside the record partitions entirely
        assert!(store.get_all("site").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_failure_is_distinguishable() {
        let dir = tempfile::tempdir().unwrap();
        let bad_path = dir.path().join("missing").join("nested").join("queue.db");

        let result = OfflineStore::open(&bad_path).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        {
            let store = OfflineStore::open(&path).await.unwrap();
            store
                .save(&OfflineRecord::with_id("r1", "daily-report", json!({"n": 1})))
                .await
                .unwrap();
        }

        let store = OfflineStore::open(&path).await.unwrap();
        let all = store.get_all("daily-report").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "r1");
    }
}
