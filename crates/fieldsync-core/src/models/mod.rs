//! Data models for locally captured records.
//!
//! - `OfflineRecord`: the unit of deferred work, queued while offline
//! - `SyncStatus`: pending/synced flag, flips exactly once

pub mod record;

pub use record::{OfflineRecord, SyncStatus};
