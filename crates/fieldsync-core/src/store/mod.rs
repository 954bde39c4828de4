//! Durable local queue for offline records.
//!
//! This module provides the `OfflineStore`: crash-resistant, typed
//! storage of captured records with indexed retrieval by sync status,
//! plus a small settings partition for device-level configuration.
//!
//! The store is append-mostly: the sync process marks records synced,
//! it never deletes them. Removal happens only through explicit
//! `delete`/`purge_synced` calls.

pub mod error;
pub mod queue;

pub use error::StoreError;
pub use queue::OfflineStore;
