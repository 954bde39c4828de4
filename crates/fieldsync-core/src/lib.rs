//! Core library for fieldsync - offline-first synchronization for field data capture.
//!
//! The pieces compose as a pipeline from capture to eventual remote
//! consistency:
//!
//! - [`store`]: durable local queue of captured records, SQLite-backed
//! - [`connectivity`]: single source of truth for network reachability
//! - [`sync`]: drains pending records against the remote service
//! - [`api`]: HTTP client submitting records to collection endpoints
//! - [`config`]: on-disk configuration shared with the proxy worker
//!
//! Delivery to the remote service is at-least-once: a record whose
//! submission fails stays pending and is submitted again on a later
//! drain, so remote endpoints must deduplicate by record id.

pub mod api;
pub mod config;
pub mod connectivity;
pub mod models;
pub mod store;
pub mod sync;
