//! Background network proxy for fieldsync.
//!
//! A long-lived worker process, isolated from the application it
//! serves: the two share the durable queue file and nothing else. The
//! proxy intercepts outgoing HTTP traffic to implement offline
//! behavior:
//!
//! - navigations go network-first with a precached offline fallback
//! - static resources are served cache-first and revalidated behind
//!   the response
//! - live API traffic passes straight through, never cached
//!
//! It also renders push notifications and drains the offline queue
//! when a deferred-retry signal arrives.

pub mod cache;
pub mod fetch;
pub mod lifecycle;
pub mod notify;
pub mod server;
