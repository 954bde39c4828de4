//! HTTP submission client for the remote service.
//!
//! This module provides the `SubmitClient`, the production
//! `RecordSubmitter` implementation: it POSTs queued records to the
//! endpoint associated with their collection and maps non-success
//! statuses into `ApiError`.

pub mod client;
pub mod error;

pub use client::SubmitClient;
pub use error::ApiError;
