//! Reconciliation of pending records with the remote service.
//!
//! The `SyncCoordinator` drains every known collection against the
//! remote submission seam whenever connectivity returns or a caller
//! asks for an explicit retry. At most one drain pass runs per process
//! at a time; a record whose submission fails stays pending for the
//! next pass.

pub mod coordinator;

pub use coordinator::{CollectionRoute, DrainReport, RecordSubmitter, SyncCoordinator};
