use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The database could not be opened or migrated. Callers must treat
    /// this as "sync unavailable", not as "nothing pending".
    #[error("Offline store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Query(#[from] sqlx::Error),

    /// A stored row could not be decoded back into a record.
    #[error("Corrupt stored record: {0}")]
    Corrupt(String),
}
