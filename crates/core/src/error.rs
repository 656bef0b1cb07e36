use quotes_storage::StorageError;

/// Failures of the create-quote use case.
///
/// Key reuse with a different payload is not an error; it is reported as
/// [`crate::CreateQuoteOutcome::Conflict`].
#[derive(Debug, thiserror::Error)]
pub enum CreateQuoteError {
    /// The store failed, timed out, or is unreachable.
    #[error(transparent)]
    Store(#[from] StorageError),

    #[error("failed to serialize quote: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),

    /// The store reported a duplicate key but the re-read found no record.
    #[error("idempotency key {key} reported as duplicate but no record was found")]
    UnresolvedRace { key: String },
}

impl CreateQuoteError {
    /// True when the caller should retry later (the dependency is down).
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, CreateQuoteError::Store(e) if e.is_infrastructure())
    }
}
