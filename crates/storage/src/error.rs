/// All errors that can be returned by a QuoteStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An idempotency record with this key already exists, either committed
    /// or staged earlier in the same snapshot. This is the "first writer
    /// wins" signal: the loser of a race receives it from insert or commit.
    #[error("idempotency key already exists: {key}")]
    DuplicateKey { key: String },

    /// A quote with this id already exists.
    #[error("quote already exists: {quote_id}")]
    QuoteAlreadyExists { quote_id: String },

    /// No quote with the given id.
    #[error("quote not found: {quote_id}")]
    QuoteNotFound { quote_id: String },

    /// The backend cannot be reached (connection refused, outage, etc.).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A storage call did not finish within its deadline. Nothing was committed.
    #[error("storage operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// A backend-specific storage error (I/O, serialization, corrupt log, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// True for failures of the store itself, as opposed to constraint
    /// violations reported by a healthy store.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            StorageError::Unavailable(_) | StorageError::Timeout { .. } | StorageError::Backend(_)
        )
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Backend(format!("io: {e}"))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Backend(format!("serialization: {e}"))
    }
}
