use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{IdempotencyRecord, QuoteRecord};

/// The storage trait for quote service backends.
///
/// A `QuoteStorage` implementation provides durable, transactional storage
/// for quotes and the idempotency records that guard their creation.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress unit of work. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a unit of work, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the unit of work
///    OR `abort_snapshot(snapshot)`: roll back and consume it
///
/// If a `Snapshot` is dropped without committing, nothing it staged may
/// become visible. This is what makes a cancelled request leave no trace.
///
/// ## Key Uniqueness
///
/// At most one idempotency record exists per key. `insert_idempotency_record`
/// rejects keys that are already committed, and `commit_snapshot` re-checks
/// every staged key atomically: if a concurrent snapshot committed the same
/// key first, the whole unit of work is rejected with
/// `StorageError::DuplicateKey` and none of it is applied.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait QuoteStorage: Send + Sync + 'static {
    /// The snapshot (unit of work) type used by this storage backend.
    ///
    /// Must be `Send` to allow passing across async task boundaries.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot.
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all staged writes durable and visible at once.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort a snapshot, discarding all staged writes.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Writes (within snapshot) ─────────────────────────────────────────────

    /// Stage a new quote.
    ///
    /// Returns `Err(StorageError::QuoteAlreadyExists)` if the id is taken.
    async fn insert_quote(
        &self,
        snapshot: &mut Self::Snapshot,
        record: QuoteRecord,
    ) -> Result<(), StorageError>;

    /// Stage a new idempotency record.
    ///
    /// Returns `Err(StorageError::DuplicateKey)` if a record for the key is
    /// already committed or staged in this snapshot.
    async fn insert_idempotency_record(
        &self,
        snapshot: &mut Self::Snapshot,
        record: IdempotencyRecord,
    ) -> Result<(), StorageError>;

    // ── Queries (committed state only) ───────────────────────────────────────

    /// Point lookup of an idempotency record by key. Keys are case-sensitive.
    async fn find_idempotency_record(
        &self,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, StorageError>;

    /// Read a quote by id.
    ///
    /// Returns `Err(StorageError::QuoteNotFound)` if it does not exist.
    async fn get_quote(&self, quote_id: &str) -> Result<QuoteRecord, StorageError>;

    /// Number of committed quotes.
    async fn count_quotes(&self) -> Result<usize, StorageError>;

    /// Number of committed idempotency records.
    async fn count_idempotency_records(&self) -> Result<usize, StorageError>;

    /// Cheap liveness check used by `GET /health`.
    async fn ping(&self) -> Result<(), StorageError>;
}
