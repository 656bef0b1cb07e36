//! End-to-end tests for the create-quote orchestrator against the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Barrier;

use quotes_core::{
    CreateQuoteCommand, CreateQuoteHandler, CreateQuoteOutcome, CreateQuoteRequest,
    IdempotencyKey, IdempotencyStatus, QuoteMetrics,
};
use quotes_storage::{
    IdempotencyRecord, MemoryStorage, QuoteRecord, QuoteStorage, StorageError, UnitOfWork,
};

fn command(key: &str, document_id: &str, amount: i64, currency: &str) -> CreateQuoteCommand {
    CreateQuoteCommand {
        idempotency_key: IdempotencyKey::parse(key).expect("valid key"),
        request: CreateQuoteRequest {
            document_id: document_id.to_string(),
            amount: Decimal::new(amount, 0),
            currency: currency.to_string(),
        },
    }
}

#[derive(Default)]
struct CountingMetrics {
    created: AtomicUsize,
    replayed: AtomicUsize,
    conflicts: AtomicUsize,
}

impl QuoteMetrics for CountingMetrics {
    fn quote_created(&self) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }
    fn idempotency_replayed(&self) {
        self.replayed.fetch_add(1, Ordering::SeqCst);
    }
    fn idempotency_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Memory store with scripted misbehaviour around the decision path.
struct ScriptedStorage {
    inner: MemoryStorage,
    barrier: Barrier,
    parties: usize,
    lookups: AtomicUsize,
    stuck_abort: bool,
}

impl ScriptedStorage {
    /// Holds the first `parties` key lookups at a barrier until all of them
    /// have read the store, so every racer sees the key as absent and proceeds.
    fn racing(parties: usize) -> Self {
        Self {
            inner: MemoryStorage::new(),
            barrier: Barrier::new(parties),
            parties,
            lookups: AtomicUsize::new(0),
            stuck_abort: false,
        }
    }

    /// Fails every quote insert and never finishes an abort.
    fn stuck_on_abort() -> Self {
        Self {
            stuck_abort: true,
            ..Self::racing(0)
        }
    }
}

#[async_trait]
impl QuoteStorage for ScriptedStorage {
    type Snapshot = UnitOfWork;

    async fn begin_snapshot(&self) -> Result<UnitOfWork, StorageError> {
        self.inner.begin_snapshot().await
    }

    async fn commit_snapshot(&self, snapshot: UnitOfWork) -> Result<(), StorageError> {
        self.inner.commit_snapshot(snapshot).await
    }

    async fn abort_snapshot(&self, snapshot: UnitOfWork) -> Result<(), StorageError> {
        if self.stuck_abort {
            std::future::pending::<()>().await;
        }
        self.inner.abort_snapshot(snapshot).await
    }

    async fn insert_quote(
        &self,
        snapshot: &mut UnitOfWork,
        record: QuoteRecord,
    ) -> Result<(), StorageError> {
        if self.stuck_abort {
            return Err(StorageError::Unavailable("insert rejected".to_string()));
        }
        self.inner.insert_quote(snapshot, record).await
    }

    async fn insert_idempotency_record(
        &self,
        snapshot: &mut UnitOfWork,
        record: IdempotencyRecord,
    ) -> Result<(), StorageError> {
        self.inner.insert_idempotency_record(snapshot, record).await
    }

    async fn find_idempotency_record(
        &self,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, StorageError> {
        let found = self.inner.find_idempotency_record(key).await;
        if self.lookups.fetch_add(1, Ordering::SeqCst) < self.parties {
            self.barrier.wait().await;
        }
        found
    }

    async fn get_quote(&self, quote_id: &str) -> Result<QuoteRecord, StorageError> {
        self.inner.get_quote(quote_id).await
    }

    async fn count_quotes(&self) -> Result<usize, StorageError> {
        self.inner.count_quotes().await
    }

    async fn count_idempotency_records(&self) -> Result<usize, StorageError> {
        self.inner.count_idempotency_records().await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.inner.ping().await
    }
}

#[tokio::test]
async fn identical_retry_replays_original_quote() {
    let storage = Arc::new(MemoryStorage::new());
    let metrics = Arc::new(CountingMetrics::default());
    let handler = CreateQuoteHandler::new(storage.clone()).with_metrics(metrics.clone());
    let cmd = command("idem-123", "DOC-3", 30, "clp");

    let first = handler.create(&cmd).await.expect("first create");
    let second = handler.create(&cmd).await.expect("second create");

    assert_eq!(first.idempotency_status(), Some(IdempotencyStatus::Created));
    assert_eq!(second.idempotency_status(), Some(IdempotencyStatus::Replayed));

    let first = first.response().expect("first response").clone();
    let second = second.response().expect("second response").clone();
    assert_eq!(first.status, 201);
    assert_eq!(second.status, 201);
    // Byte-for-byte replay.
    assert_eq!(first.body, second.body);

    let quote = first.quote().expect("quote body");
    assert_eq!(quote.currency, "CLP");
    assert_eq!(quote.document_id, "DOC-3");
    assert_eq!(quote.amount, Decimal::new(30, 0));
    assert_eq!(second.quote().unwrap().id, quote.id);
    assert_eq!(second.quote().unwrap().created_at, quote.created_at);

    assert_eq!(storage.count_quotes().await.unwrap(), 1);
    assert_eq!(storage.count_idempotency_records().await.unwrap(), 1);
    assert_eq!(storage.get_quote(&quote.id).await.unwrap().currency, "CLP");

    assert_eq!(metrics.created.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.replayed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reused_key_with_different_amount_conflicts() {
    let storage = Arc::new(MemoryStorage::new());
    let metrics = Arc::new(CountingMetrics::default());
    let handler = CreateQuoteHandler::new(storage.clone()).with_metrics(metrics.clone());

    let first = handler
        .create(&command("idem-456", "DOC-4", 40, "clp"))
        .await
        .unwrap();
    let second = handler
        .create(&command("idem-456", "DOC-4", 41, "clp"))
        .await
        .unwrap();

    assert!(matches!(first, CreateQuoteOutcome::Created(_)));
    assert_eq!(second, CreateQuoteOutcome::Conflict);
    assert!(second.response().is_none());

    let record = storage
        .find_idempotency_record("idem-456")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Some(&record.result_body), first.response().map(|r| &r.body));
    assert_eq!(storage.count_quotes().await.unwrap(), 1);
    assert_eq!(storage.count_idempotency_records().await.unwrap(), 1);
    assert_eq!(metrics.conflicts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_keys_create_distinct_quotes() {
    let storage = Arc::new(MemoryStorage::new());
    let handler = CreateQuoteHandler::new(storage.clone());

    let a = handler
        .create(&command("key-a", "DOC-1", 10, "usd"))
        .await
        .unwrap();
    let b = handler
        .create(&command("key-b", "DOC-1", 10, "usd"))
        .await
        .unwrap();

    let a = a.response().unwrap().quote().unwrap();
    let b = b.response().unwrap().quote().unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(storage.count_quotes().await.unwrap(), 2);
}

#[tokio::test]
async fn keys_differing_only_in_case_are_distinct() {
    let storage = Arc::new(MemoryStorage::new());
    let handler = CreateQuoteHandler::new(storage.clone());

    handler
        .create(&command("Idem-1", "DOC-1", 10, "usd"))
        .await
        .unwrap();
    let other = handler
        .create(&command("idem-1", "DOC-1", 99, "usd"))
        .await
        .unwrap();

    assert!(matches!(other, CreateQuoteOutcome::Created(_)));
    assert_eq!(storage.count_quotes().await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_first_requests_create_exactly_one_quote() {
    const N: usize = 8;
    let storage = Arc::new(ScriptedStorage::racing(N));
    let metrics = Arc::new(CountingMetrics::default());
    let handler = Arc::new(CreateQuoteHandler::new(storage.clone()).with_metrics(metrics.clone()));
    let cmd = command("idem-race", "DOC-9", 500, "clp");

    let mut handles = Vec::new();
    for _ in 0..N {
        let handler = handler.clone();
        let cmd = cmd.clone();
        handles.push(tokio::spawn(async move { handler.create(&cmd).await }));
    }

    let mut ids = Vec::new();
    let mut created = 0;
    for handle in handles {
        let outcome = handle.await.expect("task panic").expect("create failed");
        if matches!(outcome, CreateQuoteOutcome::Created(_)) {
            created += 1;
        }
        ids.push(outcome.response().expect("response").quote().unwrap().id);
    }

    assert_eq!(created, 1, "exactly one racer creates the quote");
    assert!(ids.iter().all(|id| id == &ids[0]), "ids diverged: {ids:?}");
    assert_eq!(storage.count_quotes().await.unwrap(), 1);
    assert_eq!(storage.count_idempotency_records().await.unwrap(), 1);
    assert_eq!(metrics.created.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.replayed.load(Ordering::SeqCst), N - 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn race_loser_with_different_payload_sees_conflict() {
    let storage = Arc::new(ScriptedStorage::racing(2));
    let handler = Arc::new(CreateQuoteHandler::new(storage.clone()));

    let mut handles = Vec::new();
    for amount in [40, 41] {
        let handler = handler.clone();
        let cmd = command("idem-split", "DOC-4", amount, "clp");
        handles.push(tokio::spawn(async move { handler.create(&cmd).await }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("task panic").expect("create failed"));
    }

    let created = outcomes
        .iter()
        .filter(|o| matches!(o, CreateQuoteOutcome::Created(_)))
        .count();
    let conflicts = outcomes
        .iter()
        .filter(|o| **o == CreateQuoteOutcome::Conflict)
        .count();
    assert_eq!((created, conflicts), (1, 1));
    assert_eq!(storage.count_quotes().await.unwrap(), 1);
}

#[tokio::test]
async fn unavailable_store_surfaces_infrastructure_error() {
    let storage = Arc::new(MemoryStorage::new());
    let metrics = Arc::new(CountingMetrics::default());
    let handler = CreateQuoteHandler::new(storage.clone()).with_metrics(metrics.clone());
    storage.set_available(false);

    let err = handler
        .create(&command("idem-down", "DOC-1", 10, "usd"))
        .await
        .unwrap_err();
    assert!(err.is_store_unavailable(), "unexpected error: {err}");

    storage.set_available(true);
    assert_eq!(storage.count_quotes().await.unwrap(), 0);
    assert_eq!(metrics.created.load(Ordering::SeqCst), 0);
    assert_eq!(metrics.conflicts.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn hung_abort_after_failed_insert_is_bounded() {
    let storage = Arc::new(ScriptedStorage::stuck_on_abort());
    let handler = CreateQuoteHandler::new(storage.clone())
        .with_store_timeout(std::time::Duration::from_secs(1));

    let err = handler
        .create(&command("idem-abort", "DOC-1", 10, "clp"))
        .await
        .expect_err("insert failure should surface");

    assert!(err.is_store_unavailable(), "unexpected error: {err}");
    assert_eq!(storage.count_quotes().await.unwrap(), 0);
}
