//! The create-quote use case.
//!
//! 1. Fingerprint the raw request.
//! 2. Decide against the idempotency store.
//! 3. Conflict → report it, write nothing.
//! 4. Replay → return the stored status and body unchanged.
//! 5. Proceed → in one snapshot, insert the quote and the idempotency record
//!    holding the serialized response; commit.
//!
//! Two first-time requests for the same key can both reach step 5. The
//! store's key uniqueness lets exactly one commit through; the other gets
//! `StorageError::DuplicateKey`, re-reads the store, and answers with the
//! winner's outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use quotes_storage::{IdempotencyRecord, QuoteRecord, QuoteStorage, StorageError};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::decision::{decide_for_key, Decision};
use crate::error::CreateQuoteError;
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::metrics::{NoopMetrics, QuoteMetrics};
use crate::quote::{
    normalize_currency, normalize_document_id, CreateQuoteCommand, QuoteResponse,
    QUOTE_STATUS_ISSUED,
};

/// Stable code reported when a key is reused with a different payload.
pub const IDEMPOTENCY_KEY_REUSE_CONFLICT: &str = "IDEMPOTENCY_KEY_REUSE_CONFLICT";
pub const IDEMPOTENCY_KEY_REUSE_MESSAGE: &str =
    "Idempotency-Key was already used with a different request payload.";

/// Status stored for, and replayed to, every successful creation.
pub const CREATED_STATUS: u16 = 201;

/// Default bound for each individual store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// A status code and the exact response body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub body: String,
}

impl StoredResponse {
    pub fn quote(&self) -> Result<QuoteResponse, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    Created,
    Replayed,
}

impl IdempotencyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IdempotencyStatus::Created => "created",
            IdempotencyStatus::Replayed => "replayed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateQuoteOutcome {
    /// This call created the quote.
    Created(StoredResponse),
    /// An earlier call with the same key and payload created it.
    Replayed(StoredResponse),
    /// The key was already used with a different payload.
    Conflict,
}

impl CreateQuoteOutcome {
    pub fn response(&self) -> Option<&StoredResponse> {
        match self {
            CreateQuoteOutcome::Created(r) | CreateQuoteOutcome::Replayed(r) => Some(r),
            CreateQuoteOutcome::Conflict => None,
        }
    }

    pub fn idempotency_status(&self) -> Option<IdempotencyStatus> {
        match self {
            CreateQuoteOutcome::Created(_) => Some(IdempotencyStatus::Created),
            CreateQuoteOutcome::Replayed(_) => Some(IdempotencyStatus::Replayed),
            CreateQuoteOutcome::Conflict => None,
        }
    }
}

pub struct CreateQuoteHandler<S> {
    storage: Arc<S>,
    metrics: Arc<dyn QuoteMetrics>,
    store_timeout: Duration,
}

impl<S: QuoteStorage> CreateQuoteHandler<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            metrics: Arc::new(NoopMetrics),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn QuoteMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub async fn create(
        &self,
        command: &CreateQuoteCommand,
    ) -> Result<CreateQuoteOutcome, CreateQuoteError> {
        let key = command.idempotency_key.as_str();
        let fingerprint = fingerprint(&command.request)?;

        let outcome = match self.decide(key, &fingerprint).await? {
            Decision::Proceed => match self.execute(command, &fingerprint).await {
                Ok(response) => CreateQuoteOutcome::Created(response),
                Err(CreateQuoteError::Store(StorageError::DuplicateKey { .. })) => {
                    tracing::debug!(key, "lost idempotency race, re-reading stored outcome");
                    match self.decide(key, &fingerprint).await? {
                        Decision::Replay { status, body } => {
                            CreateQuoteOutcome::Replayed(StoredResponse { status, body })
                        }
                        Decision::Conflict => CreateQuoteOutcome::Conflict,
                        Decision::Proceed => {
                            return Err(CreateQuoteError::UnresolvedRace {
                                key: key.to_string(),
                            })
                        }
                    }
                }
                Err(e) => return Err(e),
            },
            Decision::Replay { status, body } => {
                CreateQuoteOutcome::Replayed(StoredResponse { status, body })
            }
            Decision::Conflict => CreateQuoteOutcome::Conflict,
        };

        match &outcome {
            CreateQuoteOutcome::Created(_) => self.metrics.quote_created(),
            CreateQuoteOutcome::Replayed(_) => {
                tracing::info!(key, "replaying stored quote outcome");
                self.metrics.idempotency_replayed();
            }
            CreateQuoteOutcome::Conflict => {
                tracing::info!(key, %fingerprint, "idempotency key reused with a different payload");
                self.metrics.idempotency_conflict();
            }
        }
        Ok(outcome)
    }

    async fn decide(&self, key: &str, fingerprint: &Fingerprint) -> Result<Decision, StorageError> {
        self.bounded(decide_for_key(self.storage.as_ref(), key, fingerprint))
            .await
    }

    /// Create the quote and its idempotency record in one snapshot.
    async fn execute(
        &self,
        command: &CreateQuoteCommand,
        fingerprint: &Fingerprint,
    ) -> Result<StoredResponse, CreateQuoteError> {
        let created_at = time::OffsetDateTime::now_utc().format(&Rfc3339)?;
        let quote = QuoteRecord {
            id: Uuid::new_v4().to_string(),
            document_id: normalize_document_id(&command.request.document_id),
            amount: command.request.amount,
            currency: normalize_currency(&command.request.currency),
            status: QUOTE_STATUS_ISSUED.to_string(),
            created_at,
        };
        let body = serde_json::to_string(&QuoteResponse::from(&quote))?;
        let record = IdempotencyRecord {
            key: command.idempotency_key.as_str().to_string(),
            request_fingerprint: fingerprint.as_str().to_string(),
            result_status: CREATED_STATUS,
            result_body: body.clone(),
            quote_id: quote.id.clone(),
            created_at: quote.created_at.clone(),
        };
        let quote_id = quote.id.clone();

        let mut snapshot = self.bounded(self.storage.begin_snapshot()).await?;
        let staged = async {
            self.bounded(self.storage.insert_quote(&mut snapshot, quote))
                .await?;
            self.bounded(self.storage.insert_idempotency_record(&mut snapshot, record))
                .await
        }
        .await;
        if let Err(e) = staged {
            if let Err(abort) = self.bounded(self.storage.abort_snapshot(snapshot)).await {
                tracing::warn!(error = %abort, "failed to abort quote snapshot");
            }
            return Err(e.into());
        }
        self.bounded(self.storage.commit_snapshot(snapshot)).await?;

        tracing::info!(
            key = command.idempotency_key.as_str(),
            quote_id = %quote_id,
            "quote created"
        );
        Ok(StoredResponse {
            status: CREATED_STATUS,
            body,
        })
    }

    /// Run a store call under the configured timeout. A call that times out
    /// is dropped, so a snapshot it was committing is never applied.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => {
                if let Err(e) = &result {
                    if e.is_infrastructure() {
                        tracing::warn!(error = %e, "quote store call failed");
                    }
                }
                result
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "quote store call timed out"
                );
                Err(StorageError::Timeout {
                    elapsed_ms: self.store_timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use quotes_storage::MemoryStorage;

    use super::*;
    use crate::quote::{CreateQuoteRequest, IdempotencyKey};

    fn command(key: &str, amount: i64, currency: &str) -> CreateQuoteCommand {
        CreateQuoteCommand {
            idempotency_key: IdempotencyKey::parse(key).unwrap(),
            request: CreateQuoteRequest {
                document_id: " DOC-U1 ".to_string(),
                amount: Decimal::new(amount, 0),
                currency: currency.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn first_call_normalizes_and_stores_exact_body() {
        let storage = Arc::new(MemoryStorage::new());
        let handler = CreateQuoteHandler::new(storage.clone());

        let outcome = handler.create(&command("key-u1", 99, " clp")).await.unwrap();
        let response = match outcome {
            CreateQuoteOutcome::Created(response) => response,
            other => panic!("expected Created, got {other:?}"),
        };
        assert_eq!(response.status, 201);

        let quote = response.quote().unwrap();
        assert_eq!(quote.currency, "CLP");
        assert_eq!(quote.document_id, "DOC-U1");
        assert_eq!(quote.status, QUOTE_STATUS_ISSUED);

        let record = storage
            .find_idempotency_record("key-u1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.result_body, response.body);
        assert_eq!(record.quote_id, quote.id);
        assert_eq!(
            record.request_fingerprint,
            fingerprint(&command("key-u1", 99, " clp").request)
                .unwrap()
                .as_str()
        );
    }

    #[tokio::test]
    async fn replay_ignores_current_normalization() {
        let storage = Arc::new(MemoryStorage::new());
        let handler = CreateQuoteHandler::new(storage.clone());

        handler.create(&command("key-u2", 10, "usd")).await.unwrap();
        // Normalizes to the same quote, but the raw payload differs.
        let outcome = handler.create(&command("key-u2", 10, "USD")).await.unwrap();
        assert_eq!(outcome, CreateQuoteOutcome::Conflict);
        assert_eq!(storage.count_quotes().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out_without_writing() {
        let storage = Arc::new(MemoryStorage::with_latency(Duration::from_secs(10)));
        let handler =
            CreateQuoteHandler::new(storage.clone()).with_store_timeout(Duration::from_secs(1));

        let err = handler
            .create(&command("key-slow", 10, "usd"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CreateQuoteError::Store(StorageError::Timeout { elapsed_ms: 1000 })
        ));
        assert!(err.is_store_unavailable());
        assert_eq!(storage.count_quotes().await.unwrap(), 0);
    }
}
