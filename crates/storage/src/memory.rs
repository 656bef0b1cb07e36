//! In-memory `QuoteStorage` backend.
//!
//! Holds the arena tables behind a mutex. The snapshot is the staged
//! [`UnitOfWork`]; committing takes the lock once, re-checks uniqueness and
//! appends everything, so readers never observe a partial unit.
//!
//! Two test hooks simulate an unhealthy store: [`MemoryStorage::set_available`]
//! turns every call into `StorageError::Unavailable`, and
//! [`MemoryStorage::with_latency`] delays every call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{IdempotencyRecord, QuoteRecord, UnitOfWork};
use crate::table::Tables;
use crate::traits::QuoteStorage;

#[derive(Debug)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
    available: AtomicBool,
    latency: Option<Duration>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            available: AtomicBool::new(true),
            latency: None,
        }
    }

    /// A store that sleeps for `latency` before every operation.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::new()
        }
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    async fn gate(&self) -> Result<(), StorageError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory store is marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl QuoteStorage for MemoryStorage {
    type Snapshot = UnitOfWork;

    async fn begin_snapshot(&self) -> Result<UnitOfWork, StorageError> {
        self.gate().await?;
        Ok(UnitOfWork::default())
    }

    async fn commit_snapshot(&self, snapshot: UnitOfWork) -> Result<(), StorageError> {
        self.gate().await?;
        self.tables()?.commit(snapshot)
    }

    async fn abort_snapshot(&self, _snapshot: UnitOfWork) -> Result<(), StorageError> {
        // Staged writes live only in the snapshot; dropping it is the rollback.
        Ok(())
    }

    async fn insert_quote(
        &self,
        snapshot: &mut UnitOfWork,
        record: QuoteRecord,
    ) -> Result<(), StorageError> {
        self.gate().await?;
        self.tables()?.stage_quote(snapshot, record)
    }

    async fn insert_idempotency_record(
        &self,
        snapshot: &mut UnitOfWork,
        record: IdempotencyRecord,
    ) -> Result<(), StorageError> {
        self.gate().await?;
        self.tables()?.stage_idempotency_record(snapshot, record)
    }

    async fn find_idempotency_record(
        &self,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, StorageError> {
        self.gate().await?;
        Ok(self.tables()?.find_key(key).cloned())
    }

    async fn get_quote(&self, quote_id: &str) -> Result<QuoteRecord, StorageError> {
        self.gate().await?;
        self.tables()?
            .quote(quote_id)
            .cloned()
            .ok_or_else(|| StorageError::QuoteNotFound {
                quote_id: quote_id.to_string(),
            })
    }

    async fn count_quotes(&self) -> Result<usize, StorageError> {
        self.gate().await?;
        Ok(self.tables()?.quote_count())
    }

    async fn count_idempotency_records(&self) -> Result<usize, StorageError> {
        self.gate().await?;
        Ok(self.tables()?.idempotency_count())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.gate().await
    }
}
