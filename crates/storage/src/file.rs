//! Durable `QuoteStorage` backend: arena tables plus an append-only log.
//!
//! Every committed unit of work is one log line:
//!
//! ```text
//! <sha256 hex of json> <json UnitOfWork>\n
//! ```
//!
//! The line is written and synced before the in-memory tables change, so a
//! unit is either fully in the log or absent. On open the log is replayed
//! until the first line that is incomplete, fails its checksum, or does not
//! parse; everything from there on is truncated away.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::StorageError;
use crate::record::{IdempotencyRecord, QuoteRecord, UnitOfWork};
use crate::table::Tables;
use crate::traits::QuoteStorage;

/// What [`FileStorage::open`] found in the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Units of work replayed into the tables.
    pub entries_recovered: usize,
    /// Bytes of torn or corrupt tail removed from the log.
    pub discarded_bytes: u64,
}

#[derive(Debug)]
struct LogState {
    tables: Tables,
    log: File,
    /// Length of the valid prefix of the log.
    len: u64,
    /// Set when a failed append could not be rolled back. The log may end in
    /// a torn line, so every call fails until the store is reopened.
    failed: Option<String>,
}

impl LogState {
    fn usable(&self) -> Result<(), StorageError> {
        match &self.failed {
            Some(reason) => Err(StorageError::Unavailable(format!(
                "quote log needs recovery: {reason}"
            ))),
            None => Ok(()),
        }
    }

    /// Check, append and sync, then apply. The tables change only after the
    /// entry is durable.
    fn commit(&mut self, unit: UnitOfWork) -> Result<(), StorageError> {
        self.tables.check(&unit)?;

        let line = encode_entry(&unit)?;
        if let Err(e) = append(&mut self.log, &line) {
            // Drop whatever part of the line reached the file.
            if let Err(truncate) = self.log.set_len(self.len) {
                tracing::error!(
                    error = %truncate,
                    "failed to truncate quote log after append error; store fenced until reopened"
                );
                self.failed = Some(format!("append failed ({e}), rollback failed ({truncate})"));
            }
            return Err(StorageError::Unavailable(format!("append to quote log: {e}")));
        }
        self.len += line.len() as u64;
        self.tables.apply(unit);
        Ok(())
    }
}

/// Flags a commit whose caller stopped waiting, so the blocking writer skips it
/// if it has not started yet.
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    recovery: RecoveryReport,
    state: Arc<Mutex<LogState>>,
}

impl FileStorage {
    /// Open (or create) the log at `path` and replay it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let log = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::Unavailable(format!("open {}: {e}", path.display())))?;

        let bytes = std::fs::read(&path)?;
        let mut tables = Tables::default();
        let (entries_recovered, valid_len) = replay(&bytes, &mut tables);

        let discarded_bytes = bytes.len() as u64 - valid_len;
        if discarded_bytes > 0 {
            tracing::warn!(
                path = %path.display(),
                discarded_bytes,
                "discarding torn or corrupt tail of quote log"
            );
            log.set_len(valid_len)?;
            log.sync_data()?;
        }
        tracing::info!(
            path = %path.display(),
            entries_recovered,
            quotes = tables.quote_count(),
            idempotency_records = tables.idempotency_count(),
            "quote log recovered"
        );

        Ok(Self {
            path,
            recovery: RecoveryReport {
                entries_recovered,
                discarded_bytes,
            },
            state: Arc::new(Mutex::new(LogState {
                tables,
                log,
                len: valid_len,
                failed: None,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn recovery(&self) -> RecoveryReport {
        self.recovery
    }

    /// Run `f` against the log state on the blocking pool, so lock waits and
    /// disk syncs never stall a runtime worker and callers can time out.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut LogState) -> Result<T, StorageError> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        tokio::task::spawn_blocking(move || {
            let mut guard = state
                .lock()
                .map_err(|_| StorageError::Backend("file store lock poisoned".to_string()))?;
            guard.usable()?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| StorageError::Backend(format!("file store task failed: {e}")))?
    }
}

/// Replay complete, valid entries into `tables`. Returns the number of
/// entries applied and the byte length of the valid prefix.
fn replay(bytes: &[u8], tables: &mut Tables) -> (usize, u64) {
    let mut applied = 0;
    let mut offset = 0usize;
    while offset < bytes.len() {
        let Some(newline) = bytes[offset..].iter().position(|&b| b == b'\n') else {
            break; // torn final line
        };
        let line = &bytes[offset..offset + newline];
        let Some(unit) = decode_entry(line) else {
            break;
        };
        if tables.commit(unit).is_err() {
            break;
        }
        applied += 1;
        offset += newline + 1;
    }
    (applied, offset as u64)
}

fn checksum(json: &[u8]) -> String {
    format!("{:x}", Sha256::digest(json))
}

fn encode_entry(unit: &UnitOfWork) -> Result<Vec<u8>, StorageError> {
    let json = serde_json::to_vec(unit)?;
    let mut line = checksum(&json).into_bytes();
    line.push(b' ');
    line.extend_from_slice(&json);
    line.push(b'\n');
    Ok(line)
}

fn decode_entry(line: &[u8]) -> Option<UnitOfWork> {
    let split = line.iter().position(|&b| b == b' ')?;
    let (sum, json) = (&line[..split], &line[split + 1..]);
    if sum != checksum(json).as_bytes() {
        return None;
    }
    serde_json::from_slice(json).ok()
}

fn append(log: &mut File, line: &[u8]) -> std::io::Result<()> {
    log.write_all(line)?;
    log.sync_data()
}

#[async_trait]
impl QuoteStorage for FileStorage {
    type Snapshot = UnitOfWork;

    async fn begin_snapshot(&self) -> Result<UnitOfWork, StorageError> {
        Ok(UnitOfWork::default())
    }

    async fn commit_snapshot(&self, snapshot: UnitOfWork) -> Result<(), StorageError> {
        if snapshot.is_empty() {
            return Ok(());
        }
        let abandoned = Arc::new(AtomicBool::new(false));
        let _abandon = AbandonOnDrop(Arc::clone(&abandoned));
        self.blocking(move |state| {
            if abandoned.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable(
                    "commit abandoned by caller".to_string(),
                ));
            }
            state.commit(snapshot)
        })
        .await
    }

    async fn abort_snapshot(&self, _snapshot: UnitOfWork) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_quote(
        &self,
        snapshot: &mut UnitOfWork,
        record: QuoteRecord,
    ) -> Result<(), StorageError> {
        let mut staged = std::mem::take(snapshot);
        let (staged, result) = self
            .blocking(move |state| {
                let result = state.tables.stage_quote(&mut staged, record);
                Ok((staged, result))
            })
            .await?;
        *snapshot = staged;
        result
    }

    async fn insert_idempotency_record(
        &self,
        snapshot: &mut UnitOfWork,
        record: IdempotencyRecord,
    ) -> Result<(), StorageError> {
        let mut staged = std::mem::take(snapshot);
        let (staged, result) = self
            .blocking(move |state| {
                let result = state.tables.stage_idempotency_record(&mut staged, record);
                Ok((staged, result))
            })
            .await?;
        *snapshot = staged;
        result
    }

    async fn find_idempotency_record(
        &self,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, StorageError> {
        let key = key.to_string();
        self.blocking(move |state| Ok(state.tables.find_key(&key).cloned()))
            .await
    }

    async fn get_quote(&self, quote_id: &str) -> Result<QuoteRecord, StorageError> {
        let quote_id = quote_id.to_string();
        self.blocking(move |state| {
            state
                .tables
                .quote(&quote_id)
                .cloned()
                .ok_or(StorageError::QuoteNotFound { quote_id })
        })
        .await
    }

    async fn count_quotes(&self) -> Result<usize, StorageError> {
        self.blocking(|state| Ok(state.tables.quote_count())).await
    }

    async fn count_idempotency_records(&self) -> Result<usize, StorageError> {
        self.blocking(|state| Ok(state.tables.idempotency_count()))
            .await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.blocking(|state| {
            state
                .log
                .metadata()
                .map(|_| ())
                .map_err(|e| StorageError::Unavailable(format!("quote log: {e}")))
        })
        .await
    }
}
