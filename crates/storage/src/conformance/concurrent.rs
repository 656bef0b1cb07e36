use std::future::Future;
use std::sync::Arc;

use super::{make_idempotency_record, make_quote, TestResult};
use crate::{QuoteStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_same_key_exactly_one_wins",
        concurrent_same_key_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_different_keys_all_succeed",
        concurrent_different_keys_all_succeed(factory).await,
    ));

    results
}

// ── Same key: exactly one wins ──────────────────────────────────────────────

/// N tasks each stage a quote and a record for the same key, then commit.
/// Exactly one commit succeeds; the rest get DuplicateKey (at insert or at
/// commit, depending on interleaving) and leave no quote behind.
async fn concurrent_same_key_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let quote_id = format!("quote-{i}");
            let mut snap = s.begin_snapshot().await?;
            s.insert_quote(&mut snap, make_quote(&quote_id)).await?;
            let staged = s
                .insert_idempotency_record(&mut snap, make_idempotency_record("key-1", &quote_id))
                .await;
            let committed = match staged {
                Ok(()) => s.commit_snapshot(snap).await,
                Err(e) => {
                    s.abort_snapshot(snap).await?;
                    Err(e)
                }
            };
            match committed {
                Ok(()) => Ok(true), // won the race
                Err(StorageError::DuplicateKey { .. }) => Ok(false), // lost the race
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }

    let quotes = storage.count_quotes().await.map_err(|e| e.to_string())?;
    if quotes != 1 {
        return Err(format!("expected 1 quote after race, got {quotes}"));
    }
    let record = storage
        .find_idempotency_record("key-1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("winner's record missing")?;
    storage
        .get_quote(&record.quote_id)
        .await
        .map_err(|e| format!("winner's quote missing: {e}"))?;

    Ok(())
}

// ── Different keys: all succeed ─────────────────────────────────────────────

/// N tasks each commit a different key. All should succeed; no false
/// conflicts when there is no contention.
async fn concurrent_different_keys_all_succeed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let quote_id = format!("quote-{i}");
            let mut snap = s.begin_snapshot().await?;
            s.insert_quote(&mut snap, make_quote(&quote_id)).await?;
            s.insert_idempotency_record(
                &mut snap,
                make_idempotency_record(&format!("key-{i}"), &quote_id),
            )
            .await?;
            s.commit_snapshot(snap).await?;
            Ok::<(), StorageError>(())
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e| format!("task {i} failed: {e}"))?;
    }

    let records = storage
        .count_idempotency_records()
        .await
        .map_err(|e| e.to_string())?;
    if records != N {
        return Err(format!("expected {N} records, got {records}"));
    }

    Ok(())
}
