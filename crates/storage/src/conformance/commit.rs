use std::future::Future;

use super::{commit_pair, make_idempotency_record, make_quote, TestResult};
use crate::{QuoteStorage, StorageError};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "quote_and_record_visible_together",
        quote_and_record_visible_together(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "stale_snapshot_rejected_with_duplicate_key",
        stale_snapshot_rejected_with_duplicate_key(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "rejected_commit_applies_nothing",
        rejected_commit_applies_nothing(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "committed_record_is_immutable",
        committed_record_is_immutable(factory).await,
    ));

    results
}

async fn quote_and_record_visible_together<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    commit_pair(&s, "key-1", "quote-1").await?;

    let quotes = s.count_quotes().await.map_err(|e| e.to_string())?;
    let records = s
        .count_idempotency_records()
        .await
        .map_err(|e| e.to_string())?;
    if (quotes, records) != (1, 1) {
        return Err(format!(
            "expected 1 quote and 1 record, got {quotes} and {records}"
        ));
    }
    Ok(())
}

/// Two snapshots stage the same key against an empty store. The first
/// commit wins; the second must fail at commit time.
async fn stale_snapshot_rejected_with_duplicate_key<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    let mut first = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut second = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for (snap, quote_id) in [(&mut first, "quote-1"), (&mut second, "quote-2")] {
        s.insert_quote(snap, make_quote(quote_id))
            .await
            .map_err(|e| format!("stage {quote_id}: {e}"))?;
        s.insert_idempotency_record(snap, make_idempotency_record("key-1", quote_id))
            .await
            .map_err(|e| format!("stage record for {quote_id}: {e}"))?;
    }

    s.commit_snapshot(first)
        .await
        .map_err(|e| format!("first commit: {e}"))?;
    match s.commit_snapshot(second).await {
        Err(StorageError::DuplicateKey { key }) if key == "key-1" => Ok(()),
        other => Err(format!("expected DuplicateKey on second commit, got {other:?}")),
    }
}

async fn rejected_commit_applies_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    let mut loser = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_quote(&mut loser, make_quote("quote-2"))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_idempotency_record(&mut loser, make_idempotency_record("key-1", "quote-2"))
        .await
        .map_err(|e| e.to_string())?;

    commit_pair(&s, "key-1", "quote-1").await?;
    if s.commit_snapshot(loser).await.is_ok() {
        return Err("losing commit succeeded".to_string());
    }

    match s.get_quote("quote-2").await {
        Err(StorageError::QuoteNotFound { .. }) => {}
        other => return Err(format!("loser's quote leaked: {other:?}")),
    }
    let quotes = s.count_quotes().await.map_err(|e| e.to_string())?;
    if quotes != 1 {
        return Err(format!("expected 1 quote, got {quotes}"));
    }
    Ok(())
}

async fn committed_record_is_immutable<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    commit_pair(&s, "key-1", "quote-1").await?;
    let before = s
        .find_idempotency_record("key-1")
        .await
        .map_err(|e| e.to_string())?;

    // A second attempt for the same key must not touch the stored record.
    let _ = commit_pair(&s, "key-1", "quote-9").await;

    let after = s
        .find_idempotency_record("key-1")
        .await
        .map_err(|e| e.to_string())?;
    if before != after {
        return Err(format!("record changed from {before:?} to {after:?}"));
    }
    Ok(())
}
