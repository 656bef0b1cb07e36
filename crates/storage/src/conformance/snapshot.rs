//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted or dropped writes are discarded.

use std::future::Future;

use super::{commit_pair, make_idempotency_record, make_quote, TestResult};
use crate::QuoteStorage;

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "empty_snapshot_commits",
        empty_snapshot_commits(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_writes_invisible",
        uncommitted_writes_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_writes",
        abort_discards_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "dropped_snapshot_discards_writes",
        dropped_snapshot_discards_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "sequential_snapshots_see_prior_commits",
        sequential_snapshots_see_prior_commits(factory).await,
    ));

    results
}

async fn empty_snapshot_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let quotes = s.count_quotes().await.map_err(|e| e.to_string())?;
    if quotes != 0 {
        return Err(format!("expected 0 quotes, got {quotes}"));
    }
    Ok(())
}

async fn uncommitted_writes_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_quote(&mut snap, make_quote("quote-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_idempotency_record(&mut snap, make_idempotency_record("key-1", "quote-1"))
        .await
        .map_err(|e| e.to_string())?;

    let found = s
        .find_idempotency_record("key-1")
        .await
        .map_err(|e| e.to_string())?;
    let quotes = s.count_quotes().await.map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    if found.is_some() {
        return Err("uncommitted idempotency record was visible".to_string());
    }
    if quotes != 0 {
        return Err(format!("uncommitted quote was counted ({quotes})"));
    }
    Ok(())
}

async fn abort_discards_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_quote(&mut snap, make_quote("quote-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_idempotency_record(&mut snap, make_idempotency_record("key-1", "quote-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    if s.find_idempotency_record("key-1")
        .await
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Err("aborted idempotency record became visible".to_string());
    }
    if s.get_quote("quote-1").await.is_ok() {
        return Err("aborted quote became visible".to_string());
    }

    // The key is free again.
    commit_pair(&s, "key-1", "quote-1").await
}

async fn dropped_snapshot_discards_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.insert_quote(&mut snap, make_quote("quote-1"))
            .await
            .map_err(|e| e.to_string())?;
        s.insert_idempotency_record(&mut snap, make_idempotency_record("key-1", "quote-1"))
            .await
            .map_err(|e| e.to_string())?;
    }

    let records = s
        .count_idempotency_records()
        .await
        .map_err(|e| e.to_string())?;
    if records != 0 {
        return Err(format!("dropped snapshot left {records} records"));
    }
    Ok(())
}

async fn sequential_snapshots_see_prior_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for i in 0..3 {
        commit_pair(&s, &format!("key-{i}"), &format!("quote-{i}")).await?;
    }

    let quotes = s.count_quotes().await.map_err(|e| e.to_string())?;
    let records = s
        .count_idempotency_records()
        .await
        .map_err(|e| e.to_string())?;
    if quotes != 3 || records != 3 {
        return Err(format!("expected 3/3, got {quotes} quotes / {records} records"));
    }
    Ok(())
}
