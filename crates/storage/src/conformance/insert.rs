use std::future::Future;

use super::{commit_pair, make_idempotency_record, make_quote, TestResult};
use crate::{QuoteStorage, StorageError};

pub(super) async fn run_insert_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "insert",
        "committed_record_found_by_key",
        committed_record_found_by_key(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "committed_quote_readable_by_id",
        committed_quote_readable_by_id(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "record_preserved_byte_for_byte",
        record_preserved_byte_for_byte(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "duplicate_key_rejected_at_insert",
        duplicate_key_rejected_at_insert(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "duplicate_key_within_snapshot_rejected",
        duplicate_key_within_snapshot_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "duplicate_quote_id_rejected",
        duplicate_quote_id_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "keys_are_case_sensitive",
        keys_are_case_sensitive(factory).await,
    ));

    results
}

async fn committed_record_found_by_key<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    commit_pair(&s, "key-1", "quote-1").await?;

    let record = s
        .find_idempotency_record("key-1")
        .await
        .map_err(|e| format!("find: {e}"))?
        .ok_or("expected record for key-1")?;
    if record.quote_id != "quote-1" {
        return Err(format!("expected quote-1, got {}", record.quote_id));
    }
    if record.result_status != 201 {
        return Err(format!("expected status 201, got {}", record.result_status));
    }
    Ok(())
}

async fn committed_quote_readable_by_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    commit_pair(&s, "key-1", "quote-1").await?;

    let quote = s
        .get_quote("quote-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if quote != make_quote("quote-1") {
        return Err(format!("stored quote differs: {quote:?}"));
    }
    Ok(())
}

async fn record_preserved_byte_for_byte<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut record = make_idempotency_record("key-1", "quote-1");
    record.result_body = "{ \"amount\": 30.00,\n\t\"note\": \"ñ\" }".to_string();
    let expected = record.clone();

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_quote(&mut snap, make_quote("quote-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_idempotency_record(&mut snap, record)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let found = s
        .find_idempotency_record("key-1")
        .await
        .map_err(|e| e.to_string())?;
    if found.as_ref() != Some(&expected) {
        return Err(format!("expected {expected:?}, got {found:?}"));
    }
    Ok(())
}

async fn duplicate_key_rejected_at_insert<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    commit_pair(&s, "key-1", "quote-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .insert_idempotency_record(&mut snap, make_idempotency_record("key-1", "quote-2"))
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::DuplicateKey { key }) if key == "key-1" => Ok(()),
        other => Err(format!("expected DuplicateKey(key-1), got {other:?}")),
    }
}

async fn duplicate_key_within_snapshot_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_idempotency_record(&mut snap, make_idempotency_record("key-1", "quote-1"))
        .await
        .map_err(|e| format!("first insert: {e}"))?;
    let result = s
        .insert_idempotency_record(&mut snap, make_idempotency_record("key-1", "quote-2"))
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::DuplicateKey { .. }) => Ok(()),
        other => Err(format!("expected DuplicateKey, got {other:?}")),
    }
}

async fn duplicate_quote_id_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    commit_pair(&s, "key-1", "quote-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.insert_quote(&mut snap, make_quote("quote-1")).await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::QuoteAlreadyExists { quote_id }) if quote_id == "quote-1" => Ok(()),
        other => Err(format!("expected QuoteAlreadyExists, got {other:?}")),
    }
}

async fn keys_are_case_sensitive<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    commit_pair(&s, "Key-1", "quote-1").await?;
    commit_pair(&s, "key-1", "quote-2").await?;

    let upper = s
        .find_idempotency_record("Key-1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("missing Key-1")?;
    let lower = s
        .find_idempotency_record("key-1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("missing key-1")?;
    if upper.quote_id != "quote-1" || lower.quote_id != "quote-2" {
        return Err(format!(
            "keys collided: Key-1 -> {}, key-1 -> {}",
            upper.quote_id, lower.quote_id
        ));
    }
    Ok(())
}
