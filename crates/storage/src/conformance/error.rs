use std::future::Future;

use super::TestResult;
use crate::{QuoteStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "find_missing_key_returns_none",
        find_missing_key_returns_none(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_quote_nonexistent",
        get_quote_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "counts_empty_for_fresh_store",
        counts_empty_for_fresh_store(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "ping_healthy_store",
        ping_healthy_store(factory).await,
    ));

    results
}

async fn find_missing_key_returns_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.find_idempotency_record("no-such-key").await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {other:?}")),
    }
}

async fn get_quote_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_quote("quote-999").await {
        Err(StorageError::QuoteNotFound { quote_id }) if quote_id == "quote-999" => Ok(()),
        other => Err(format!("expected QuoteNotFound(quote-999), got {other:?}")),
    }
}

async fn counts_empty_for_fresh_store<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let quotes = s.count_quotes().await.map_err(|e| e.to_string())?;
    let records = s
        .count_idempotency_records()
        .await
        .map_err(|e| e.to_string())?;
    if quotes != 0 || records != 0 {
        return Err(format!("expected empty store, got {quotes}/{records}"));
    }
    Ok(())
}

async fn ping_healthy_store<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.ping().await.map_err(|e| format!("ping: {e}"))
}
