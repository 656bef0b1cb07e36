//! Conformance test suite for `QuoteStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `QuoteStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Insert**: staging quotes and idempotency records, duplicate detection
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: quote and idempotency record land together or not at all
//! - **Concurrency**: racing commits for one key produce exactly one winner
//! - **Error handling**: correct error variants for missing data
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use quotes_storage::conformance::run_conformance_suite;
//! use quotes_storage::MemoryStorage;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod error;
mod insert;
mod snapshot;

use std::fmt;
use std::future::Future;

use rust_decimal::Decimal;

use crate::record::{IdempotencyRecord, QuoteRecord};
use crate::QuoteStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "insert", "snapshot", "commit").
    pub category: String,
    /// Test name (e.g. "duplicate_key_rejected_at_insert").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: QuoteStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(insert::run_insert_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        failed: total - passed,
        passed,
        total,
        results,
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn make_quote(id: &str) -> QuoteRecord {
    QuoteRecord {
        id: id.to_string(),
        document_id: format!("DOC-{id}"),
        amount: Decimal::new(12345, 2),
        currency: "CLP".to_string(),
        status: "ISSUED".to_string(),
        created_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

fn make_idempotency_record(key: &str, quote_id: &str) -> IdempotencyRecord {
    IdempotencyRecord {
        key: key.to_string(),
        request_fingerprint: "3f".repeat(32),
        result_status: 201,
        result_body: format!(r#"{{"id":"{quote_id}","status":"ISSUED"}}"#),
        quote_id: quote_id.to_string(),
        created_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

/// Stage a quote plus its idempotency record in one snapshot and commit it.
async fn commit_pair<S: QuoteStorage>(s: &S, key: &str, quote_id: &str) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_quote(&mut snap, make_quote(quote_id))
        .await
        .map_err(|e| format!("insert quote: {e}"))?;
    s.insert_idempotency_record(&mut snap, make_idempotency_record(key, quote_id))
        .await
        .map_err(|e| format!("insert record: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))
}
