//! quotes-core: idempotent quote creation.
//!
//! Given an idempotency key and a request, [`CreateQuoteHandler::create`]
//! either creates the quote exactly once, replays the outcome stored for an
//! earlier identical request, or reports that the key was reused with a
//! different payload.
//!
//! # Public API
//!
//! - [`fingerprint()`] -- canonical SHA-256 digest of a request
//! - [`decide()`] / [`decide_for_key()`] -- the proceed/replay/conflict decision
//! - [`CreateQuoteHandler`] -- the orchestrator
//! - [`QuoteMetrics`] -- sink for terminal decisions
//! - [`CreateQuoteError`] -- infrastructure failures (conflicts are outcomes)

pub mod decision;
pub mod error;
pub mod fingerprint;
pub mod metrics;
pub mod orchestrator;
pub mod quote;

// ── Convenience re-exports ───────────────────────────────────────────

pub use decision::{decide, decide_for_key, Decision};
pub use error::CreateQuoteError;
pub use fingerprint::{canonical_json, fingerprint, Fingerprint};
pub use metrics::{NoopMetrics, QuoteMetrics};
pub use orchestrator::{
    CreateQuoteHandler, CreateQuoteOutcome, IdempotencyStatus, StoredResponse, CREATED_STATUS,
    DEFAULT_STORE_TIMEOUT, IDEMPOTENCY_KEY_REUSE_CONFLICT, IDEMPOTENCY_KEY_REUSE_MESSAGE,
};
pub use quote::{
    normalize_currency, normalize_document_id, CreateQuoteCommand, CreateQuoteRequest,
    IdempotencyKey, KeyError, QuoteResponse, QUOTE_STATUS_ISSUED,
};
