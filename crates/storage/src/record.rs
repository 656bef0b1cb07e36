use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum length of an idempotency key, in characters.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 100;

/// A persisted quote (the business record created by the service).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRecord {
    /// UUID, independent of any idempotency key.
    pub id: String,
    pub document_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
}

/// The stored outcome of the first successful request for an idempotency key.
///
/// Immutable once committed. `result_body` holds the exact bytes that were
/// returned to the original caller; replays return it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    /// Lowercase hex SHA-256 of the canonical request.
    pub request_fingerprint: String,
    pub result_status: u16,
    pub result_body: String,
    /// The quote this key created.
    pub quote_id: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
}

/// Writes staged by a snapshot, applied together on commit or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOfWork {
    pub quotes: Vec<QuoteRecord>,
    pub idempotency_records: Vec<IdempotencyRecord>,
}

impl UnitOfWork {
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty() && self.idempotency_records.is_empty()
    }

    pub(crate) fn stages_key(&self, key: &str) -> bool {
        self.idempotency_records.iter().any(|r| r.key == key)
    }

    pub(crate) fn stages_quote(&self, quote_id: &str) -> bool {
        self.quotes.iter().any(|q| q.id == quote_id)
    }
}
