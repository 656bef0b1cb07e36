//! Quote request, command and response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quotes_storage::{QuoteRecord, MAX_IDEMPOTENCY_KEY_LEN};

/// Status assigned to every newly created quote.
pub const QUOTE_STATUS_ISSUED: &str = "ISSUED";

/// The body of `POST /api/v1/quotes`, exactly as the caller sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuoteRequest {
    pub document_id: String,
    pub amount: Decimal,
    pub currency: String,
}

/// A caller-supplied idempotency key: trimmed, non-empty, at most
/// [`MAX_IDEMPOTENCY_KEY_LEN`] characters. Otherwise opaque and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Idempotency-Key header is required.")]
    Missing,
    #[error("Idempotency-Key must be at most {max} characters (got {len}).")]
    TooLong { len: usize, max: usize },
}

impl IdempotencyKey {
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(KeyError::Missing);
        }
        let len = key.chars().count();
        if len > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(KeyError::TooLong {
                len,
                max: MAX_IDEMPOTENCY_KEY_LEN,
            });
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One create-quote attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateQuoteCommand {
    pub idempotency_key: IdempotencyKey,
    pub request: CreateQuoteRequest,
}

/// The response body returned for a created (or replayed) quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub id: String,
    pub document_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub created_at: String,
}

impl From<&QuoteRecord> for QuoteResponse {
    fn from(quote: &QuoteRecord) -> Self {
        Self {
            id: quote.id.clone(),
            document_id: quote.document_id.clone(),
            amount: quote.amount,
            currency: quote.currency.clone(),
            status: quote.status.clone(),
            created_at: quote.created_at.clone(),
        }
    }
}

/// Currency codes are stored trimmed and upper-cased.
pub fn normalize_currency(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn normalize_document_id(raw: &str) -> String {
    raw.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_trimmed_and_case_preserved() {
        let key = IdempotencyKey::parse("  Idem-123 ").unwrap();
        assert_eq!(key.as_str(), "Idem-123");
    }

    #[test]
    fn blank_key_is_missing() {
        assert_eq!(IdempotencyKey::parse(""), Err(KeyError::Missing));
        assert_eq!(IdempotencyKey::parse(" \t "), Err(KeyError::Missing));
    }

    #[test]
    fn key_length_is_counted_in_chars() {
        assert!(IdempotencyKey::parse(&"é".repeat(100)).is_ok());
        assert_eq!(
            IdempotencyKey::parse(&"k".repeat(101)),
            Err(KeyError::TooLong { len: 101, max: 100 })
        );
    }

    #[test]
    fn request_accepts_numeric_and_string_amounts() {
        let numeric: CreateQuoteRequest =
            serde_json::from_str(r#"{"documentId":"DOC-3","amount":30.5,"currency":"clp"}"#)
                .unwrap();
        let text: CreateQuoteRequest =
            serde_json::from_str(r#"{"documentId":"DOC-3","amount":"30.5","currency":"clp"}"#)
                .unwrap();
        assert_eq!(numeric, text);
        assert_eq!(numeric.amount, Decimal::new(305, 1));
    }

    #[test]
    fn response_uses_camel_case_and_numeric_amount() {
        let response = QuoteResponse {
            id: "q-1".to_string(),
            document_id: "DOC-3".to_string(),
            amount: Decimal::new(3050, 2),
            currency: "CLP".to_string(),
            status: QUOTE_STATUS_ISSUED.to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["documentId"], "DOC-3");
        assert_eq!(json["createdAt"], "2026-01-01T00:00:00Z");
        assert_eq!(json["amount"].as_f64(), Some(30.5));
    }

    #[test]
    fn currency_normalization() {
        assert_eq!(normalize_currency(" clp "), "CLP");
        assert_eq!(normalize_document_id("  DOC-1\n"), "DOC-1");
    }
}
