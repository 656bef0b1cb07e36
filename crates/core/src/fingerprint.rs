//! Request fingerprinting.
//!
//! The canonical form of a request is its JSON value with object keys in
//! lexicographic order and no insignificant whitespace. `serde_json::Map` is
//! backed by `BTreeMap` (the `preserve_order` feature is not enabled), so
//! converting through `serde_json::Value` sorts keys regardless of the order
//! the caller sent them in. The digest is SHA-256 over the UTF-8 bytes,
//! rendered as 64 lowercase hex characters.
//!
//! Fingerprints are taken over the request as received, before any field
//! normalization.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a canonicalized request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a stored digest. Hex case is not significant.
    pub fn matches(&self, stored: &str) -> bool {
        self.0.eq_ignore_ascii_case(stored)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical JSON encoding of `request`.
pub fn canonical_json<T: Serialize>(request: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(request)?;
    serde_json::to_string(&value)
}

pub fn fingerprint<T: Serialize>(request: &T) -> Result<Fingerprint, serde_json::Error> {
    let canonical = canonical_json(request)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(Fingerprint(format!("{:x}", digest)))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::quote::CreateQuoteRequest;

    fn request(amount: i64, currency: &str) -> CreateQuoteRequest {
        CreateQuoteRequest {
            document_id: "DOC-4".to_string(),
            amount: Decimal::new(amount, 0),
            currency: currency.to_string(),
        }
    }

    #[test]
    fn digest_is_64_lowercase_hex() {
        let fp = fingerprint(&request(40, "clp")).unwrap();
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn field_order_does_not_matter() {
        let a: CreateQuoteRequest =
            serde_json::from_str(r#"{"documentId":"DOC-4","amount":40,"currency":"clp"}"#)
                .unwrap();
        let b: CreateQuoteRequest = serde_json::from_str(
            r#"{ "currency": "clp",
                 "amount": 40,
                 "documentId": "DOC-4" }"#,
        )
        .unwrap();
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn canonical_form_sorts_keys() {
        assert_eq!(
            canonical_json(&request(30, "clp")).unwrap(),
            r#"{"amount":"30","currency":"clp","documentId":"DOC-4"}"#
        );
    }

    #[test]
    fn different_amounts_differ() {
        assert_ne!(
            fingerprint(&request(40, "clp")).unwrap(),
            fingerprint(&request(41, "clp")).unwrap()
        );
    }

    #[test]
    fn raw_currency_case_is_significant() {
        assert_ne!(
            fingerprint(&request(40, "clp")).unwrap(),
            fingerprint(&request(40, "CLP")).unwrap()
        );
    }

    #[test]
    fn match_ignores_hex_case() {
        let fp = fingerprint(&request(40, "clp")).unwrap();
        assert!(fp.matches(&fp.as_str().to_uppercase()));
        assert!(!fp.matches(&"0".repeat(64)));
    }
}
