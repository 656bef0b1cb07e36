//! Request body validation for `POST /api/v1/quotes`.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;

use quotes_core::CreateQuoteRequest;

use crate::error::ApiError;

pub(crate) const MAX_DOCUMENT_ID_LEN: usize = 50;
const MAX_AMOUNT: i64 = 999_999_999;

/// Unwrap the JSON extractor result and check every field. All field
/// problems are reported together.
pub(crate) fn validate_body(
    body: Result<Json<CreateQuoteRequest>, JsonRejection>,
) -> Result<CreateQuoteRequest, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge;
        }
        let mut errors = BTreeMap::new();
        errors.insert("body".to_string(), vec![rejection.body_text()]);
        ApiError::Validation(errors)
    })?;

    let errors = field_errors(&request);
    if errors.is_empty() {
        Ok(request)
    } else {
        Err(ApiError::Validation(errors))
    }
}

pub(crate) fn field_errors(request: &CreateQuoteRequest) -> BTreeMap<String, Vec<String>> {
    let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut reject = |field: &str, message: String| {
        errors.entry(field.to_string()).or_default().push(message);
    };

    let document_id = request.document_id.trim();
    if document_id.is_empty() {
        reject("documentId", "documentId is required.".to_string());
    } else if document_id.chars().count() > MAX_DOCUMENT_ID_LEN {
        reject(
            "documentId",
            format!("documentId must be at most {MAX_DOCUMENT_ID_LEN} characters."),
        );
    }

    if request.amount <= Decimal::ZERO {
        reject("amount", "amount must be greater than 0.".to_string());
    } else if request.amount > Decimal::from(MAX_AMOUNT) {
        reject("amount", format!("amount must be at most {MAX_AMOUNT}."));
    }

    let currency = request.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        reject(
            "currency",
            "currency must be a 3-letter ISO code.".to_string(),
        );
    }

    errors
}
