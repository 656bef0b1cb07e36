//! The idempotency decision: proceed, replay, or reject.

use quotes_storage::{IdempotencyRecord, QuoteStorage, StorageError};

use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No record for the key: run the operation.
    Proceed,
    /// Same key, same request: return the stored outcome unchanged.
    Replay { status: u16, body: String },
    /// Same key, different request.
    Conflict,
}

/// Decide from the result of a key lookup.
pub fn decide(existing: Option<&IdempotencyRecord>, fingerprint: &Fingerprint) -> Decision {
    match existing {
        None => Decision::Proceed,
        Some(record) if fingerprint.matches(&record.request_fingerprint) => Decision::Replay {
            status: record.result_status,
            body: record.result_body.clone(),
        },
        Some(_) => Decision::Conflict,
    }
}

/// Look `key` up in `storage` and decide.
pub async fn decide_for_key<S: QuoteStorage>(
    storage: &S,
    key: &str,
    fingerprint: &Fingerprint,
) -> Result<Decision, StorageError> {
    let existing = storage.find_idempotency_record(key).await?;
    Ok(decide(existing.as_ref(), fingerprint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;

    fn stored(fp: &str) -> IdempotencyRecord {
        IdempotencyRecord {
            key: "idem-1".to_string(),
            request_fingerprint: fp.to_string(),
            result_status: 201,
            result_body: r#"{"id":"q-1"}"#.to_string(),
            quote_id: "q-1".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn absent_key_proceeds() {
        let fp = fingerprint(&"payload").unwrap();
        assert_eq!(decide(None, &fp), Decision::Proceed);
    }

    #[test]
    fn matching_fingerprint_replays_stored_outcome() {
        let fp = fingerprint(&"payload").unwrap();
        let record = stored(&fp.as_str().to_uppercase());
        assert_eq!(
            decide(Some(&record), &fp),
            Decision::Replay {
                status: 201,
                body: r#"{"id":"q-1"}"#.to_string()
            }
        );
    }

    #[test]
    fn different_fingerprint_conflicts() {
        let fp = fingerprint(&"payload").unwrap();
        let other = fingerprint(&"other payload").unwrap();
        assert_eq!(decide(Some(&stored(other.as_str())), &fp), Decision::Conflict);
    }
}
