//! Append-only arena tables shared by the in-process backends.
//!
//! Records are appended to `Vec`s and never moved or mutated; the hash maps
//! index them by their unique key. Uniqueness is checked for a whole unit of
//! work before any of it is appended.

use std::collections::{HashMap, HashSet};

use crate::error::StorageError;
use crate::record::{IdempotencyRecord, QuoteRecord, UnitOfWork};

#[derive(Debug, Default)]
pub(crate) struct Tables {
    quotes: Vec<QuoteRecord>,
    quote_slots: HashMap<String, usize>,
    idempotency: Vec<IdempotencyRecord>,
    key_slots: HashMap<String, usize>,
}

impl Tables {
    pub(crate) fn find_key(&self, key: &str) -> Option<&IdempotencyRecord> {
        self.key_slots.get(key).map(|&slot| &self.idempotency[slot])
    }

    pub(crate) fn quote(&self, quote_id: &str) -> Option<&QuoteRecord> {
        self.quote_slots.get(quote_id).map(|&slot| &self.quotes[slot])
    }

    pub(crate) fn quote_count(&self) -> usize {
        self.quotes.len()
    }

    pub(crate) fn idempotency_count(&self) -> usize {
        self.idempotency.len()
    }

    /// Stage a quote into `unit`, rejecting ids that are committed or already staged.
    pub(crate) fn stage_quote(
        &self,
        unit: &mut UnitOfWork,
        record: QuoteRecord,
    ) -> Result<(), StorageError> {
        if self.quote_slots.contains_key(&record.id) || unit.stages_quote(&record.id) {
            return Err(StorageError::QuoteAlreadyExists {
                quote_id: record.id,
            });
        }
        unit.quotes.push(record);
        Ok(())
    }

    /// Stage an idempotency record into `unit`, rejecting keys that are
    /// committed or already staged.
    pub(crate) fn stage_idempotency_record(
        &self,
        unit: &mut UnitOfWork,
        record: IdempotencyRecord,
    ) -> Result<(), StorageError> {
        if self.key_slots.contains_key(&record.key) || unit.stages_key(&record.key) {
            return Err(StorageError::DuplicateKey { key: record.key });
        }
        unit.idempotency_records.push(record);
        Ok(())
    }

    /// Verify that every key and quote id in `unit` is still free.
    ///
    /// Staging checks ran against an older view; a concurrent commit may have
    /// claimed the same key since.
    pub(crate) fn check(&self, unit: &UnitOfWork) -> Result<(), StorageError> {
        let mut keys = HashSet::new();
        for record in &unit.idempotency_records {
            if self.key_slots.contains_key(&record.key) || !keys.insert(record.key.as_str()) {
                return Err(StorageError::DuplicateKey {
                    key: record.key.clone(),
                });
            }
        }
        let mut ids = HashSet::new();
        for quote in &unit.quotes {
            if self.quote_slots.contains_key(&quote.id) || !ids.insert(quote.id.as_str()) {
                return Err(StorageError::QuoteAlreadyExists {
                    quote_id: quote.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Append a unit of work. Callers must have run [`Tables::check`] under
    /// the same lock.
    pub(crate) fn apply(&mut self, unit: UnitOfWork) {
        for quote in unit.quotes {
            self.quote_slots.insert(quote.id.clone(), self.quotes.len());
            self.quotes.push(quote);
        }
        for record in unit.idempotency_records {
            self.key_slots.insert(record.key.clone(), self.idempotency.len());
            self.idempotency.push(record);
        }
    }

    /// Insert-if-absent for a whole unit of work.
    pub(crate) fn commit(&mut self, unit: UnitOfWork) -> Result<(), StorageError> {
        self.check(&unit)?;
        self.apply(unit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn quote(id: &str) -> QuoteRecord {
        QuoteRecord {
            id: id.to_string(),
            document_id: "DOC-1".to_string(),
            amount: Decimal::new(1050, 2),
            currency: "CLP".to_string(),
            status: "ISSUED".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn record(key: &str, quote_id: &str) -> IdempotencyRecord {
        IdempotencyRecord {
            key: key.to_string(),
            request_fingerprint: "ab".repeat(32),
            result_status: 201,
            result_body: "{}".to_string(),
            quote_id: quote_id.to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn commit_appends_and_indexes() {
        let mut tables = Tables::default();
        let mut unit = UnitOfWork::default();
        tables.stage_quote(&mut unit, quote("q-1")).unwrap();
        tables
            .stage_idempotency_record(&mut unit, record("k-1", "q-1"))
            .unwrap();
        tables.commit(unit).unwrap();

        assert_eq!(tables.quote_count(), 1);
        assert_eq!(tables.idempotency_count(), 1);
        assert_eq!(tables.find_key("k-1").unwrap().quote_id, "q-1");
        assert_eq!(tables.quote("q-1").unwrap().currency, "CLP");
        assert!(tables.find_key("K-1").is_none());
    }

    #[test]
    fn staging_same_key_twice_in_one_unit_is_rejected() {
        let tables = Tables::default();
        let mut unit = UnitOfWork::default();
        tables
            .stage_idempotency_record(&mut unit, record("k-1", "q-1"))
            .unwrap();
        let err = tables
            .stage_idempotency_record(&mut unit, record("k-1", "q-2"))
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey { key } if key == "k-1"));
    }

    #[test]
    fn losing_commit_applies_nothing() {
        let mut tables = Tables::default();

        // Both units are staged against the empty table.
        let mut first = UnitOfWork::default();
        let mut second = UnitOfWork::default();
        tables.stage_quote(&mut first, quote("q-1")).unwrap();
        tables
            .stage_idempotency_record(&mut first, record("k-1", "q-1"))
            .unwrap();
        tables.stage_quote(&mut second, quote("q-2")).unwrap();
        tables
            .stage_idempotency_record(&mut second, record("k-1", "q-2"))
            .unwrap();

        tables.commit(first).unwrap();
        let err = tables.commit(second).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey { .. }));
        assert_eq!(tables.quote_count(), 1);
        assert!(tables.quote("q-2").is_none());
    }
}
