//! Prometheus counters for the quotes API.
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `quotes_created_total` | Counter | Quotes created |
//! | `idempotency_replays_total` | Counter | Requests answered from a stored response |
//! | `idempotency_conflicts_total` | Counter | Keys reused with a different payload |
//! | `db_unavailable_total` | Counter | Requests rejected while the store was down |

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use thiserror::Error;

use quotes_core::QuoteMetrics;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

/// Counters registered with a private [`Registry`], so several instances can
/// coexist in one process.
#[derive(Clone)]
pub struct CounterMetrics {
    registry: Registry,
    quotes_created: IntCounter,
    idempotency_replays: IntCounter,
    idempotency_conflicts: IntCounter,
    db_unavailable: IntCounter,
}

impl CounterMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| -> Result<IntCounter, MetricsError> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        Ok(Self {
            quotes_created: counter("quotes_created_total", "Quotes created.")?,
            idempotency_replays: counter(
                "idempotency_replays_total",
                "Requests answered from a stored idempotent response.",
            )?,
            idempotency_conflicts: counter(
                "idempotency_conflicts_total",
                "Idempotency keys reused with a different payload.",
            )?,
            db_unavailable: counter(
                "db_unavailable_total",
                "Requests rejected because the store was unavailable.",
            )?,
            registry,
        })
    }

    pub fn db_unavailable(&self) {
        self.db_unavailable.inc();
    }

    /// Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

impl std::fmt::Debug for CounterMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterMetrics")
            .field("quotes_created", &self.quotes_created.get())
            .field("idempotency_replays", &self.idempotency_replays.get())
            .field("idempotency_conflicts", &self.idempotency_conflicts.get())
            .field("db_unavailable", &self.db_unavailable.get())
            .finish()
    }
}

impl QuoteMetrics for CounterMetrics {
    fn quote_created(&self) {
        self.quotes_created.inc();
    }

    fn idempotency_replayed(&self) {
        self.idempotency_replays.inc();
    }

    fn idempotency_conflict(&self) {
        self.idempotency_conflicts.inc();
    }
}
