/// Sink for the orchestrator's terminal decisions.
///
/// Called once per `create` call, after the outcome is final. Implementations
/// must be cheap and must not fail.
pub trait QuoteMetrics: Send + Sync {
    fn quote_created(&self) {}
    fn idempotency_replayed(&self) {}
    fn idempotency_conflict(&self) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl QuoteMetrics for NoopMetrics {}
