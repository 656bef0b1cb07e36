//! Application state shared across request handlers.

use std::sync::Arc;
use std::time::Duration;

use quotes_core::CreateQuoteHandler;
use quotes_storage::QuoteStorage;

use crate::config::ServerConfig;
use crate::metrics::{CounterMetrics, MetricsError};

pub struct AppState<S> {
    /// The create-quote use case, wired to `metrics`.
    pub(crate) quotes: CreateQuoteHandler<S>,
    pub(crate) metrics: Arc<CounterMetrics>,
    /// Accepted bearer tokens.
    pub(crate) api_tokens: Vec<String>,
    pub(crate) retry_after_secs: u64,
    /// Bound for the health check's store ping.
    pub(crate) store_timeout: Duration,
    pub(crate) max_body_bytes: usize,
}

impl<S: QuoteStorage> AppState<S> {
    pub fn new(storage: Arc<S>, config: &ServerConfig) -> Result<Self, MetricsError> {
        let metrics = Arc::new(CounterMetrics::new()?);
        let quotes = CreateQuoteHandler::new(storage)
            .with_metrics(metrics.clone())
            .with_store_timeout(config.store_timeout);
        Ok(Self {
            quotes,
            metrics,
            api_tokens: config.api_tokens.clone(),
            retry_after_secs: config.retry_after_secs,
            store_timeout: config.store_timeout,
            max_body_bytes: config.max_body_bytes,
        })
    }

    pub fn metrics(&self) -> &CounterMetrics {
        &self.metrics
    }

    pub(crate) fn accepts_token(&self, token: &str) -> bool {
        self.api_tokens.iter().any(|t| t == token)
    }
}
