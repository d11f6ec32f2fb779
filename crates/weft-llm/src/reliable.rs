use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use weft_core::backend::{ModelBackend, ModelRequest, ModelResponse};
use weft_core::errors::BackendError;

/// Retry behavior for [`RetryingBackend`].
#[derive(Clone, Debug)]
pub struct ReliableConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReliableConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
        }
    }
}

/// Wraps a backend with retries for transient failures.
///
/// - Retryable errors back off exponentially, capped at `max_delay`
/// - `retry_after` hints from rate limits take precedence
/// - Terminal errors surface immediately
pub struct RetryingBackend<B: ModelBackend> {
    inner: B,
    config: ReliableConfig,
    total_retries: AtomicU64,
}

impl<B: ModelBackend> RetryingBackend<B> {
    pub fn new(inner: B, config: ReliableConfig) -> Self {
        Self {
            inner,
            config,
            total_retries: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(inner: B) -> Self {
        Self::new(inner, ReliableConfig::default())
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    fn retry_delay(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        if let Some(delay) = suggested {
            return delay.min(self.config.max_delay);
        }
        let factor = 2u32.saturating_pow(attempt);
        self.config
            .base_delay
            .saturating_mul(factor)
            .min(self.config.max_delay)
    }
}

#[async_trait]
impl<B: ModelBackend> ModelBackend for RetryingBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, BackendError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_retryable() || attempt >= self.config.max_retries => return Err(e),
                Err(e) => {
                    let delay = self.retry_delay(attempt, e.suggested_delay());
                    self.total_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error_kind = e.error_kind(),
                        error = %e,
                        "retrying model call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
