//! Transport retries for the prompt service.
//!
//! The handler already gives a PROMPT step several attempts, so retries here
//! multiply with those and default to off. Cancellation is never retried and
//! cuts a backoff sleep short.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::ports::{GenericLlmRequest, PromptError, PromptPort, PromptResponse};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra calls after the first; 0 passes every failure straight through.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the delay (0.0-1.0) randomized either way.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter_factor: 0.2,
        }
    }
}

/// Retries transient failures of the wrapped prompt client.
pub struct ResilientPromptClient {
    inner: Arc<dyn PromptPort>,
    config: RetryConfig,
}

impl ResilientPromptClient {
    pub fn new(inner: Arc<dyn PromptPort>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Delay before retry `attempt` (1-based): base * 2^(attempt-1), capped, with jitter.
    fn calculate_delay(&self, attempt: u32) -> u64 {
        let base = self.config.base_delay_ms;
        let exponential = base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.config.max_delay_ms);

        let jitter_range = (capped as f64 * self.config.jitter_factor) as i64;
        if jitter_range > 0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped as i64 + jitter).max(0) as u64
        } else {
            capped
        }
    }

    fn is_retryable(error: &PromptError) -> bool {
        match error {
            // Auth and malformed requests will fail the same way again
            PromptError::RequestFailed(msg) => {
                !msg.contains("401")
                    && !msg.contains("403")
                    && !msg.contains("400")
                    && !msg.contains("Invalid")
            }
            PromptError::InvalidResponse(_) => true,
            PromptError::Cancelled => false,
        }
    }
}

#[async_trait]
impl PromptPort for ResilientPromptClient {
    async fn execute(
        &self,
        request: GenericLlmRequest,
        cancel: CancellationToken,
    ) -> Result<PromptResponse, PromptError> {
        let calls = self.config.max_retries.saturating_add(1);
        let mut call = 1;
        loop {
            let error = match self.inner.execute(request.clone(), cancel.clone()).await {
                Ok(response) => {
                    if call > 1 {
                        tracing::info!(call, "Prompt request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(error) => error,
            };

            if !Self::is_retryable(&error) {
                if error != PromptError::Cancelled {
                    tracing::error!(error = %error, "Prompt request failed with non-retryable error");
                }
                return Err(error);
            }
            if call == calls {
                tracing::error!(calls, error = %error, "Prompt request failed on every call");
                return Err(error);
            }

            let delay = self.calculate_delay(call);
            tracing::warn!(call, calls, delay_ms = delay, error = %error, "Prompt request failed, backing off");
            tokio::select! {
                _ = cancel.cancelled() => return Err(PromptError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
            }
            call += 1;
        }
    }
}
