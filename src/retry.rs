use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, warn};

use crate::config::ProviderSettings;
use crate::provider::ImageProvider;
use crate::tracker::AttemptOutcome;
use crate::types::{GenerationRequest, GenerationResult};

/// Bounded attempts against one provider with linear backoff (`retry_delay * attempt`).
///
/// Every failure category is retried the same way; rate limits are not special-cased.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self::new(settings.max_retries, settings.retry_delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay slept after the 1-based `attempt` failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }

    /// Runs the provider until it succeeds or the attempts run out. Errors and panics
    /// raised by the provider never escape; `observe` sees every single attempt.
    pub async fn run(
        &self,
        provider: &dyn ImageProvider,
        request: &GenerationRequest,
        mut observe: impl FnMut(Duration, AttemptOutcome),
    ) -> GenerationResult {
        let max_attempts = self.max_attempts();
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            let span = tracing::info_span!(
                "imagegen.retry_attempt",
                provider = provider.name(),
                attempt,
                max_attempts
            );

            let prepared = provider.preprocess(request);
            let started = Instant::now();
            let outcome = AssertUnwindSafe(provider.generate(&prepared))
                .catch_unwind()
                .instrument(span)
                .await;
            let elapsed = started.elapsed();

            match outcome {
                Ok(Ok(result)) if result.is_success() => {
                    observe(elapsed, AttemptOutcome::Success);
                    if attempt > 1 {
                        info!(provider = provider.name(), attempt, "generation succeeded after retry");
                    }
                    return result;
                }
                Ok(Ok(result)) => {
                    observe(elapsed, AttemptOutcome::Failure);
                    last_error = result
                        .error_message
                        .unwrap_or_else(|| "provider returned no image".to_string());
                }
                Ok(Err(err)) => {
                    observe(elapsed, AttemptOutcome::Error);
                    last_error = err.to_string();
                }
                Err(panic) => {
                    observe(elapsed, AttemptOutcome::Error);
                    last_error = format!("provider panicked: {}", panic_message(panic.as_ref()));
                }
            }

            if attempt < max_attempts {
                let delay = self.delay_after(attempt);
                warn!(
                    provider = provider.name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "generation attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            } else {
                debug!(provider = provider.name(), attempt, "generation attempts exhausted");
            }
        }

        GenerationResult::failure(format!(
            "failed after {max_attempts} attempts: {last_error}"
        ))
        .with_metadata("provider", provider.name())
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
