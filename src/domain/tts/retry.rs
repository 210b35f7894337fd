use super::error::TtsError;
use std::future::Future;
use std::time::Duration;

/// Retry policy shared by the blocking and streaming synthesis paths.
///
/// `attempts` is the number of *extra* tries after the first one; delays grow
/// linearly with the 1-based attempt number to avoid hammering the shared
/// remote endpoint after a transient failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts,
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt.max(1)
    }

    /// Run `op`, re-invoking it after each retryable failure until it
    /// succeeds or the attempt budget is exhausted. Non-retryable errors
    /// (validation, file) are returned immediately.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, TtsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TtsError>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt <= self.attempts && err.is_retryable() => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.attempts + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "synthesis attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
