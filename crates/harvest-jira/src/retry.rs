//! Retry with exponential backoff for transient source failures.

use std::time::Duration;

use tracing::warn;

use crate::source::{Result, SourceError};

/// Upper bound on any single wait.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based). A server-provided
    /// `Retry-After` wins when present.
    pub fn delay_for(&self, attempt: u32, err: &SourceError) -> Duration {
        if let SourceError::RateLimited {
            retry_after: Some(after),
        } = err
        {
            return (*after).min(MAX_BACKOFF);
        }
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Runs `op` until it succeeds, fails permanently, or retries run out.
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt, &e);
                    warn!(
                        what,
                        attempt = attempt + 1,
                        max = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient source failure, retrying"
                    );
                    sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
