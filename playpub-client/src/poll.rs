//! Status polling
//!
//! Polling is the primary way to follow a build: fetch the snapshot at a
//! fixed interval until the status is terminal.

use std::time::Duration;

use playpub_core::domain::build::BuildJob;
use tokio::time::Instant;
use uuid::Uuid;

use crate::PublisherClient;
use crate::error::{ClientError, Result};

/// How [`PublisherClient::wait_for_build`] polls
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Pause between two status reads
    pub interval: Duration,
    /// Consecutive transport failures tolerated before giving up
    pub max_transport_retries: u32,
    /// Overall deadline; `None` waits for as long as the build runs
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_transport_retries: 5,
            timeout: None,
        }
    }
}

/// Consecutive transport failures allowed while polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RetryBudget {
    max: u32,
    failures: u32,
}

impl RetryBudget {
    fn new(max: u32) -> Self {
        Self { max, failures: 0 }
    }

    /// Counts a failure; `false` once the budget is spent
    fn record_failure(&mut self) -> bool {
        if self.failures >= self.max {
            return false;
        }
        self.failures += 1;
        true
    }

    /// Any answer from the server starts the count over
    fn reset(&mut self) {
        self.failures = 0;
    }
}

impl PublisherClient {
    /// Poll a build until it is `COMPLETED` or `FAILED`
    ///
    /// `on_update` sees every snapshot read, including the final one.
    /// Transport errors are retried; any answer from the server that is an
    /// error (for example 404 after a delete) ends the wait.
    pub async fn wait_for_build<F>(
        &self,
        build_id: Uuid,
        options: &PollOptions,
        mut on_update: F,
    ) -> Result<BuildJob>
    where
        F: FnMut(&BuildJob),
    {
        let deadline = options.timeout.map(|t| Instant::now() + t);
        let mut retries = RetryBudget::new(options.max_transport_retries);

        loop {
            match self.get_build(build_id).await {
                Ok(job) => {
                    retries.reset();
                    tracing::debug!(
                        "Build {} is {} ({}%)",
                        build_id,
                        job.status,
                        job.progress
                    );
                    on_update(&job);

                    if job.is_terminal() {
                        return Ok(job);
                    }
                }
                Err(e) if e.is_transport() && retries.record_failure() => {
                    tracing::warn!(
                        "Polling build {} failed (attempt {}/{}): {}",
                        build_id,
                        retries.failures,
                        retries.max,
                        e
                    );
                }
                Err(e) => return Err(e),
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(ClientError::Timeout(build_id));
            }

            tokio::time::sleep(options.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_budget_runs_out() {
        let mut retries = RetryBudget::new(2);
        assert!(retries.record_failure());
        assert!(retries.record_failure());
        assert!(!retries.record_failure());
        assert_eq!(retries.failures, 2);
    }

    #[test]
    fn test_retry_budget_resets_after_success() {
        let mut retries = RetryBudget::new(2);
        for _ in 0..5 {
            assert!(retries.record_failure());
            assert!(retries.record_failure());
            retries.reset();
            assert_eq!(retries.failures, 0);
        }
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let mut retries = RetryBudget::new(0);
        assert!(!retries.record_failure());
    }
}
