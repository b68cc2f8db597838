//! Backoff retries for guaranteed-tracking writes.
//!
//! Waiting goes through [`RetryScheduler`] so tests can substitute a
//! scheduler that records delays instead of sleeping. Waits are plain
//! futures: dropping the caller's future cancels any pending retry.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use trail_core::config::RetryConfig;

/// Source of retry delays.
#[async_trait]
pub trait RetryScheduler: Send + Sync {
    /// Complete after `delay` has elapsed.
    async fn wait(&self, delay: Duration);
}

/// Scheduler backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[async_trait]
impl RetryScheduler for TokioScheduler {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Retry count and linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts made after the initial failure.
    pub max_attempts: u32,
    /// Attempt `n` waits `base_delay * n`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
        }
    }
}

/// Run `op` for attempts `1..=max_attempts`, waiting before each one, until it
/// reports success.
///
/// Returns the attempt that succeeded, or `None` when all of them failed.
pub async fn retry_with_backoff<F, Fut>(
    policy: &RetryPolicy,
    scheduler: &dyn RetryScheduler,
    mut op: F,
) -> Option<u32>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=policy.max_attempts {
        scheduler.wait(policy.delay_for(attempt)).await;
        if op(attempt).await {
            return Some(attempt);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingScheduler {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl RetryScheduler for RecordingScheduler {
        async fn wait(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }
    }

    #[test]
    fn default_policy_matches_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn stops_on_first_success() {
        let scheduler = RecordingScheduler::default();
        let result = retry_with_backoff(&RetryPolicy::default(), &scheduler, |attempt| async move {
            attempt == 2
        })
        .await;

        assert_eq!(result, Some(2));
        assert_eq!(
            *scheduler.delays.lock().unwrap(),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[tokio::test]
    async fn exhausts_all_attempts() {
        let scheduler = RecordingScheduler::default();
        let mut seen = Vec::new();
        let result = retry_with_backoff(&RetryPolicy::default(), &scheduler, |attempt| {
            seen.push(attempt);
            async { false }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(scheduler.delays.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn tokio_scheduler_waits() {
        let started = tokio::time::Instant::now();
        TokioScheduler.wait(Duration::from_millis(5)).await;
        assert!(started.elapsed() >= Duration::from_millis(5));
    }
}
