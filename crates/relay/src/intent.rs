use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum spacing the external classifier tolerates between calls.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(400);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IntentError {
    #[error("intent detection failed: {0}")]
    Detect(String),
}

/// External natural-language classifier. The session identity is derived
/// from the caller: `user_id * 10 + channel_id`.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn detect_intent(
        &self,
        text: &str,
        user_id: i64,
        channel_id: i64,
    ) -> Result<String, IntentError>;
}

pub fn session_key(user_id: i64, channel_id: i64) -> i64 {
    user_id * 10 + channel_id
}

/// Shared, mutually-exclusive timing gate: every caller waits on the same
/// lock, so requests across all users are spaced by at least the interval.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_request: Mutex::new(None) }
    }

    /// Suspends until the interval since the previous request has passed,
    /// then claims the slot. The lock is held across the sleep on purpose:
    /// concurrent callers queue behind it instead of racing the timestamp.
    pub async fn wait_before_request(&self) {
        let mut last_request = self.last_request.lock().await;
        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(MIN_REQUEST_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{session_key, RateLimiter};

    #[test]
    fn session_key_folds_channel_into_user() {
        assert_eq!(session_key(42, 0), 420);
        assert_eq!(session_key(42, 3), 423);
    }

    #[tokio::test]
    async fn consecutive_requests_are_spaced_by_the_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();

        limiter.wait_before_request().await;
        limiter.wait_before_request().await;
        limiter.wait_before_request().await;

        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn gate_is_shared_across_concurrent_callers() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(40)));
        let start = Instant::now();

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.wait_before_request().await })
            })
            .collect();
        for task in tasks {
            task.await.expect("task");
        }

        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
