//! Bounded exponential backoff for reconnecting to the queue service and the
//! store (§7 category 3: transient infrastructure, recovered by the caller).

use std::time::Duration;

use tracing::warn;

/// Reconnect policy: delay doubles after every failed attempt, capped at
/// `max_delay`, with a hard ceiling of `max_attempts` before giving up.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            max_attempts: 8,
        }
    }
}

impl ReconnectPolicy {
    /// Calls `connect` until it succeeds or `max_attempts` is reached. On
    /// the final attempt the underlying error is returned to the caller
    /// rather than swallowed.
    pub async fn retry<T, E, F, Fut>(&self, mut connect: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut delay = self.initial_delay;
        for attempt in 1..=self.max_attempts {
            match connect().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt == self.max_attempts => return Err(err),
                Err(err) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "connection attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.max_delay);
                }
            }
        }
        unreachable!("loop always returns on its final iteration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retrying_when_the_first_attempt_works() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            max_attempts: 3,
        };
        let attempts = AtomicU32::new(0);
        let result: Result<u32, String> = policy
            .retry(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            max_attempts: 3,
        };
        let attempts = AtomicU32::new(0);
        let result: Result<u32, String> = policy
            .retry(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("connection refused".to_string()) }
            })
            .await;
        assert_eq!(result.unwrap_err(), "connection refused");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recovers_after_a_transient_failure() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            max_attempts: 5,
        };
        let attempts = AtomicU32::new(0);
        let result: Result<u32, String> = policy
            .retry(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 2 {
                        Err("not yet".to_string())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
