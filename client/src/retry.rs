// Snapshot, decide, submit, and on contention start over
//
// Only contention errors are retried. Everything else is returned to the
// caller on the first occurrence.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use tokio::time::sleep;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    // same delay before every retry
    Fixed { delay_ms: u64 },
    // doubled before every retry, capped at `max_ms`
    Exponential { initial_ms: u64, max_ms: u64 },
}

impl Backoff {
    // Delay before retry number `retry` (1 for the first retry)
    pub fn delay(&self, retry: u32) -> Duration {
        let millis = match *self {
            Self::Fixed { delay_ms } => delay_ms,
            Self::Exponential { initial_ms, max_ms } => {
                let shift = retry.saturating_sub(1).min(63);
                initial_ms
                    .checked_mul(1u64 << shift)
                    .unwrap_or(max_ms)
                    .min(max_ms)
            }
        };
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    // total attempts, the first one included
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    // Single attempt, contention is returned as is
    pub fn none() -> Self {
        Self::new(1, Backoff::Fixed { delay_ms: 0 })
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(
            max_attempts,
            Backoff::Fixed {
                delay_ms: delay.as_millis() as u64,
            },
        )
    }

    /// Run `operation` until it succeeds, fails with a non contention error, or
    /// the attempt budget is spent.
    ///
    /// `operation` receives the attempt number, starting at 1. Every attempt must
    /// take a fresh snapshot of the shared state it depends on.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ClientError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded after {} attempts", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_contention() => {
                    if attempt >= max_attempts {
                        warn!("{} lost every race, giving up after {} attempts", label, attempt);
                        return Err(ClientError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let delay = self.backoff.delay(attempt);
                    if log::log_enabled!(log::Level::Warn) {
                        warn!(
                            "{} attempt {}/{} hit contention: {}, retrying in {:?}",
                            label, attempt, max_attempts, e, delay
                        );
                    }
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tasklane_common::crypto::Pubkey;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            initial_ms: 100,
            max_ms: 1_000,
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
        assert_eq!(backoff.delay(5), Duration::from_millis(1_000));
        assert_eq!(backoff.delay(200), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_contention_is_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));
        let result = policy
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(ClientError::SlotTaken {
                            queue: Pubkey::zero(),
                            slot: 0,
                        })
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::fixed(2, Duration::ZERO)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ClientError::SlotTaken {
                        queue: Pubkey::zero(),
                        slot: 1,
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(ClientError::RetriesExhausted { attempts: 2, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_preconditions_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::fixed(5, Duration::ZERO)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::QueueNotFound(Pubkey::zero())) }
            })
            .await;
        assert!(matches!(result, Err(ClientError::QueueNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
