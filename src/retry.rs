//! Bounded-backoff retry for transient contention.
//!
//! Conditional updates can lose to serialization conflicts under load;
//! those are retried a bounded number of times with exponential delay.
//! Domain-level rejections are never retried here.

use std::future::Future;
use std::time::Duration;

/// Default attempt budget for contended operations
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between attempts
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(25);

/// Errors that can distinguish transient contention from domain rejections
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for crate::store::StoreError {
    fn is_transient(&self) -> bool {
        self.is_transient()
    }
}

impl Retryable for crate::ledger::LedgerError {
    fn is_transient(&self) -> bool {
        self.is_transient()
    }
}

/// Run `op`, retrying transient failures up to `max_attempts` times with
/// exponential backoff starting at `base_delay`. The final error is
/// returned unchanged once the budget is exhausted.
pub async fn with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = base_delay * 2u32.saturating_pow(attempt - 1);
                log::debug!("transient failure (attempt {attempt}/{max_attempts}): {err}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Run `op` with the default retry budget
pub async fn with_default_backoff<T, E, F, Fut>(op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_backoff(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY, op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (transient: {})", self.transient)
        }
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> =
            with_backoff(3, Duration::from_millis(1), || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError { transient: true })
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_domain_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> =
            with_backoff(3, Duration::from_millis(1), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError { transient: false })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> =
            with_backoff(3, Duration::from_millis(1), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError { transient: true })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
