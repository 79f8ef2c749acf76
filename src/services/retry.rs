//! Bounded retry with a pluggable backoff and retryability predicate.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

type BackoffFn = dyn Fn(u32) -> Duration + Send + Sync;
type RetryableFn<E> = dyn Fn(&E) -> bool + Send + Sync;

fn always_retry<E>(_: &E) -> bool {
    true
}

pub struct RetryPolicy<E> {
    max_attempts: u32,
    backoff: Box<BackoffFn>,
    retryable: Box<RetryableFn<E>>,
}

impl<E: Display + 'static> RetryPolicy<E> {
    /// `max_attempts` tries in total, sleeping `step * attempt` after each
    /// failed attempt. Every error is retryable until narrowed with [`Self::retry_if`].
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Box::new(move |attempt| step * attempt),
            retryable: Box::new(always_retry::<E>),
        }
    }

    pub fn retry_if(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.retryable = Box::new(predicate);
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error or
    /// the attempts are used up. The last error is returned.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && (self.retryable)(&e) => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        "Operation failed: {}. Retrying in {:?} (attempt {}/{})",
                        e,
                        delay,
                        attempt,
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("Operation failed after {} attempt(s): {}", attempt, e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    #[test]
    fn linear_backoff_grows_per_attempt() {
        let policy: RetryPolicy<TestError> = RetryPolicy::linear(3, Duration::from_millis(1000));
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(RetryPolicy::<TestError>::linear(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn recovers_from_transient_failures() {
        let policy = RetryPolicy::linear(3, Duration::ZERO);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = policy
            .run(move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::linear(3, Duration::ZERO);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), _> = policy
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Transient)
            })
            .await;

        assert_eq!(result, Err(TestError::Transient));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let policy = RetryPolicy::linear(5, Duration::ZERO)
            .retry_if(|e: &TestError| *e == TestError::Transient);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), _> = policy
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Fatal)
            })
            .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
