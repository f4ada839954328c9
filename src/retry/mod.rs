//! Retry controller: error classification and exponential backoff
//!
//! The controller supervises a whole operation rather than one request. A
//! caller runs its loop, hands each failure to [`RetryController::decide`],
//! and either sleeps and resumes or gives up with the decision it receives.
//!
//! ```rust,ignore
//! let mut controller = RetryController::new(&policy);
//! loop {
//!     match fetch_remaining_pages().await {
//!         Ok(()) => break,
//!         Err(err) => match controller.decide(&err, progressed) {
//!             RetryDecision::Retry { delay, .. } => controller.wait(delay, &cancel).await?,
//!             _ => return Err(err),
//!         },
//!     }
//! }
//! ```

pub mod classify;
pub mod policy;

pub use classify::{Classify, ErrorClass, NetworkFailure, RpcCode};
pub use policy::{PolicyError, RetryPolicy};

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What to do with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then start attempt number `attempt` (1-based)
    Retry { attempt: u32, delay: Duration },
    /// Transient failure but the attempt budget is spent
    Exhausted { attempts: u32 },
    Fatal,
    Cancelled,
}

/// Returned by [`RetryController::wait`] when the caller cancels mid-sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Error produced by [`RetryPolicy::run`]
#[derive(Debug)]
pub enum RetryError<E> {
    Exhausted { attempts: u32, last: E },
    Fatal(E),
    Cancelled,
}

/// Mutable attempt bookkeeping for one supervised operation
#[derive(Debug)]
pub struct RetryController<'a> {
    policy: &'a RetryPolicy,
    failures: u32,
}

impl<'a> RetryController<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Consecutive failures without progress so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Decide how to continue after `error`.
    ///
    /// `progressed` tells the controller the failed attempt completed at least
    /// one unit of work; the budget then starts over because the next attempt
    /// resumes from that point instead of repeating it.
    pub fn decide<E: Classify>(&mut self, error: &E, progressed: bool) -> RetryDecision {
        match error.class() {
            ErrorClass::Fatal => RetryDecision::Fatal,
            ErrorClass::Cancellation => RetryDecision::Cancelled,
            ErrorClass::Retryable => {
                if progressed {
                    self.failures = 0;
                }
                self.failures += 1;

                if self.failures >= self.policy.max_attempts {
                    return RetryDecision::Exhausted {
                        attempts: self.failures,
                    };
                }

                RetryDecision::Retry {
                    attempt: self.failures,
                    delay: self.policy.delay_for(self.failures - 1),
                }
            }
        }
    }

    /// Sleep for `delay` unless the token fires first
    pub async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
        tokio::select! {
            _ = cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

impl RetryPolicy {
    /// Run a self-contained operation under this policy.
    ///
    /// Each attempt is bounded by [`RetryPolicy::attempt_timeout`]; a timed-out
    /// attempt counts as retryable via `on_timeout`.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        on_timeout: impl Fn() -> E,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Classify + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut controller = RetryController::new(self);

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                result = tokio::time::timeout(self.attempt_timeout(), operation()) => {
                    result.unwrap_or_else(|_| Err(on_timeout()))
                }
            };

            let error = match outcome {
                Ok(value) => {
                    if controller.failures() > 0 {
                        debug!(attempts = controller.failures() + 1, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            match controller.decide(&error, false) {
                RetryDecision::Retry { attempt, delay } => {
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Transient failure, retrying");
                    if controller.wait(delay, cancel).await.is_err() {
                        return Err(RetryError::Cancelled);
                    }
                }
                RetryDecision::Exhausted { attempts } => {
                    warn!(attempts, error = %error, "Retries exhausted");
                    return Err(RetryError::Exhausted {
                        attempts,
                        last: error,
                    });
                }
                RetryDecision::Fatal => return Err(RetryError::Fatal(error)),
                RetryDecision::Cancelled => return Err(RetryError::Cancelled),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        RateLimited,
        DeadlineExceeded,
        Cancelled,
        BadRequest,
    }

    impl Classify for TestError {
        fn class(&self) -> ErrorClass {
            match self {
                TestError::RateLimited => classify::classify_http_status(429),
                TestError::DeadlineExceeded => classify::classify_rpc_code(RpcCode::DeadlineExceeded),
                TestError::Cancelled => ErrorClass::Cancellation,
                TestError::BadRequest => classify::classify_http_status(400),
            }
        }
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(5), 2.0, max_attempts).unwrap()
    }

    #[test]
    fn test_rate_limit_and_deadline_are_retried() {
        let policy = fast_policy(5);
        let mut controller = RetryController::new(&policy);

        assert!(matches!(
            controller.decide(&TestError::RateLimited, false),
            RetryDecision::Retry { attempt: 1, .. }
        ));
        assert!(matches!(
            controller.decide(&TestError::DeadlineExceeded, false),
            RetryDecision::Retry { attempt: 2, .. }
        ));
    }

    #[test]
    fn test_cancellation_is_never_retried() {
        let policy = fast_policy(5);
        let mut controller = RetryController::new(&policy);
        assert_eq!(
            controller.decide(&TestError::Cancelled, false),
            RetryDecision::Cancelled
        );
        assert_eq!(controller.failures(), 0);
    }

    #[test]
    fn test_fatal_errors_stop_immediately() {
        let policy = fast_policy(5);
        let mut controller = RetryController::new(&policy);
        assert_eq!(controller.decide(&TestError::BadRequest, false), RetryDecision::Fatal);
    }

    #[test]
    fn test_budget_exhaustion_and_progress_reset() {
        let policy = fast_policy(3);
        let mut controller = RetryController::new(&policy);

        assert!(matches!(controller.decide(&TestError::RateLimited, false), RetryDecision::Retry { .. }));
        assert!(matches!(controller.decide(&TestError::RateLimited, false), RetryDecision::Retry { .. }));
        // Progress restarts the budget
        assert!(matches!(
            controller.decide(&TestError::RateLimited, true),
            RetryDecision::Retry { attempt: 1, .. }
        ));
        assert!(matches!(controller.decide(&TestError::RateLimited, false), RetryDecision::Retry { .. }));
        assert_eq!(
            controller.decide(&TestError::RateLimited, false),
            RetryDecision::Exhausted { attempts: 3 }
        );
    }

    #[tokio::test]
    async fn test_run_recovers_from_transient_errors() {
        let policy = fast_policy(5);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = policy
            .run(&cancel, || TestError::DeadlineExceeded, || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 2 {
                        Err(TestError::RateLimited)
                    } else {
                        Ok(call)
                    }
                }
            })
            .await;

        assert!(matches!(result, Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_exhausts_with_last_cause() {
        let policy = fast_policy(2);
        let cancel = CancellationToken::new();

        let result: Result<(), _> = policy
            .run(&cancel, || TestError::DeadlineExceeded, || async { Err(TestError::RateLimited) })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted {
                attempts: 2,
                last: TestError::RateLimited
            })
        ));
    }

    #[tokio::test]
    async fn test_wait_returns_on_cancel() {
        let policy = RetryPolicy::default();
        let controller = RetryController::new(&policy);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = controller.wait(Duration::from_secs(3600), &cancel).await;
        assert_eq!(result, Err(Cancelled));
    }
}
