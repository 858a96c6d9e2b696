//! Bounded retries with exponential backoff for remote calls that may fail transiently.

use core::future::Future;
use core::time::Duration;

use tokio::time::sleep;

pub use retry::{Error as RetryError, OperationResult as RetryResult};

// Default parameters for the retrying mechanism
pub const MAX_ATTEMPTS: usize = 5;
pub const BASE_DELAY: Duration = Duration::from_millis(400);
pub const BACKOFF_FACTOR: u32 = 2;
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Backoff delays which start at `delay` and are multiplied by `factor` at each step.
#[derive(Copy, Clone, Debug)]
pub struct ExponentialGrowth {
    delay: Duration,
    factor: u32,
}

impl ExponentialGrowth {
    pub const fn new(delay: Duration, factor: u32) -> Self {
        Self { delay, factor }
    }

    pub const fn clamp(self, max_delay: Duration, max_retries: usize) -> Clamped<Self> {
        Clamped::new(self, max_delay, max_retries)
    }
}

impl From<Duration> for ExponentialGrowth {
    fn from(delay: Duration) -> Self {
        Self::new(delay, BACKOFF_FACTOR)
    }
}

impl Iterator for ExponentialGrowth {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.delay;

        if let Some(next) = self.delay.checked_mul(self.factor) {
            self.delay = next;
        }

        Some(delay)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Clamped<S> {
    pub strategy: S,
    pub max_delay: Duration,
    pub max_retries: usize,
}

impl<S> Clamped<S> {
    pub const fn new(strategy: S, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            strategy,
            max_delay,
            max_retries,
        }
    }

    pub fn iter(self) -> impl Iterator<Item = Duration>
    where
        S: Iterator<Item = Duration>,
    {
        let Self {
            strategy,
            max_retries,
            max_delay,
        } = self;

        strategy
            .take(max_retries)
            .map(move |delay| delay.min(max_delay))
    }
}

/// Executes an operation up to a fixed number of attempts, sleeping with
/// exponential backoff between attempts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: BASE_DELAY,
            max_delay: MAX_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: MAX_RETRY_DELAY,
        }
    }

    /// The delays slept between consecutive attempts, one fewer than the attempt budget.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialGrowth::from(self.base_delay)
            .clamp(self.max_delay, self.max_attempts.saturating_sub(1))
            .iter()
    }

    /// Runs `operation` until it succeeds, fails with a terminal error, or the
    /// attempt budget is exhausted, in which case only the last error is reported.
    ///
    /// `notify` is called with the 1-based attempt number and the error of every
    /// failed attempt that will be retried.
    pub async fn retry_async<T, E, F, Fut, N>(
        &self,
        mut operation: F,
        mut notify: N,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = RetryResult<T, E>>,
        N: FnMut(usize, &E),
    {
        let mut delays = self.delays();
        let mut total_delay = Duration::ZERO;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match operation(attempt).await {
                RetryResult::Ok(value) => return Ok(value),
                RetryResult::Err(error) => {
                    return Err(RetryError {
                        error,
                        total_delay,
                        tries: attempt as u64,
                    })
                }
                RetryResult::Retry(error) => error,
            };

            match delays.next() {
                Some(delay) => {
                    notify(attempt, &error);
                    sleep(delay).await;
                    total_delay += delay;
                }
                None => {
                    return Err(RetryError {
                        error,
                        total_delay,
                        tries: attempt as u64,
                    })
                }
            }
        }
    }
}
