//! A deadline-bounded retry policy for chain operations
//!
//! Every attempt is bounded by its own timeout, clamped to the time remaining
//! before the policy's deadline, and attempts are separated by a uniformly
//! random backoff. No attempt is started once the deadline has passed, so an
//! operation wrapped in a policy can never overrun the cycle that owns it.

use std::{future::Future, time::Duration};

use rand::Rng;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::error::{UpdaterError, UpdaterResult};

/// The timeout of a single attempt
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);
/// The upper bound of the random backoff between attempts
pub const MAX_BACKOFF: Duration = Duration::from_millis(2_500);

/// A retry policy bounded by an absolute deadline
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// The maximum number of attempts, unbounded if `None`
    max_attempts: Option<usize>,
    /// The instant after which no attempt is started
    deadline: Instant,
}

impl RetryPolicy {
    /// A policy that retries until the given deadline
    pub fn until(deadline: Instant) -> Self {
        Self { max_attempts: None, deadline }
    }

    /// A policy that retries for at most `total` from now
    pub fn with_total_timeout(total: Duration) -> Self {
        Self::until(Instant::now() + total)
    }

    /// Bound the number of attempts
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// The time remaining before the deadline
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Run the operation under the policy
    ///
    /// Returns the first successful result, the last attempt's error when the
    /// attempt limit is reached, or a timeout error when the deadline passes.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> UpdaterResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = UpdaterResult<T>>,
    {
        let mut attempts = 0usize;
        loop {
            let remaining = self.remaining();
            if remaining.is_zero() {
                return Err(UpdaterError::timeout(format!(
                    "{label}: no time left after {attempts} attempts"
                )));
            }

            attempts += 1;
            let attempt_timeout = ATTEMPT_TIMEOUT.min(remaining);
            let err = match timeout(attempt_timeout, op()).await {
                Ok(Ok(res)) => return Ok(res),
                Ok(Err(e)) => e,
                Err(_) => UpdaterError::timeout(format!(
                    "{label}: attempt {attempts} timed out after {attempt_timeout:?}"
                )),
            };

            debug!("{label}: attempt {attempts} failed: {err}");
            if self.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(err);
            }

            let delay = random_backoff();
            if Instant::now() + delay >= self.deadline {
                return Err(UpdaterError::timeout(format!(
                    "{label}: deadline reached after {attempts} attempts, last error: {err}"
                )));
            }
            sleep(delay).await;
        }
    }
}

/// Sample a backoff delay, uniform in `[0, MAX_BACKOFF]`
fn random_backoff() -> Duration {
    rand::thread_rng().gen_range(Duration::ZERO..=MAX_BACKOFF)
}
