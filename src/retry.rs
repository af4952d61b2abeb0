//! Fixed-delay retry helper.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::shutdown::{Cancelled, Shutdown};

/// How many attempts a retried call gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Keep trying until success or shutdown.
    Unbounded,
    /// Give up after this many attempts (at least one is always made).
    Bounded(u32),
}

impl RetryPolicy {
    fn allows(&self, attempt: u32) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded(max) => attempt <= (*max).max(1),
        }
    }
}

/// Why a retried call produced no value.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// A retry policy paired with the wait between attempts.
#[derive(Debug, Clone, Copy)]
pub struct Retry {
    pub policy: RetryPolicy,
    pub delay: Duration,
}

impl Retry {
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            policy: RetryPolicy::Unbounded,
            delay,
        }
    }

    pub fn bounded(attempts: u32, delay: Duration) -> Self {
        Self {
            policy: RetryPolicy::Bounded(attempts),
            delay,
        }
    }

    /// Run `op` until it succeeds, the policy runs out, or shutdown is requested.
    ///
    /// `op` receives the 1-based attempt number. Failures are logged under
    /// `what`; no wait follows the final bounded attempt.
    pub async fn run<T, E, F, Fut>(
        &self,
        what: &str,
        shutdown: &Shutdown,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            if shutdown.is_triggered() {
                return Err(Cancelled.into());
            }

            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            warn!(attempt, "Error {}: {}", what, err);

            if !self.policy.allows(attempt + 1) {
                error!("All retry attempts failed for {}", what);
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            warn!("Retrying {} in {} seconds...", what, self.delay.as_secs());
            shutdown.sleep(self.delay).await?;
            attempt += 1;
        }
    }
}
