//! Bounded connection retry used while a process starts up.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// How often and how patiently to try reaching the broker at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootPolicy {
    attempts: u32,
    backoff: Duration,
}

impl BootPolicy {
    /// Creates a policy making at most `attempts` tries, `backoff` apart.
    ///
    /// At least one attempt is always made.
    pub fn fixed(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Maximum number of attempts.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Pause between two attempts.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

impl Default for BootPolicy {
    fn default() -> Self {
        Self::fixed(30, Duration::from_secs(1))
    }
}

/// Startup gave up.
#[derive(Debug, Error)]
#[error("broker not ready after {attempts} attempts: {last}")]
pub struct BootError<E>
where
    E: std::error::Error + 'static,
{
    /// Attempts made.
    pub attempts: u32,
    /// Error of the final attempt.
    #[source]
    pub last: E,
}

/// Runs `connect` until it succeeds or `policy` is exhausted.
///
/// `connect` receives the 1-based attempt number. Returns the first
/// successful value together with the attempt that produced it.
pub async fn boot<T, E, F, Fut>(
    policy: &BootPolicy,
    mut connect: F,
) -> Result<(T, u32), BootError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + fmt::Display + 'static,
{
    let mut attempt = 1;
    loop {
        match connect(attempt).await {
            Ok(value) => {
                #[cfg(feature = "tracing")]
                debug!(attempt, "Broker ready");
                return Ok((value, attempt));
            }
            Err(last) if attempt >= policy.attempts => {
                return Err(BootError {
                    attempts: attempt,
                    last,
                });
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                warn!(
                    attempt,
                    max_attempts = policy.attempts,
                    backoff_ms = policy.backoff.as_millis() as u64,
                    error = %_err,
                    "Broker not ready, retrying"
                );
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
        }
    }
}
