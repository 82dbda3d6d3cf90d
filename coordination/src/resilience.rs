//! Resilience: bounded retry for flaky model calls.
//!
//! A call that fails with a retriable error is attempted again after a fixed
//! delay, up to `max_attempts` total attempts. Non-retriable errors fail
//! immediately.
//!
//! # Usage
//!
//! ```rust,ignore
//! use coordination::resilience::RetryPolicy;
//!
//! let policy = RetryPolicy::default(); // 3 attempts, 1s apart
//! let reply = policy.run("analyst", |_attempt| client.chat(&messages, true)).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Classifies an error as worth retrying.
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1).
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    /// Single attempt, no delay.
    pub fn none() -> Self {
        Self::new(1, 0)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Run `op` until it succeeds, fails non-retriably, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retriable + std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_retriable() || attempt >= max_attempts {
                        return Err(e);
                    }
                    warn!(
                        call = label,
                        attempt,
                        max_attempts,
                        delay_ms = self.delay_ms,
                        error = %e,
                        "Transient error: retrying"
                    );
                    tokio::time::sleep(self.delay()).await;
                    attempt += 1;
                }
            }
        }
    }
}
