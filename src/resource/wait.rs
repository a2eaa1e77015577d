//! Generic wait-for-state polling
//!
//! Every asynchronous lifecycle operation ends the same way: poll a refresh
//! function at a fixed interval until a target status appears or the overall
//! timeout elapses. [`StateWaiter`] is that loop, parameterized by the
//! pending/target status strings and the timing configuration, so the
//! per-resource code only supplies the refresh callback.

use crate::huawei::http::ApiError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Initial delay before the first refresh
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Minimum interval between refreshes
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(3);

/// Default overall timeout for create operations
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default overall timeout for delete operations
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timed out after {elapsed:.0?} waiting for state {target} (last state: {last})")]
    Timeout {
        elapsed: Duration,
        target: String,
        last: String,
    },

    #[error("unexpected state {0:?}")]
    UnexpectedState(String),

    #[error(transparent)]
    Refresh(#[from] ApiError),
}

/// Poll a refresh function until a target status is reached.
///
/// The refresh callback returns the resource's current representation (if
/// any) together with its status string. A status outside both the pending
/// and target sets is fatal, as is any refresh error.
pub struct StateWaiter<'a> {
    pending: &'a [&'a str],
    target: &'a [&'a str],
    delay: Duration,
    min_interval: Duration,
    timeout: Duration,
}

impl<'a> StateWaiter<'a> {
    pub fn new(pending: &'a [&'a str], target: &'a [&'a str]) -> Self {
        Self {
            pending,
            target,
            delay: DEFAULT_DELAY,
            min_interval: DEFAULT_MIN_INTERVAL,
            timeout: DEFAULT_CREATE_TIMEOUT,
        }
    }

    /// Set the overall timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the initial delay before the first refresh
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the minimum interval between refreshes
    pub fn min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Run the poll loop to completion.
    ///
    /// Returns the representation reported by the refresh that observed the
    /// target state (which may legitimately be `None`, e.g. a deleted
    /// resource no longer has one).
    pub async fn wait<T, F, Fut>(&self, mut refresh: F) -> Result<Option<T>, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(Option<T>, String), ApiError>>,
    {
        let start = Instant::now();
        tokio::time::sleep(self.delay).await;

        loop {
            let (value, state) = refresh().await?;

            if self.target.contains(&state.as_str()) {
                return Ok(value);
            }
            if !self.pending.contains(&state.as_str()) {
                return Err(WaitError::UnexpectedState(state));
            }

            let elapsed = start.elapsed();
            if elapsed + self.min_interval > self.timeout {
                tracing::warn!("Timed out waiting for {} (last state {})", self.target.join("/"), state);
                return Err(WaitError::Timeout {
                    elapsed,
                    target: self.target.join("/"),
                    last: state,
                });
            }

            tracing::debug!("State {} still pending, retrying in {:?}", state, self.min_interval);
            tokio::time::sleep(self.min_interval).await;
        }
    }
}
