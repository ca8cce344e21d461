//! Batch-wide cancellation signal
//!
//! A single [`Deadline`] is created before dispatch starts and cloned into every worker. All
//! blocking steps of the batch (admission, the remote copy, the visibility wait, listing pages)
//! are raced against it with [`Deadline::run`]; once the deadline fires every one of them resolves
//! with [`DeadlineExceeded`] and the racing future is dropped, aborting the underlying request.
//!
//! The deadline fires either when the configured timeout elapses or on an explicit
//! [`Deadline::cancel`]. Firing is irreversible.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeadlineExceeded {
    #[error("batch timeout of {0:?} exceeded")]
    TimedOut(std::time::Duration),
    #[error("batch was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Deadline {
    token: CancellationToken,
    expiry: Option<(tokio::time::Instant, std::time::Duration)>,
}

/// Converts the `--timeout` value into an optional duration; zero or negative disables it.
#[must_use]
pub fn timeout_from_secs(secs: i64) -> Option<std::time::Duration> {
    u64::try_from(secs)
        .ok()
        .filter(|secs| *secs > 0)
        .map(std::time::Duration::from_secs)
}

impl Deadline {
    /// Starts the clock. With `None` (or a zero duration) only [`Deadline::cancel`] can fire it.
    #[must_use]
    pub fn start(timeout: Option<std::time::Duration>) -> Self {
        let expiry = timeout
            .filter(|timeout| !timeout.is_zero())
            .map(|timeout| (tokio::time::Instant::now() + timeout, timeout));
        if let Some((_, timeout)) = expiry {
            tracing::debug!("batch deadline set to {:?} from now", timeout);
        }
        Self {
            token: CancellationToken::new(),
            expiry,
        }
    }

    /// Deadline that never fires on its own.
    #[must_use]
    pub fn none() -> Self {
        Self::start(None)
    }

    /// Fires the deadline for every clone.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
            || self
                .expiry
                .is_some_and(|(at, _)| tokio::time::Instant::now() >= at)
    }

    fn reason(&self) -> DeadlineExceeded {
        match self.expiry {
            Some((at, timeout)) if tokio::time::Instant::now() >= at => {
                DeadlineExceeded::TimedOut(timeout)
            }
            _ => DeadlineExceeded::Cancelled,
        }
    }

    /// Resolves once the deadline fires.
    pub async fn expired(&self) -> DeadlineExceeded {
        match self.expiry {
            Some((at, timeout)) => {
                tokio::select! {
                    _ = self.token.cancelled() => self.reason(),
                    _ = tokio::time::sleep_until(at) => {
                        // make the expiry visible to observers that only check the token
                        self.token.cancel();
                        DeadlineExceeded::TimedOut(timeout)
                    }
                }
            }
            None => {
                self.token.cancelled().await;
                DeadlineExceeded::Cancelled
            }
        }
    }

    /// Runs `fut` unless the deadline fires first. An already expired deadline refuses to start
    /// `fut` at all.
    pub async fn run<F: std::future::Future>(&self, fut: F) -> Result<F::Output, DeadlineExceeded> {
        if self.is_expired() {
            return Err(self.reason());
        }
        tokio::select! {
            biased;
            reason = self.expired() => Err(reason),
            output = fut => Ok(output),
        }
    }
}
