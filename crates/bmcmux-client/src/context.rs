//! Per-call deadline and cancellation
//!
//! A [`CallContext`] carries an optional deadline, a cancellation token and an
//! optional explicit per-provider timeout. Sub-contexts derived from it are
//! bounded by its deadline and cancelled with it. Work runs under a context
//! through [`CallContext::run`], which drops the future once the context is
//! done.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped accepting work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("call canceled")]
    Canceled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Deadline, cancellation and timeout override for one call
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    token: CancellationToken,
    per_provider_timeout: Option<Duration>,
}

impl CallContext {
    /// A context with no deadline that is never cancelled unless asked to
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }

    /// Give every provider attempt exactly `timeout`, ignoring the deadline split
    pub fn with_per_provider_timeout(mut self, timeout: Duration) -> Self {
        self.per_provider_timeout = Some(timeout);
        self
    }

    /// Cancel this context together with `token`
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn per_provider_timeout(&self) -> Option<Duration> {
        self.per_provider_timeout
    }

    /// Time left before the deadline, zero once it passed
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel this context and every sub-context
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Why this context is done, or `None` while it still accepts work
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// A child bounded by both this context's deadline and `timeout` from now
    pub fn sub_context(&self, timeout: Duration) -> CallContext {
        let attempt_deadline = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) => parent.min(attempt_deadline),
            None => attempt_deadline,
        };
        CallContext {
            deadline: Some(deadline),
            token: self.token.child_token(),
            per_provider_timeout: self.per_provider_timeout,
        }
    }

    /// Drive `fut` until it completes or this context is done
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }

        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ContextError::Canceled),
            _ = expiry => Err(ContextError::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }

    /// Sleep for `duration` unless the context ends first
    pub async fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        self.run(tokio::time::sleep(duration)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_background_never_expires() {
        let ctx = CallContext::background();
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert!(ctx.err().is_none());
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = CallContext::with_timeout(Duration::from_secs(1));
        assert_eq!(ctx.remaining(), Some(Duration::from_secs(1)));

        let result = ctx.run(std::future::pending::<()>()).await;
        assert_eq!(result, Err(ContextError::DeadlineExceeded));
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_run() {
        let ctx = CallContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = ctx.run(std::future::pending::<()>()).await;
        assert_eq!(result, Err(ContextError::Canceled));
        assert!(ctx.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_context_runs_nothing() {
        let ctx = CallContext::background();
        ctx.cancel();
        let result = ctx.run(async { unreachable!("must not be polled") }).await;
        assert_eq!(result, Err::<(), _>(ContextError::Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_context_bounded_by_parent() {
        let parent = CallContext::with_timeout(Duration::from_secs(2));

        let short = parent.sub_context(Duration::from_secs(1));
        assert_eq!(short.remaining(), Some(Duration::from_secs(1)));

        let long = parent.sub_context(Duration::from_secs(10));
        assert_eq!(long.remaining(), Some(Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_context_cancelled_with_parent() {
        let parent = CallContext::background();
        let child = parent.sub_context(Duration::from_secs(30));
        parent.cancel();
        assert_eq!(child.err(), Some(ContextError::Canceled));

        // Cancelling a child leaves the parent alone
        let parent = CallContext::background();
        let child = parent.sub_context(Duration::from_secs(30));
        child.cancel();
        assert!(parent.err().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_respects_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_secs(1));
        assert!(ctx.sleep(Duration::from_millis(500)).await.is_ok());
        assert_eq!(
            ctx.sleep(Duration::from_secs(5)).await,
            Err(ContextError::DeadlineExceeded)
        );
    }

    #[test]
    fn test_per_provider_override() {
        let ctx = CallContext::background().with_per_provider_timeout(Duration::from_secs(3));
        assert_eq!(ctx.per_provider_timeout(), Some(Duration::from_secs(3)));
    }
}
