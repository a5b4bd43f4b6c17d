//! Cancellable, deadline-bearing execution context.
//!
//! Every datastore operation takes a [`Context`]. The querier races the
//! SQL call against the context: whichever of cancellation, deadline, or
//! completion happens first decides the outcome.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::QueryError;

/// Execution context for a datastore call.
///
/// Cloning a context shares its cancellation: cancelling any clone cancels
/// them all. Use [`Context::child`] for a context that is cancelled with its
/// parent but can also be cancelled on its own.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl Context {
    /// A context with no deadline that is never cancelled unless asked to.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            token: CancellationToken::new(),
        }
    }

    /// A child context: inherits the deadline and is cancelled together
    /// with `self`.
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            token: self.token.child_token(),
        }
    }

    /// A child context whose deadline is the earlier of the parent's and
    /// `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            deadline: Some(match self.deadline {
                Some(parent) if parent < candidate => parent,
                _ => candidate,
            }),
            token: self.token.child_token(),
        }
    }

    /// Cancels this context and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails fast when the context is already cancelled or expired.
    pub fn check(&self) -> Result<(), QueryError> {
        if self.token.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        if matches!(self.deadline, Some(d) if Instant::now() >= d) {
            return Err(QueryError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drives `fut` to completion unless the context is cancelled or its
    /// deadline passes first. Dropping `fut` is the only cancellation it
    /// receives; callers with blocking work must stop it themselves.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, QueryError>
    where
        F: Future<Output = Result<T, QueryError>>,
    {
        self.check()?;

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(QueryError::Cancelled),
            () = expired => Err(QueryError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_runs_to_completion() {
        let ctx = Context::background();
        let value = ctx.run(async { Ok::<_, QueryError>(7) }).await.expect("should complete");
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn cancelled_context_fails_before_running() {
        let ctx = Context::background();
        ctx.cancel();
        let err = ctx
            .run(async { Ok::<_, QueryError>(()) })
            .await
            .expect_err("cancelled context should fail");
        assert!(matches!(err, QueryError::Cancelled));
    }

    #[tokio::test]
    async fn deadline_interrupts_slow_work() {
        let ctx = Context::with_timeout(Duration::from_millis(20));
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, QueryError>(())
            })
            .await
            .expect_err("deadline should fire first");
        assert!(matches!(err, QueryError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn child_is_cancelled_with_parent_but_not_the_reverse() {
        let parent = Context::background();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn child_deadline_never_extends_parent() {
        let parent = Context::with_timeout(Duration::from_secs(1));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());

        let shorter = parent.child_with_timeout(Duration::from_millis(10));
        assert!(shorter.deadline() < parent.deadline());
    }
}
