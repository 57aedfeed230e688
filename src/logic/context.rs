use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;

/// Cancellation and deadline scope of a single request
#[derive(Debug, Clone)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(cancel: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            cancel,
            deadline: timeout.map(|timeout| Instant::now() + timeout),
        }
    }

    /// A context that is never canceled and has no deadline
    pub fn background() -> Self {
        Self::new(CancellationToken::new(), None)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Drive `work` to completion unless the request is canceled or its
    /// deadline passes first; the unfinished future is dropped in that case.
    pub async fn run<F, T>(&self, work: F) -> Result<T, ApiError>
    where
        F: Future<Output = T>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ApiError::Canceled),
            _ = deadline => Err(ApiError::DeadlineExceeded),
            output = work => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_without_interference() {
        let ctx = RequestContext::background();
        assert_eq!(ctx.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_pending_work() {
        let ctx = RequestContext::background();
        ctx.cancel_token().cancel();
        let result = ctx.run(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(ApiError::Canceled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let ctx = RequestContext::new(CancellationToken::new(), Some(Duration::from_secs(1)));
        let result = ctx.run(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(ApiError::DeadlineExceeded)));
    }
}
