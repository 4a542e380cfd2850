//! Cancellation support for store calls.

use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The caller's cancellation token fired before the operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Runs `fut` unless `cancel` fires first.
///
/// An already-cancelled token wins without polling `fut`.
pub async fn with_cancel<F>(cancel: &CancellationToken, fut: F) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        output = fut => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let token = CancellationToken::new();
        assert_eq!(with_cancel(&token, async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn already_cancelled_token_wins() {
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(with_cancel(&token, async { 7 }).await, Err(Cancelled));
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_future() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });

        let result = with_cancel(&token, std::future::pending::<()>()).await;
        assert_eq!(result, Err(Cancelled));
    }
}
