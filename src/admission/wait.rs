//! Cancellable pause between retry attempts.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// How a retry wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full interval passed.
    Elapsed,
    /// A cancellation token fired first.
    Cancelled,
}

/// Waits between retry attempts, giving up as soon as either token is cancelled.
#[async_trait]
pub trait RetryWait: Send + Sync {
    /// Wait for `duration` unless `call` or `shutdown` is cancelled first.
    async fn wait(
        &self,
        duration: Duration,
        call: &CancellationToken,
        shutdown: &CancellationToken,
    ) -> WaitOutcome;
}

/// [`RetryWait`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioWait;

#[async_trait]
impl RetryWait for TokioWait {
    async fn wait(
        &self,
        duration: Duration,
        call: &CancellationToken,
        shutdown: &CancellationToken,
    ) -> WaitOutcome {
        tokio::select! {
            biased;
            () = call.cancelled() => WaitOutcome::Cancelled,
            () = shutdown.cancelled() => WaitOutcome::Cancelled,
            () = tokio::time::sleep(duration) => WaitOutcome::Elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_wait_elapses() {
        let start = Instant::now();
        let outcome = TokioWait
            .wait(
                Duration::from_millis(50),
                &CancellationToken::new(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome, WaitOutcome::Elapsed);
        assert_eq!(start.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_returns_immediately() {
        let call = CancellationToken::new();
        call.cancel();

        let start = Instant::now();
        let outcome = TokioWait
            .wait(Duration::from_secs(10), &call, &CancellationToken::new())
            .await;

        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_wait_pending_until_cancelled() {
        let call = CancellationToken::new();
        let shutdown = CancellationToken::new();
        let mut wait =
            tokio_test::task::spawn(TokioWait.wait(Duration::from_secs(60), &call, &shutdown));

        tokio_test::assert_pending!(wait.poll());
        call.cancel();
        assert!(wait.is_woken());
        tokio_test::assert_ready_eq!(wait.poll(), WaitOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_wait() {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let outcome = TokioWait
            .wait(Duration::from_secs(10), &CancellationToken::new(), &shutdown)
            .await;

        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert_eq!(start.elapsed(), Duration::from_millis(10));
    }
}
