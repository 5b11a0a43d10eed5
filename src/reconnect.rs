/*!
 * Reconnection Supervisor
 *
 * Per-socket reconnect policy: on closure, wait a fixed delay and
 * re-run the connect routine from scratch. No backoff and no retry cap;
 * retries continue for as long as the owning task is alive. This can
 * reconnect-storm a downed server and is kept deliberately, matching
 * the backend's expectations for these clients.
 */

use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Fixed delay between a socket closing and the next connect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Shared reconnect policy for one socket client.
///
/// Each client owns one supervisor and awaits `wait_retry` in its run
/// loop, so at most one reconnect timer is ever pending per client. The
/// cancellation token covers every exit path: once cancelled, no timer
/// fires after intentional shutdown.
#[derive(Clone)]
pub struct Supervisor {
    delay: Duration,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::with_delay(RECONNECT_DELAY)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            cancel: CancellationToken::new(),
        }
    }

    /// Token observed by the owning client; cancelled on teardown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait out the reconnect delay. Returns `true` when the caller
    /// should attempt to reconnect, `false` when the supervisor was shut
    /// down while waiting (or before).
    pub async fn wait_retry(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        debug!(delay_ms = self.delay.as_millis() as u64, "Scheduling reconnect");
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = sleep(self.delay) => true,
        }
    }

    /// Cancel any pending reconnect and all future ones.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::Poll;
    use tokio::time::{advance, pause};

    #[tokio::test]
    async fn test_retry_fires_no_earlier_than_delay() {
        pause();
        let supervisor = Supervisor::new();

        let mut retry = Box::pin(supervisor.wait_retry());
        // First poll arms the timer.
        assert!(futures_util::poll!(retry.as_mut()).is_pending());

        advance(Duration::from_millis(2999)).await;
        assert!(
            futures_util::poll!(retry.as_mut()).is_pending(),
            "reconnect fired before the 3000 ms delay"
        );

        // Paused-clock timers round their deadline up to the next
        // millisecond, so step past the deadline instead of onto it.
        advance(Duration::from_millis(2)).await;
        assert_eq!(futures_util::poll!(retry.as_mut()), Poll::Ready(true));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_retry() {
        pause();
        let supervisor = Supervisor::new();

        let mut retry = Box::pin(supervisor.wait_retry());
        assert!(futures_util::poll!(retry.as_mut()).is_pending());
        advance(Duration::from_millis(1000)).await;
        assert!(futures_util::poll!(retry.as_mut()).is_pending());

        supervisor.shutdown();
        assert!(!retry.await, "cancelled retry must not fire");
    }

    #[tokio::test]
    async fn test_shutdown_before_wait_returns_immediately() {
        let supervisor = Supervisor::new();
        supervisor.shutdown();
        assert!(!supervisor.wait_retry().await);
        assert!(supervisor.is_shutdown());
    }

    #[tokio::test]
    async fn test_custom_delay() {
        pause();
        let supervisor = Supervisor::with_delay(Duration::from_millis(50));
        let mut retry = Box::pin(supervisor.wait_retry());
        assert!(futures_util::poll!(retry.as_mut()).is_pending());
        advance(Duration::from_millis(49)).await;
        assert!(futures_util::poll!(retry.as_mut()).is_pending());
        advance(Duration::from_millis(2)).await;
        assert_eq!(futures_util::poll!(retry.as_mut()), Poll::Ready(true));
    }
}
