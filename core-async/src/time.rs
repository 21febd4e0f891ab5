//! Time utilities.
//!
//! Re-exports Tokio's timers. [`Instant`] is Tokio's instant so that tests
//! running with a paused clock observe the same time source as the sleeps.

use crate::sync::CancellationToken;

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};
pub use tokio::time::{interval, sleep, sleep_until, timeout, Instant, Interval, Sleep, Timeout};

/// Error returned by [`timeout`] when the deadline elapses.
pub use tokio::time::error::Elapsed as TimeoutError;

/// Sleeps for `duration` unless `token` is cancelled first.
///
/// Returns `true` when the full duration elapsed and `false` when the wait
/// was cut short by cancellation. A token that is already cancelled returns
/// `false` without sleeping.
pub async fn sleep_cancellable(duration: Duration, token: &CancellationToken) -> bool {
    if token.is_cancelled() {
        return false;
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = sleep(duration) => true,
    }
}

/// Milliseconds since the Unix epoch, or 0 if the system clock is before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_cancellable_runs_to_completion() {
        let token = CancellationToken::new();
        let start = Instant::now();

        assert!(sleep_cancellable(Duration::from_secs(4), &token).await);
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_cancellable_stops_on_cancel() {
        let token = CancellationToken::new();
        let trigger = token.clone();

        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        assert!(!sleep_cancellable(Duration::from_secs(60), &token).await);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn sleep_cancellable_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        assert!(!sleep_cancellable(Duration::from_secs(3600), &token).await);
    }

    #[test]
    fn now_millis_is_after_epoch() {
        assert!(now_millis() > 0);
    }
}
