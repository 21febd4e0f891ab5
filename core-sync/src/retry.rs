//! # Resilient Execution
//!
//! Runs one unit of remote work and recovers from the two classified
//! failures a provider can report:
//!
//! - [`SyncError::Unauthorized`]: the credential is refreshed through a
//!   [`Reauthenticate`] collaborator and the work is retried immediately.
//!   These retries do not count as attempts, but at most
//!   `max_unauthorized_refreshes` happen per execution.
//! - [`SyncError::ServiceUnavailable`]: the work is retried after an
//!   exponential backoff of `2^attempt * base_delay` plus jitter, until
//!   `max_attempts` calls have been made.
//!
//! Every other error is returned unchanged. The backoff wait observes the
//! executor's [`CancellationToken`].

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use core_async::sync::CancellationToken;
use core_async::time::{sleep_cancellable, Duration};
use core_runtime::config::{JitterRange, RetryPolicy};
use core_runtime::events::{CoreEvent, EventBus, TransferEvent};
use rand::Rng;
use std::future::Future;
use tracing::{debug, error, info, warn};

/// Refreshes the credential after the server rejected it.
#[async_trait]
pub trait Reauthenticate: Send + Sync {
    /// Access token the next attempt will present, if one is held.
    async fn current_token(&self) -> Option<String>;

    /// Replaces the credential that presented `rejected`. Does nothing when
    /// that credential has already been replaced by a concurrent refresh.
    async fn reauthenticate(&self, rejected: Option<String>) -> Result<()>;
}

#[derive(Clone)]
pub struct ResilientExecutor {
    policy: RetryPolicy,
    cancel: CancellationToken,
    event_bus: Option<EventBus>,
}

impl ResilientExecutor {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            policy,
            cancel,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Delay before retrying after zero-based attempt `attempt` failed.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter = sample_jitter(self.policy.jitter);
        JitterRange::apply(self.policy.base_delay_for_attempt(attempt), jitter)
    }

    /// Runs `operation` until it succeeds or fails terminally.
    ///
    /// `operation` is invoked afresh for every attempt, so it must read the
    /// current access token each time rather than capture one.
    pub async fn execute<T, F, Fut>(
        &self,
        operation_name: &str,
        reauth: &dyn Reauthenticate,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        let mut refreshes: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                info!(operation = operation_name, "Cancelled before attempt");
                return Err(SyncError::Cancelled);
            }

            let presented = reauth.current_token().await;
            let err = match operation().await {
                Ok(value) => {
                    if attempt > 0 || refreshes > 0 {
                        debug!(
                            operation = operation_name,
                            attempt,
                            refreshes,
                            "Operation succeeded after recovery"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if err.requires_reauthentication() {
                if refreshes >= self.policy.max_unauthorized_refreshes {
                    error!(
                        operation = operation_name,
                        refreshes, "Credential still rejected, giving up"
                    );
                    return Err(SyncError::UnauthorizedRetriesExhausted {
                        attempts: refreshes,
                    });
                }

                refreshes += 1;
                warn!(
                    operation = operation_name,
                    refresh = refreshes,
                    "Credential rejected, refreshing"
                );
                reauth.reauthenticate(presented).await?;
                continue;
            }

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt + 1 >= self.policy.max_attempts {
                error!(
                    operation = operation_name,
                    attempts = attempt + 1,
                    error = %err,
                    "Service unavailable, retry budget exhausted"
                );
                return Err(SyncError::RuntimeFailure(
                    "Service heavily unavailable".to_string(),
                ));
            }

            let delay = self.backoff_delay(attempt);
            warn!(
                operation = operation_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Service unavailable, backing off"
            );
            self.emit(TransferEvent::RetryScheduled {
                operation: operation_name.to_string(),
                attempt,
                delay_ms: delay.as_millis() as u64,
            });

            if !sleep_cancellable(delay, &self.cancel).await {
                info!(operation = operation_name, attempt, "Cancelled during backoff");
                return Err(SyncError::Cancelled);
            }

            attempt += 1;
        }
    }

    fn emit(&self, event: TransferEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Transfer(event));
        }
    }
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("policy", &self.policy)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

fn sample_jitter(range: JitterRange) -> i64 {
    if range.min_ms >= range.max_ms {
        return range.min_ms;
    }
    rand::thread_rng().gen_range(range.min_ms..=range.max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_async::time::Instant;
    use mockall::mock;
    use std::sync::atomic::{AtomicU32, Ordering};

    mock! {
        Reauth {}

        #[async_trait]
        impl Reauthenticate for Reauth {
            async fn current_token(&self) -> Option<String>;
            async fn reauthenticate(&self, rejected: Option<String>) -> Result<()>;
        }
    }

    fn executor() -> ResilientExecutor {
        ResilientExecutor::new(
            RetryPolicy::new().with_jitter(JitterRange::none()),
            CancellationToken::new(),
        )
    }

    fn reauth() -> MockReauth {
        let mut reauth = MockReauth::new();
        reauth
            .expect_current_token()
            .returning(|| Some("token-1".to_string()));
        reauth
    }

    fn no_reauth() -> MockReauth {
        let mut reauth = reauth();
        reauth.expect_reauthenticate().never();
        reauth
    }

    #[test]
    fn test_backoff_without_jitter_doubles() {
        let executor = executor();
        let delays: Vec<u64> = (0..5)
            .map(|k| executor.backoff_delay(k).as_millis() as u64)
            .collect();
        assert_eq!(delays, [1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_backoff_jitter_stays_in_range() {
        let executor = ResilientExecutor::new(RetryPolicy::default(), CancellationToken::new());
        for attempt in 0..4 {
            let base = 1000u64 << attempt;
            for _ in 0..200 {
                let delay = executor.backoff_delay(attempt).as_millis() as u64;
                assert!(delay + 999 >= base && delay <= base + 999, "delay {}", delay);
            }
        }
    }

    #[test]
    fn test_negative_jitter_clamps_at_zero() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(10))
            .with_jitter(JitterRange {
                min_ms: -500,
                max_ms: -500,
            });
        let executor = ResilientExecutor::new(policy, CancellationToken::new());
        assert_eq!(executor.backoff_delay(0), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_failures_then_success() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = executor()
            .execute("list", &no_reauth(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 4 {
                        Err(SyncError::ServiceUnavailable("503".to_string()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed(), Duration::from_millis(1000 + 2000 + 4000 + 8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_unavailable_fails_after_five_calls() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = executor()
            .execute("list", &no_reauth(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SyncError::ServiceUnavailable("503".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(SyncError::RuntimeFailure(ref m)) if m == "Service heavily unavailable"));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_unauthorized_twice_refreshes_twice() {
        let mut reauth = reauth();
        reauth.expect_reauthenticate().times(2).returning(|_| Ok(()));
        let calls = AtomicU32::new(0);

        let result = executor()
            .execute("delete", &reauth, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(SyncError::Unauthorized("401".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_does_not_consume_attempt_budget() {
        let mut reauth = reauth();
        reauth.expect_reauthenticate().times(2).returning(|_| Ok(()));
        let calls = AtomicU32::new(0);

        // Two rejections interleaved with four outages still fit in five attempts.
        let result = executor()
            .execute("list", &reauth, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        0 | 3 => Err(SyncError::Unauthorized("401".to_string())),
                        1 | 2 | 4 | 5 => Err(SyncError::ServiceUnavailable("503".to_string())),
                        _ => Ok(n),
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_unauthorized_bound_is_enforced() {
        let mut reauth = reauth();
        reauth.expect_reauthenticate().times(2).returning(|_| Ok(()));
        let calls = AtomicU32::new(0);

        let result: Result<()> = executor()
            .execute("list", &reauth, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SyncError::Unauthorized("401".to_string())) }
            })
            .await;

        assert!(matches!(
            result,
            Err(SyncError::UnauthorizedRetriesExhausted { attempts: 2 })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_refresh_propagates() {
        let mut reauth = reauth();
        reauth
            .expect_reauthenticate()
            .times(1)
            .returning(|_| Err(SyncError::Provider("invalid_grant".to_string())));

        let result: Result<()> = executor()
            .execute("list", &reauth, || async {
                Err(SyncError::Unauthorized("401".to_string()))
            })
            .await;

        assert!(matches!(result, Err(SyncError::Provider(_))));
    }

    #[tokio::test]
    async fn test_refresh_names_the_rejected_token() {
        let mut reauth = MockReauth::new();
        let issued = AtomicU32::new(0);
        reauth.expect_current_token().returning(move || {
            Some(format!("token-{}", issued.fetch_add(1, Ordering::SeqCst)))
        });
        reauth
            .expect_reauthenticate()
            .withf(|rejected| rejected.as_deref() == Some("token-0"))
            .times(1)
            .returning(|_| Ok(()));
        let calls = AtomicU32::new(0);

        let result = executor()
            .execute("list", &reauth, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(SyncError::Unauthorized("401".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_other_errors_propagate_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = executor()
            .execute("download", &no_reauth(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SyncError::Provider("404 itemNotFound".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(SyncError::Provider(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let executor = executor();
        let token = executor.cancellation_token().clone();
        let calls = AtomicU32::new(0);

        core_async::spawn(async move {
            core_async::sleep(Duration::from_millis(1500)).await;
            token.cancel();
        });

        let result: Result<()> = executor
            .execute("upload", &no_reauth(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SyncError::ServiceUnavailable("503".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_events_are_emitted() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let executor = ResilientExecutor::new(
            RetryPolicy::new()
                .with_base_delay(Duration::from_millis(1))
                .with_jitter(JitterRange::none()),
            CancellationToken::new(),
        )
        .with_event_bus(bus);
        let calls = AtomicU32::new(0);

        executor
            .execute("list", &no_reauth(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(SyncError::ServiceUnavailable("503".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            CoreEvent::Transfer(TransferEvent::RetryScheduled {
                operation,
                attempt,
                delay_ms,
            }) => {
                assert_eq!(operation, "list");
                assert_eq!(attempt, 0);
                assert_eq!(delay_ms, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
