//! Credential lifecycle guard.
//!
//! Holds the handler's current [`Credential`] behind a read/write lock and
//! decides when it has to be refreshed. The refresh itself is supplied by the
//! caller as a closure, so the guard stays independent of any provider.
//!
//! Refreshes are serialized: a second caller waiting on the refresh lock
//! re-checks expiry after acquiring it and skips the refresh when the first
//! caller already produced a valid credential.

use crate::error::AuthError;
use crate::types::{Credential, HandlerId};
use bridge_traits::Clock;
use core_async::sync::{Mutex, RwLock};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct CredentialGuard {
    handler_id: HandlerId,
    credential: RwLock<Option<Credential>>,
    refresh_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
}

impl CredentialGuard {
    pub fn new(handler_id: HandlerId, clock: Arc<dyn Clock>) -> Self {
        Self {
            handler_id,
            credential: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            clock,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn handler_id(&self) -> HandlerId {
        self.handler_id
    }

    /// Replaces the stored credential.
    pub async fn store(&self, credential: Credential) {
        *self.credential.write().await = Some(credential);
    }

    pub async fn clear(&self) {
        *self.credential.write().await = None;
    }

    pub async fn snapshot(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.credential.read().await.is_some()
    }

    /// Current access token without any expiry check.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        self.credential
            .read()
            .await
            .as_ref()
            .map(|c| c.access_token.clone())
            .ok_or_else(|| AuthError::NotAuthenticated(self.handler_id.to_string()))
    }

    /// `Some(true)` when the stored credential has expired, `None` when
    /// there is no credential at all.
    pub async fn needs_refresh(&self) -> Option<bool> {
        let now = self.clock.now();
        self.credential
            .read()
            .await
            .as_ref()
            .map(|c| c.is_expired_at(now))
    }

    /// Refreshes through `refresh` if and only if the current time has
    /// reached the credential's expiry, then returns a usable access token.
    ///
    /// A failing refresh propagates unchanged and leaves the old credential
    /// in place.
    #[instrument(skip(self, refresh), fields(handler_id = %self.handler_id))]
    pub async fn ensure_valid<F, Fut, E>(&self, refresh: F) -> Result<String, E>
    where
        F: FnOnce(Credential) -> Fut,
        Fut: Future<Output = Result<Credential, E>>,
        E: From<AuthError>,
    {
        if let Some(token) = self.valid_token().await? {
            return Ok(token);
        }

        let _refreshing = self.refresh_lock.lock().await;

        // Another task may have refreshed while this one waited.
        if let Some(token) = self.valid_token().await? {
            debug!("Credential refreshed concurrently");
            return Ok(token);
        }

        let current = self.require_credential().await?;
        let refreshed = self.run_refresh(current, refresh).await?;
        Ok(refreshed.access_token)
    }

    /// Refreshes unconditionally, for a credential the server has rejected.
    #[instrument(skip(self, refresh), fields(handler_id = %self.handler_id))]
    pub async fn refresh_with<F, Fut, E>(&self, refresh: F) -> Result<Credential, E>
    where
        F: FnOnce(Credential) -> Fut,
        Fut: Future<Output = Result<Credential, E>>,
        E: From<AuthError>,
    {
        let _refreshing = self.refresh_lock.lock().await;
        let current = self.require_credential().await?;
        self.run_refresh(current, refresh).await
    }

    /// Refreshes the credential that presented `rejected`.
    ///
    /// When the stored access token differs from `rejected`, another task
    /// already replaced it while this one waited, and the stored credential
    /// is returned as is. `None` refreshes unconditionally.
    #[instrument(skip(self, rejected, refresh), fields(handler_id = %self.handler_id))]
    pub async fn refresh_rejected<F, Fut, E>(
        &self,
        rejected: Option<&str>,
        refresh: F,
    ) -> Result<Credential, E>
    where
        F: FnOnce(Credential) -> Fut,
        Fut: Future<Output = Result<Credential, E>>,
        E: From<AuthError>,
    {
        let _refreshing = self.refresh_lock.lock().await;
        let current = self.require_credential().await?;

        if rejected.is_some_and(|token| token != current.access_token) {
            debug!("Rejected credential already replaced");
            return Ok(current);
        }
        self.run_refresh(current, refresh).await
    }

    async fn valid_token(&self) -> Result<Option<String>, AuthError> {
        let now = self.clock.now();
        let guard = self.credential.read().await;
        let credential = guard
            .as_ref()
            .ok_or_else(|| AuthError::NotAuthenticated(self.handler_id.to_string()))?;

        if credential.is_expired_at(now) {
            debug!(expires_at = %credential.expires_at, "Credential expired");
            Ok(None)
        } else {
            Ok(Some(credential.access_token.clone()))
        }
    }

    async fn require_credential(&self) -> Result<Credential, AuthError> {
        self.snapshot()
            .await
            .ok_or_else(|| AuthError::NotAuthenticated(self.handler_id.to_string()))
    }

    async fn run_refresh<F, Fut, E>(&self, current: Credential, refresh: F) -> Result<Credential, E>
    where
        F: FnOnce(Credential) -> Fut,
        Fut: Future<Output = Result<Credential, E>>,
        E: From<AuthError>,
    {
        info!("Refreshing credential");
        self.emit(AuthEvent::TokenRefreshing {
            handler_id: self.handler_id.to_string(),
        });

        let previous = current.clone();
        match refresh(current).await {
            Ok(fresh) => {
                let fresh = fresh.inherit_refresh_token(&previous);
                self.store(fresh.clone()).await;
                info!(expires_at = %fresh.expires_at, "Credential refreshed");
                self.emit(AuthEvent::TokenRefreshed {
                    handler_id: self.handler_id.to_string(),
                    expires_at: fresh.expires_at.timestamp(),
                });
                Ok(fresh)
            }
            Err(e) => {
                warn!("Credential refresh failed");
                self.emit(AuthEvent::AuthError {
                    handler_id: Some(self.handler_id.to_string()),
                    message: "Token refresh failed".to_string(),
                    recoverable: true,
                });
                Err(e)
            }
        }
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Auth(event));
        }
    }
}

impl std::fmt::Debug for CredentialGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialGuard")
            .field("handler_id", &self.handler_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn start() -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn guard_with_clock() -> (CredentialGuard, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let guard = CredentialGuard::new(HandlerId::new(), clock.clone());
        (guard, clock)
    }

    fn fresh(token: &str, expires_in: i64) -> Credential {
        Credential::from_expires_in(token, "refresh-1", expires_in, start())
    }

    #[tokio::test]
    async fn test_ensure_valid_without_credential() {
        let (guard, _) = guard_with_clock();
        let result: Result<String, AuthError> = guard
            .ensure_valid(|c| async move { Ok::<_, AuthError>(c) })
            .await;
        assert!(matches!(result, Err(AuthError::NotAuthenticated(_))));
    }

    #[tokio::test]
    async fn test_rejected_token_is_refreshed_once() {
        let (guard, _) = guard_with_clock();
        guard.store(fresh("a1", 3600)).await;
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let credential = guard
                .refresh_rejected(Some("a1"), |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, AuthError>(fresh("a2", 3600)) }
                })
                .await
                .unwrap();
            assert_eq!(credential.access_token, "a2");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(guard.access_token().await.unwrap(), "a2");
    }

    #[tokio::test]
    async fn test_refresh_rejected_without_token_always_refreshes() {
        let (guard, _) = guard_with_clock();
        guard.store(fresh("a1", 3600)).await;

        let credential = guard
            .refresh_rejected(None, |_| async { Ok::<_, AuthError>(fresh("a2", 3600)) })
            .await
            .unwrap();
        assert_eq!(credential.access_token, "a2");
    }

    #[tokio::test]
    async fn test_no_refresh_before_expiry() {
        let (guard, clock) = guard_with_clock();
        guard.store(fresh("a1", 3600)).await;
        clock.advance(Duration::seconds(3599));

        let calls = AtomicU32::new(0);
        let token = guard
            .ensure_valid(|c| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, AuthError>(c) }
            })
            .await
            .unwrap();

        assert_eq!(token, "a1");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(guard.needs_refresh().await, Some(false));
    }

    #[tokio::test]
    async fn test_refresh_exactly_at_expiry() {
        let (guard, clock) = guard_with_clock();
        guard.store(fresh("a1", 3600)).await;
        clock.advance(Duration::seconds(3600));
        assert_eq!(guard.needs_refresh().await, Some(true));

        let calls = AtomicU32::new(0);
        let now = clock.now();
        let token = guard
            .ensure_valid(|old| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    assert_eq!(old.access_token, "a1");
                    Ok::<_, AuthError>(Credential::from_expires_in("a2", "", 3600, now))
                }
            })
            .await
            .unwrap();

        assert_eq!(token, "a2");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stored = guard.snapshot().await.unwrap();
        assert_eq!(stored.refresh_token, "refresh-1");
        assert_eq!(guard.needs_refresh().await, Some(false));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_old_credential() {
        let (guard, clock) = guard_with_clock();
        guard.store(fresh("a1", 10)).await;
        clock.advance(Duration::seconds(11));

        let result: Result<String, AuthError> = guard
            .ensure_valid(|_| async {
                Err(AuthError::TokenRefreshFailed("invalid_grant".to_string()))
            })
            .await;

        assert!(matches!(result, Err(AuthError::TokenRefreshFailed(_))));
        assert_eq!(guard.access_token().await.unwrap(), "a1");
    }

    #[tokio::test]
    async fn test_refresh_with_ignores_expiry_and_emits_events() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let (guard, _) = guard_with_clock();
        let guard = guard.with_event_bus(bus);
        guard.store(fresh("a1", 3600)).await;

        let refreshed = guard
            .refresh_with(|_| async { Ok::<_, AuthError>(fresh("a2", 7200)) })
            .await
            .unwrap();
        assert_eq!(refreshed.access_token, "a2");

        assert!(matches!(
            rx.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::TokenRefreshing { .. })
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::TokenRefreshed { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_ensure_valid_refreshes_once() {
        let (guard, clock) = guard_with_clock();
        let guard = Arc::new(guard);
        guard.store(fresh("a1", 1)).await;
        clock.advance(Duration::seconds(5));

        let calls = Arc::new(AtomicU32::new(0));
        let now = clock.now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let guard = Arc::clone(&guard);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                guard
                    .ensure_valid(|_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async move {
                            tokio::task::yield_now().await;
                            Ok::<_, AuthError>(Credential::from_expires_in("a2", "r2", 3600, now))
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "a2");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_hides_credential() {
        let (guard, _) = guard_with_clock();
        assert!(format!("{:?}", guard).starts_with("CredentialGuard"));
    }
}
