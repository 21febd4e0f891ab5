//! Credential persistence.
//!
//! Credentials are serialized to JSON and kept in the host [`SecureStore`]
//! under `credential:<handler_id>`. Token values never reach the logs.
//!
//! ```no_run
//! use core_auth::{Credential, CredentialStore, HandlerId};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>, credential: Credential) -> core_auth::Result<()> {
//! let store = CredentialStore::new(secure_store);
//! let handler_id = HandlerId::new();
//!
//! store.save(handler_id, &credential).await?;
//! let restored = store.load(handler_id).await?;
//! store.delete(handler_id).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{Credential, HandlerId};
use bridge_traits::storage::SecureStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "credential:";

#[derive(Clone)]
pub struct CredentialStore {
    secure_store: Arc<dyn SecureStore>,
}

impl CredentialStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        Self { secure_store }
    }

    pub fn storage_key(handler_id: HandlerId) -> String {
        format!("{}{}", KEY_PREFIX, handler_id)
    }

    /// Overwrites any credential already stored for `handler_id`.
    pub async fn save(&self, handler_id: HandlerId, credential: &Credential) -> Result<()> {
        let json = serde_json::to_vec(credential)?;

        self.secure_store
            .set_secret(&Self::storage_key(handler_id), &json)
            .await
            .map_err(|e| {
                warn!(handler_id = %handler_id, error = %e, "Failed to persist credential");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(
            handler_id = %handler_id,
            expires_at = %credential.expires_at,
            "Credential persisted"
        );
        Ok(())
    }

    /// `Ok(None)` when nothing is stored. Unreadable data is deleted and
    /// reported as [`AuthError::CredentialCorrupted`].
    pub async fn load(&self, handler_id: HandlerId) -> Result<Option<Credential>> {
        let key = Self::storage_key(handler_id);

        let data = self.secure_store.get_secret(&key).await.map_err(|e| {
            warn!(handler_id = %handler_id, error = %e, "Failed to read credential");
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        let Some(data) = data else {
            debug!(handler_id = %handler_id, "No stored credential");
            return Ok(None);
        };

        match serde_json::from_slice::<Credential>(&data) {
            Ok(credential) => {
                debug!(handler_id = %handler_id, "Credential loaded");
                Ok(Some(credential))
            }
            Err(e) => {
                warn!(handler_id = %handler_id, error = %e, "Stored credential is corrupted");

                if let Err(delete_err) = self.secure_store.delete_secret(&key).await {
                    warn!(
                        handler_id = %handler_id,
                        error = %delete_err,
                        "Failed to delete corrupted credential"
                    );
                }

                Err(AuthError::CredentialCorrupted {
                    handler_id: handler_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Idempotent.
    pub async fn delete(&self, handler_id: HandlerId) -> Result<()> {
        self.secure_store
            .delete_secret(&Self::storage_key(handler_id))
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))?;

        info!(handler_id = %handler_id, "Credential deleted");
        Ok(())
    }

    pub async fn exists(&self, handler_id: HandlerId) -> Result<bool> {
        self.secure_store
            .has_secret(&Self::storage_key(handler_id))
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::BridgeError;
    use chrono::{TimeZone, Utc};
    use mockall::mock;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl SecureStore for MemoryStore {
        async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
            self.entries
                .lock()
                .await
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(self.entries.lock().await.get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
            self.entries.lock().await.remove(key);
            Ok(())
        }
    }

    mock! {
        FailingStore {}

        #[async_trait]
        impl SecureStore for FailingStore {
            async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()>;
            async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>>;
            async fn delete_secret(&self, key: &str) -> BridgeResult<()>;
        }
    }

    fn credential() -> Credential {
        Credential::new(
            "access-123",
            "refresh-456",
            Utc.timestamp_opt(1_700_003_600, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let backing = Arc::new(MemoryStore::default());
        let store = CredentialStore::new(backing.clone());
        let id = HandlerId::new();

        assert!(store.load(id).await.unwrap().is_none());
        store.save(id, &credential()).await.unwrap();

        assert!(store.exists(id).await.unwrap());
        assert_eq!(store.load(id).await.unwrap(), Some(credential()));

        let key = format!("credential:{}", id);
        assert!(backing.entries.lock().await.contains_key(&key));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = CredentialStore::new(Arc::new(MemoryStore::default()));
        let id = HandlerId::new();

        store.save(id, &credential()).await.unwrap();
        store.delete(id).await.unwrap();
        store.delete(id).await.unwrap();
        assert!(!store.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupted_credential_is_removed() {
        let backing = Arc::new(MemoryStore::default());
        let store = CredentialStore::new(backing.clone());
        let id = HandlerId::new();

        backing
            .set_secret(&CredentialStore::storage_key(id), b"{not json")
            .await
            .unwrap();

        let result = store.load(id).await;
        assert!(matches!(result, Err(AuthError::CredentialCorrupted { .. })));
        assert!(!store.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let mut failing = MockFailingStore::new();
        failing
            .expect_set_secret()
            .returning(|_, _| Err(BridgeError::OperationFailed("locked".to_string())));

        let store = CredentialStore::new(Arc::new(failing));
        let result = store.save(HandlerId::new(), &credential()).await;
        assert!(matches!(result, Err(AuthError::SecureStorageUnavailable(_))));
    }
}
