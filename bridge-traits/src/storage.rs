//! Storage Abstractions
//!
//! Secure credential storage and the key/value configuration source used to
//! load per-provider client settings.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;

/// Secure credential storage trait
///
/// Abstracts secure storage mechanisms:
/// - macOS/iOS: Keychain
/// - Android: Keystore (hardware-backed when available)
/// - Windows: Credential Manager
/// - Linux: Secret Service / libsecret
///
/// The core keeps two kinds of secrets here: serialized credentials and the
/// symmetric key used for name/content encryption.
///
/// # Security Requirements
///
/// Implementations MUST:
/// - Encrypt data at rest
/// - Never log or expose secret values
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn store_key(store: &dyn SecureStore, key: &[u8]) -> Result<()> {
///     store.set_secret("cipher_key:onedrive", key).await
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, replacing any previous value under `key`
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Deleting a missing key succeeds.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check if a secret exists without retrieving it
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }
}

/// Key/value configuration source
///
/// Supplies the named property set for one provider (client id, secret,
/// login URL and so on). Where the values live is the host's business:
/// bundled `.properties` files, environment, remote config.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::ConfigSource;
///
/// async fn client_id(source: &dyn ConfigSource) -> Option<String> {
///     let props = source.load("onedrive").await.ok()?;
///     props.get("clientId").cloned()
/// }
/// ```
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Load the property set called `name`.
    async fn load(&self, name: &str) -> Result<HashMap<String, String>>;
}

/// In-memory [`ConfigSource`] keyed by set name.
///
/// Useful for tests and for hosts that already hold the values.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    sets: HashMap<String, HashMap<String, String>>,
}

impl StaticConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set<K, V, I>(mut self, name: impl Into<String>, entries: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let set = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.sets.insert(name.into(), set);
        self
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn load(&self, name: &str) -> Result<HashMap<String, String>> {
        self.sets.get(name).cloned().ok_or_else(|| {
            crate::error::BridgeError::NotAvailable(format!("No configuration named '{}'", name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use mockall::mock;

    mock! {
        Store {}

        #[async_trait::async_trait]
        impl SecureStore for Store {
            async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;
            async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;
            async fn delete_secret(&self, key: &str) -> Result<()>;
        }
    }

    #[tokio::test]
    async fn test_has_secret_reads_through_get() {
        let mut store = MockStore::new();
        store
            .expect_get_secret()
            .withf(|key| key == "credential:present")
            .times(1)
            .returning(|_| Ok(Some(b"{}".to_vec())));
        store
            .expect_get_secret()
            .withf(|key| key == "credential:absent")
            .times(1)
            .returning(|_| Ok(None));

        assert!(store.has_secret("credential:present").await.unwrap());
        assert!(!store.has_secret("credential:absent").await.unwrap());
    }

    #[tokio::test]
    async fn test_has_secret_propagates_store_errors() {
        let mut store = MockStore::new();
        store
            .expect_get_secret()
            .returning(|_| Err(BridgeError::NotAvailable("keyring locked".to_string())));

        assert!(store.has_secret("credential:any").await.is_err());
    }

    #[tokio::test]
    async fn test_static_source_returns_named_set() {
        let source = StaticConfigSource::new()
            .with_set("onedrive", [("clientId", "abc"), ("scope", "files.readwrite")]);

        let props = source.load("onedrive").await.unwrap();
        assert_eq!(props.get("clientId"), Some(&"abc".to_string()));
        assert_eq!(props.len(), 2);
    }

    #[tokio::test]
    async fn test_static_source_missing_set() {
        let source = StaticConfigSource::new();
        assert!(source.load("dropbox").await.is_err());
    }
}
