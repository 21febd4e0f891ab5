//! Encryption key handling.

use crate::error::{CryptoError, Result};
use bridge_traits::storage::SecureStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, info};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Symmetric key for content and name encryption.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKey {
    #[serde(with = "hex_serde")]
    key_bytes: Vec<u8>,
}

impl EncryptionKey {
    /// Generate a new random key.
    ///
    /// Only for provisioning: callers are expected to persist the result
    /// (see [`EncryptionKey::persist_to`]) and inject it on later runs.
    pub fn generate() -> Self {
        use aes_gcm::aead::{KeyInit, OsRng};

        let key = aes_gcm::Aes256Gcm::generate_key(&mut OsRng);
        Self {
            key_bytes: key.to_vec(),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes for AES-256, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }

        Ok(Self { key_bytes: bytes })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("invalid hex: {}", e)))?;

        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key_bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.key_bytes)
    }

    /// Short, non-reversible identifier for logs: the first 8 bytes of the
    /// key's SHA-256 digest.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.key_bytes);
        hex::encode(&digest[..8])
    }

    /// Reads a hex-encoded key stored under `name`. `Ok(None)` when absent.
    pub async fn load_from(store: &dyn SecureStore, name: &str) -> Result<Option<Self>> {
        let Some(data) = store
            .get_secret(name)
            .await
            .map_err(|e| CryptoError::KeyStorage(e.to_string()))?
        else {
            debug!(name, "No stored encryption key");
            return Ok(None);
        };

        let text = String::from_utf8(data)
            .map_err(|_| CryptoError::InvalidKey("stored key is not valid UTF-8".to_string()))?;
        let key = Self::from_hex(&text)?;
        debug!(name, fingerprint = %key.fingerprint(), "Encryption key loaded");
        Ok(Some(key))
    }

    pub async fn persist_to(&self, store: &dyn SecureStore, name: &str) -> Result<()> {
        store
            .set_secret(name, self.to_hex().as_bytes())
            .await
            .map_err(|e| CryptoError::KeyStorage(e.to_string()))?;

        info!(name, fingerprint = %self.fingerprint(), "Encryption key persisted");
        Ok(())
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("key_bytes", &"[REDACTED]")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        if bytes.len() != super::KEY_LEN {
            return Err(serde::de::Error::invalid_length(
                bytes.len(),
                &"32 key bytes",
            ));
        }
        Ok(bytes)
    }
}
