use bridge_traits::BridgeError;
use core_auth::AuthError;
use core_crypto::CryptoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Host {host} is unavailable: {reason}")]
    HostUnavailable { host: String, reason: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Runtime failure: {0}")]
    RuntimeFailure(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Credential still rejected after {attempts} refreshes")]
    UnauthorizedRetriesExhausted { attempts: u32 },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Transient backend failures that the executor retries with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::ServiceUnavailable(_))
    }

    /// Failures that a credential refresh may cure.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, SyncError::Unauthorized(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
