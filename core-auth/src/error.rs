use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not authenticated: no credential for handler {0}")]
    NotAuthenticated(String),

    #[error("Invalid login URL: {0}")]
    InvalidLoginUrl(String),

    #[error("Login flow failed: {0}")]
    LoginFlowFailed(#[source] BridgeError),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Stored credential for handler {handler_id} is corrupted: {reason}")]
    CredentialCorrupted { handler_id: String, reason: String },

    #[error("Credential serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AuthError>;
