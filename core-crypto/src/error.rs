use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    Encryption,

    #[error("Authentication failed: ciphertext was tampered with or the key is wrong")]
    Authentication,

    #[error("Ciphertext is truncated")]
    Truncated,

    #[error("Invalid encrypted name: {0}")]
    InvalidName(String),

    #[error("Key storage failed: {0}")]
    KeyStorage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
