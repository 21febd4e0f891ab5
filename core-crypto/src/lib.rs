//! # Content Encryption
//!
//! Symmetric encryption for file content and remote file names before they
//! leave the device.
//!
//! - [`EncryptionKey`]: an injected 256-bit key. Nothing in this crate
//!   generates a key on its own; hosts create one explicitly with
//!   [`EncryptionKey::generate`] and keep it in their secure store.
//! - [`CipherProvider`]: hands out encrypt/decrypt transforms bound to that
//!   key and offers one-shot helpers for buffers, async streams and names.
//!
//! Content is sealed with AES-256-GCM in the STREAM construction: a random
//! 7-byte nonce prefix is written first, followed by 4096-byte plaintext
//! segments, each carrying its own 16-byte tag. The final segment is flagged,
//! so truncation at a segment boundary is detected.

pub mod cipher;
pub mod error;
pub mod key;

pub use cipher::{sealed_len, CipherProvider, SealedChunks, SegmentDecryptor, SegmentEncryptor};
pub use error::{CryptoError, Result};
pub use key::EncryptionKey;
