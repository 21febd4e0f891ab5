//! AES-256-GCM stream transforms.
//!
//! Wire layout of one sealed message:
//!
//! ```text
//! | nonce prefix (7) | segment 0 (4096 + 16) | ... | last segment (<= 4096 + 16) |
//! ```
//!
//! The last segment is always present, even for empty input, and is sealed
//! with the STREAM "last block" flag.

use crate::error::{CryptoError, Result};
use crate::key::EncryptionKey;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::stream::{DecryptorBE32, EncryptorBE32};
use aes_gcm::aead::{KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use bytes::Bytes;
use core_async::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

/// Random nonce prefix written in front of every message.
pub const NONCE_PREFIX_LEN: usize = 7;
/// Plaintext bytes per segment.
pub const SEGMENT_LEN: usize = 4096;
/// GCM authentication tag length.
pub const TAG_LEN: usize = 16;

const SEALED_SEGMENT_LEN: usize = SEGMENT_LEN + TAG_LEN;
const ENCRYPT_READ_LEN: usize = 8;
const DECRYPT_READ_LEN: usize = 512;
const READ_AHEAD_LEN: usize = 64 * 1024;

/// Hands out encrypt and decrypt transforms bound to one key.
///
/// Each transform draws its own nonce, so a provider can be shared freely
/// across concurrent operations.
#[derive(Clone)]
pub struct CipherProvider {
    cipher: Aes256Gcm,
    fingerprint: String,
}

impl CipherProvider {
    pub fn new(key: &EncryptionKey) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| CryptoError::InvalidKey("key must be 32 bytes".to_string()))?;

        Ok(Self {
            cipher,
            fingerprint: key.fingerprint(),
        })
    }

    pub fn encryptor(&self) -> SegmentEncryptor {
        let mut prefix = [0u8; NONCE_PREFIX_LEN];
        OsRng.fill_bytes(&mut prefix);

        SegmentEncryptor {
            stream: EncryptorBE32::from_aead(self.cipher.clone(), GenericArray::from_slice(&prefix)),
            header: Some(prefix),
            pending: Vec::with_capacity(SEGMENT_LEN),
        }
    }

    pub fn decryptor(&self) -> SegmentDecryptor {
        SegmentDecryptor {
            cipher: self.cipher.clone(),
            stream: None,
            pending: Vec::with_capacity(SEALED_SEGMENT_LEN),
        }
    }

    /// Drains `reader` through an encryptor and returns the whole sealed
    /// message.
    #[instrument(skip(self, reader), fields(key = %self.fingerprint))]
    pub async fn encrypt<R>(&self, mut reader: R) -> Result<Bytes>
    where
        R: AsyncRead + Unpin,
    {
        let mut encryptor = self.encryptor();
        let mut output = Vec::new();
        let mut buf = [0u8; ENCRYPT_READ_LEN];
        let mut consumed = 0u64;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            consumed += n as u64;
            output.extend_from_slice(&encryptor.update(&buf[..n])?);
        }
        output.extend_from_slice(&encryptor.finish()?);

        debug!(plaintext_bytes = consumed, sealed_bytes = output.len(), "Encrypted stream");
        Ok(Bytes::from(output))
    }

    /// Streams `source` through a decryptor into `sink`, writing each segment
    /// as soon as it authenticates. Returns the plaintext byte count.
    ///
    /// On error, `sink` may already hold the authenticated prefix of the
    /// plaintext; callers discard it.
    #[instrument(skip(self, source, sink), fields(key = %self.fingerprint))]
    pub async fn decrypt<R, W>(&self, mut source: R, sink: &mut W) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut decryptor = self.decryptor();
        let mut buf = [0u8; DECRYPT_READ_LEN];
        let mut written = 0u64;

        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let plain = decryptor.update(&buf[..n])?;
            if !plain.is_empty() {
                sink.write_all(&plain).await?;
                written += plain.len() as u64;
            }
        }

        let tail = decryptor.finish()?;
        sink.write_all(&tail).await?;
        sink.flush().await?;
        written += tail.len() as u64;

        debug!(plaintext_bytes = written, "Decrypted stream");
        Ok(written)
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut encryptor = self.encryptor();
        let mut sealed = encryptor.update(plaintext)?;
        sealed.extend_from_slice(&encryptor.finish()?);
        Ok(sealed)
    }

    pub fn decrypt_bytes(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        let mut decryptor = self.decryptor();
        let mut plain = decryptor.update(sealed)?;
        plain.extend_from_slice(&decryptor.finish()?);
        Ok(plain)
    }

    /// Seals a remote file name and renders it as lowercase hex, which is
    /// safe in any provider's path syntax.
    pub fn encrypt_name(&self, name: &str) -> Result<String> {
        Ok(hex::encode(self.encrypt_bytes(name.as_bytes())?))
    }

    pub fn decrypt_name(&self, encoded: &str) -> Result<String> {
        let sealed = hex::decode(encoded).map_err(|e| CryptoError::InvalidName(e.to_string()))?;
        let plain = self.decrypt_bytes(&sealed)?;
        String::from_utf8(plain).map_err(|e| CryptoError::InvalidName(e.to_string()))
    }
}

impl std::fmt::Debug for CipherProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherProvider")
            .field("key", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Incremental encrypting transform.
///
/// Plaintext is buffered until more than one segment is available, so the
/// final segment is always sealed by [`SegmentEncryptor::finish`].
pub struct SegmentEncryptor {
    stream: EncryptorBE32<Aes256Gcm>,
    header: Option<[u8; NONCE_PREFIX_LEN]>,
    pending: Vec<u8>,
}

impl SegmentEncryptor {
    /// Feeds plaintext and returns whatever ciphertext is ready, including
    /// the nonce prefix on the first call.
    pub fn update(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.pending.extend_from_slice(input);
        let mut out = self.take_header();

        while self.pending.len() > SEGMENT_LEN {
            let segment: Vec<u8> = self.pending.drain(..SEGMENT_LEN).collect();
            let sealed = self
                .stream
                .encrypt_next(segment.as_slice())
                .map_err(|_| CryptoError::Encryption)?;
            out.extend_from_slice(&sealed);
        }

        Ok(out)
    }

    pub fn finish(mut self) -> Result<Vec<u8>> {
        let mut out = self.take_header();
        let Self { stream, pending, .. } = self;

        let sealed = stream
            .encrypt_last(pending.as_slice())
            .map_err(|_| CryptoError::Encryption)?;
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn take_header(&mut self) -> Vec<u8> {
        self.header.take().map(|h| h.to_vec()).unwrap_or_default()
    }
}

/// Incremental decrypting transform.
///
/// Emits plaintext only for segments that have authenticated. The final
/// segment is held back until [`SegmentDecryptor::finish`].
pub struct SegmentDecryptor {
    cipher: Aes256Gcm,
    stream: Option<DecryptorBE32<Aes256Gcm>>,
    pending: Vec<u8>,
}

impl SegmentDecryptor {
    pub fn update(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.pending.extend_from_slice(input);

        if self.stream.is_none() {
            if self.pending.len() < NONCE_PREFIX_LEN {
                return Ok(Vec::new());
            }
            let prefix: Vec<u8> = self.pending.drain(..NONCE_PREFIX_LEN).collect();
            self.stream = Some(DecryptorBE32::from_aead(
                self.cipher.clone(),
                GenericArray::from_slice(&prefix),
            ));
        }

        let mut out = Vec::new();
        let Some(stream) = self.stream.as_mut() else {
            return Ok(out);
        };

        while self.pending.len() > SEALED_SEGMENT_LEN {
            let segment: Vec<u8> = self.pending.drain(..SEALED_SEGMENT_LEN).collect();
            let plain = stream
                .decrypt_next(segment.as_slice())
                .map_err(|_| CryptoError::Authentication)?;
            out.extend_from_slice(&plain);
        }

        Ok(out)
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        let Some(stream) = self.stream else {
            return Err(CryptoError::Truncated);
        };
        if self.pending.len() < TAG_LEN {
            return Err(CryptoError::Truncated);
        }

        stream
            .decrypt_last(self.pending.as_slice())
            .map_err(|_| CryptoError::Authentication)
    }
}

/// Exact sealed size of a `plaintext_len`-byte message.
///
/// Lets a chunked upload announce its total size before any content has been
/// encrypted.
pub fn sealed_len(plaintext_len: u64) -> u64 {
    let segment = SEGMENT_LEN as u64;
    let segments = plaintext_len.div_ceil(segment).max(1);
    NONCE_PREFIX_LEN as u64 + plaintext_len + segments * TAG_LEN as u64
}

/// Encrypts a reader lazily and hands the ciphertext out in fixed-size
/// blocks, so a large file never sits in memory whole.
pub struct SealedChunks<R> {
    reader: R,
    encryptor: Option<SegmentEncryptor>,
    buffer: Vec<u8>,
}

impl<R> SealedChunks<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(provider: &CipherProvider, reader: R) -> Self {
        Self {
            reader,
            encryptor: Some(provider.encryptor()),
            buffer: Vec::new(),
        }
    }

    /// Next `len` bytes of ciphertext; shorter only at the end of the
    /// message, and empty once everything has been handed out.
    pub async fn next_block(&mut self, len: usize) -> Result<Bytes> {
        let mut read_buf = vec![0u8; READ_AHEAD_LEN];

        while self.buffer.len() < len {
            let Some(encryptor) = self.encryptor.as_mut() else {
                break;
            };

            let n = self.reader.read(&mut read_buf).await?;
            if n == 0 {
                if let Some(encryptor) = self.encryptor.take() {
                    self.buffer.extend_from_slice(&encryptor.finish()?);
                }
            } else {
                self.buffer.extend_from_slice(&encryptor.update(&read_buf[..n])?);
            }
        }

        let take = len.min(self.buffer.len());
        Ok(Bytes::from(self.buffer.drain(..take).collect::<Vec<u8>>()))
    }
}
