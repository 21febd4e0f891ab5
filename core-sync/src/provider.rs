//! # Provider Operations
//!
//! The contract a concrete storage backend fulfils. The handler core never
//! names a provider type; it drives one of these behind an `Arc`.
//!
//! ## Error contract
//!
//! Implementations classify HTTP failures so the executor can recover:
//!
//! - 401 → [`SyncError::Unauthorized`](crate::SyncError::Unauthorized)
//! - 429, 500, 502, 503, 504 → [`SyncError::ServiceUnavailable`](crate::SyncError::ServiceUnavailable)
//! - anything else → [`SyncError::Provider`](crate::SyncError::Provider)
//!
//! ## Large files
//!
//! A chunked upload is a session ([`ProviderOperations::start_large_upload`])
//! followed by one [`ProviderOperations::upload_large_chunk`] call per
//! [`Chunk`]. The core owns the chunk loop so chunk sizes stay fixed at the
//! configured values and every chunk is retried on its own.

use crate::dispatcher::Chunk;
use crate::error::Result;
use crate::identity::AccountMetadata;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_auth::Credential;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Descriptor of one stored file, as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    /// Stored (sealed) size in bytes.
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

/// One upload, alive for the duration of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub local_path: PathBuf,
    pub remote_name: String,
    /// Plaintext size; drives strategy selection.
    pub size: u64,
}

/// Resumable upload session opened by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub upload_url: String,
    /// Byte count the session expects in total.
    pub total_size: u64,
}

#[async_trait]
pub trait ProviderOperations: Send + Sync {
    /// Trades an authorization code for a credential.
    async fn exchange_token(
        &self,
        code: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Credential>;

    /// Uses `current.refresh_token` to obtain a new credential. The returned
    /// refresh token may be empty when the provider does not rotate it.
    async fn refresh_token(&self, current: &Credential) -> Result<Credential>;

    async fn fetch_metadata(&self, access_token: &str) -> Result<AccountMetadata>;

    /// Single-request upload of the whole sealed body.
    async fn upload_small(&self, access_token: &str, job: &TransferJob, content: Bytes)
        -> Result<()>;

    /// Opens a resumable session for a `sealed_size`-byte body.
    async fn start_large_upload(
        &self,
        access_token: &str,
        job: &TransferJob,
        sealed_size: u64,
    ) -> Result<UploadSession>;

    async fn upload_large_chunk(
        &self,
        access_token: &str,
        session: &UploadSession,
        chunk: &Chunk,
        content: Bytes,
    ) -> Result<()>;

    /// Bytes `chunk.offset ..= chunk.last_byte()` of the stored file.
    async fn download(&self, access_token: &str, remote: &RemoteFile, chunk: &Chunk)
        -> Result<Bytes>;

    async fn list(&self, access_token: &str) -> Result<Vec<RemoteFile>>;

    async fn delete(&self, access_token: &str, name: &str) -> Result<()>;
}
