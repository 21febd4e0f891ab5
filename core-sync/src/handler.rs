//! # Storage Handler
//!
//! One connected storage account. Every public remote operation runs the
//! same preconditions in order:
//!
//! 1. [`ConnectivityGate`]: fail fast with `HostUnavailable` when offline
//! 2. [`CredentialGuard`]: refresh the credential if it has expired
//! 3. [`TransferDispatcher`] (transfers only): pick small or chunked
//! 4. [`ResilientExecutor`]: issue each remote call with retry and backoff
//!
//! File content is sealed with the handler's [`CipherProvider`] before it
//! is uploaded and opened again on download.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::StorageHandler;
//!
//! let handler = StorageHandler::new(HandlerId::new(), config, provider, &key)?
//!     .with_event_bus(event_bus.clone());
//!
//! if !handler.restore_credential().await? {
//!     handler.login().await?;
//! }
//! handler.upload("/home/ana/report.pdf", "report.pdf").await?;
//! ```

use crate::connectivity::ConnectivityGate;
use crate::dispatcher::{ChunkPlan, TransferDispatcher, TransferProgress};
use crate::error::{Result, SyncError};
use crate::identity::HandlerIdentity;
use crate::provider::{ProviderOperations, RemoteFile, TransferJob};
use crate::retry::{Reauthenticate, ResilientExecutor};
use async_trait::async_trait;
use core_async::fs;
use core_async::io::{AsyncWriteExt, BufReader};
use core_async::sync::{CancellationToken, RwLock};
use core_auth::{request_authorization_code, Credential, CredentialGuard, CredentialStore, HandlerId};
use core_crypto::{sealed_len, CipherProvider, EncryptionKey, SealedChunks};
use core_runtime::config::HandlerConfig;
use core_runtime::events::{
    AuthEvent, CoreEvent, EventBus, TransferDirection, TransferStrategy,
};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct StorageHandler {
    id: HandlerId,
    config: HandlerConfig,
    provider: Arc<dyn ProviderOperations>,
    identity: RwLock<HandlerIdentity>,
    guard: CredentialGuard,
    credentials: CredentialStore,
    cipher: CipherProvider,
    gate: ConnectivityGate,
    executor: ResilientExecutor,
    dispatcher: TransferDispatcher,
    cancel: CancellationToken,
    event_bus: Option<EventBus>,
}

impl StorageHandler {
    /// The key is owned by the handler for its whole life; it is never
    /// generated here.
    pub fn new(
        id: HandlerId,
        config: HandlerConfig,
        provider: Arc<dyn ProviderOperations>,
        key: &EncryptionKey,
    ) -> Result<Self> {
        config.validate()?;
        let cancel = CancellationToken::new();

        Ok(Self {
            id,
            provider,
            identity: RwLock::new(HandlerIdentity::new(id)),
            guard: CredentialGuard::new(id, config.clock.clone()),
            credentials: CredentialStore::new(config.secure_store.clone()),
            cipher: CipherProvider::new(key)?,
            gate: ConnectivityGate::new(
                config.reachability_probe.clone(),
                config.connectivity.clone(),
            ),
            executor: ResilientExecutor::new(config.retry.clone(), cancel.clone()),
            dispatcher: TransferDispatcher::new(config.transfer, cancel.clone()),
            cancel,
            config,
            event_bus: None,
        })
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.guard = self.guard.with_event_bus(event_bus.clone());
        self.executor = self.executor.with_event_bus(event_bus.clone());
        self.dispatcher = self.dispatcher.with_event_bus(event_bus.clone());
        self.event_bus = Some(event_bus);
        self
    }

    /// Replaces the handler's cancellation token, typically with a child of
    /// an application-wide one.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        let mut executor = ResilientExecutor::new(self.config.retry.clone(), cancel.clone());
        let mut dispatcher = TransferDispatcher::new(self.config.transfer, cancel.clone());
        if let Some(bus) = &self.event_bus {
            executor = executor.with_event_bus(bus.clone());
            dispatcher = dispatcher.with_event_bus(bus.clone());
        }

        self.executor = executor;
        self.dispatcher = dispatcher;
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// For sealing remote file names with the handler's key.
    pub fn cipher(&self) -> &CipherProvider {
        &self.cipher
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops backoff waits and chunk loops at their next checkpoint. The
    /// handler rejects further remote calls afterwards.
    pub fn cancel(&self) {
        info!(handler_id = %self.id, "Cancelling handler operations");
        self.cancel.cancel();
    }

    pub async fn is_authenticated(&self) -> bool {
        self.guard.is_authenticated().await
    }

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    /// Runs the consent flow and exchanges the resulting code.
    ///
    /// Returns `Ok(false)` without contacting the provider when the user
    /// aborted or the redirect carried no code.
    #[instrument(skip(self), fields(handler_id = %self.id))]
    pub async fn login(&self) -> Result<bool> {
        self.gate.check_reachable().await?;
        let flow = self.config.require_login_flow()?;

        self.emit_auth(AuthEvent::SigningIn {
            handler_id: self.id.to_string(),
        });

        let Some(code) = request_authorization_code(flow.as_ref(), &self.config.provider).await?
        else {
            self.emit_auth(AuthEvent::LoginAborted {
                handler_id: self.id.to_string(),
            });
            return Ok(false);
        };

        self.gate.check_reachable().await?;
        let provider_config = &self.config.provider;
        let credential = self
            .provider
            .exchange_token(&code, &provider_config.client_id, &provider_config.client_secret)
            .await
            .inspect_err(|e| {
                warn!(error = %e, "Token exchange failed");
                self.emit_auth(AuthEvent::AuthError {
                    handler_id: Some(self.id.to_string()),
                    message: "Token exchange failed".to_string(),
                    recoverable: false,
                });
            })?;

        let expires_at = credential.expires_at.timestamp();
        self.guard.store(credential.clone()).await;
        self.persist(&credential).await;

        info!("Signed in");
        self.emit_auth(AuthEvent::SignedIn {
            handler_id: self.id.to_string(),
            expires_at,
        });
        Ok(true)
    }

    /// Refreshes the credential now, whether or not it has expired.
    #[instrument(skip(self), fields(handler_id = %self.id))]
    pub async fn refresh(&self) -> Result<()> {
        self.gate.check_reachable().await?;
        self.guard.refresh_with(|current| self.renew(current)).await?;
        Ok(())
    }

    /// Loads a previously persisted credential. `Ok(false)` when none exists.
    #[instrument(skip(self), fields(handler_id = %self.id))]
    pub async fn restore_credential(&self) -> Result<bool> {
        match self.credentials.load(self.id).await? {
            Some(credential) => {
                debug!(expires_at = %credential.expires_at, "Credential restored");
                self.guard.store(credential).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn renew(&self, current: Credential) -> Result<Credential> {
        let fresh = self
            .provider
            .refresh_token(&current)
            .await?
            .inherit_refresh_token(&current);
        self.persist(&fresh).await;
        Ok(fresh)
    }

    async fn authorize(&self) -> Result<()> {
        self.guard.ensure_valid(|current| self.renew(current)).await?;
        Ok(())
    }

    async fn access_token(&self) -> Result<String> {
        Ok(self.guard.access_token().await?)
    }

    async fn persist(&self, credential: &Credential) {
        if let Err(e) = self.credentials.save(self.id, credential).await {
            warn!(handler_id = %self.id, error = %e, "Credential kept in memory only");
        }
    }

    // ------------------------------------------------------------------
    // Account metadata
    // ------------------------------------------------------------------

    #[instrument(skip(self), fields(handler_id = %self.id))]
    pub async fn refresh_metadata(&self) -> Result<HandlerIdentity> {
        self.gate.check_reachable().await?;
        self.authorize().await?;

        let metadata = self
            .executor
            .execute("fetch_metadata", self, || async move {
                let token = self.access_token().await?;
                self.provider.fetch_metadata(&token).await
            })
            .await?;

        Ok(self.update_identity(|identity| identity.apply(&metadata)).await)
    }

    pub async fn identity(&self) -> HandlerIdentity {
        self.identity.read().await.clone()
    }

    pub async fn label(&self) -> String {
        self.identity.read().await.label.clone()
    }

    pub async fn total_capacity(&self) -> u64 {
        self.identity.read().await.total_capacity
    }

    pub async fn free_capacity(&self) -> u64 {
        self.identity.read().await.free_capacity
    }

    pub async fn set_label(&self, label: impl Into<String>) {
        let label = label.into();
        self.update_identity(|identity| identity.label = label).await;
    }

    pub async fn set_total_capacity(&self, total_capacity: u64) {
        self.update_identity(|identity| identity.total_capacity = total_capacity)
            .await;
    }

    pub async fn set_free_capacity(&self, free_capacity: u64) {
        self.update_identity(|identity| identity.free_capacity = free_capacity)
            .await;
    }

    async fn update_identity<F>(&self, change: F) -> HandlerIdentity
    where
        F: FnOnce(&mut HandlerIdentity),
    {
        let updated = {
            let mut identity = self.identity.write().await;
            change(&mut identity);
            identity.clone()
        };

        self.emit(CoreEvent::Handler(updated.to_event()));
        updated
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Seals and uploads `local_path` as `remote_name`. Returns the number of
    /// sealed bytes sent.
    #[instrument(skip(self, local_path), fields(handler_id = %self.id))]
    pub async fn upload(&self, local_path: impl AsRef<Path>, remote_name: &str) -> Result<u64> {
        let local_path = local_path.as_ref();
        self.gate.check_reachable().await?;
        self.authorize().await?;

        let size = fs::metadata(local_path).await?.len();
        let job = TransferJob {
            local_path: local_path.to_path_buf(),
            remote_name: remote_name.to_string(),
            size,
        };
        let strategy = self.dispatcher.strategy_for(size);
        let sealed_size = sealed_len(size);

        let mut progress = self.dispatcher.begin(
            remote_name,
            TransferDirection::Upload,
            sealed_size,
            Some(strategy),
        );
        let result = match strategy {
            TransferStrategy::Small => self.upload_small(&job, &mut progress).await,
            TransferStrategy::Large => self.upload_large(&job, sealed_size, &mut progress).await,
        };
        progress.finish(result)
    }

    async fn upload_small(&self, job: &TransferJob, progress: &mut TransferProgress) -> Result<u64> {
        progress.checkpoint()?;
        let file = fs::File::open(&job.local_path).await?;
        let content = self.cipher.encrypt(BufReader::new(file)).await?;
        let sent = content.len() as u64;

        self.executor
            .execute("upload_small", self, || {
                let content = content.clone();
                async move {
                    let token = self.access_token().await?;
                    self.provider.upload_small(&token, job, content).await
                }
            })
            .await?;

        Ok(sent)
    }

    async fn upload_large(
        &self,
        job: &TransferJob,
        sealed_size: u64,
        progress: &mut TransferProgress,
    ) -> Result<u64> {
        let session = self
            .executor
            .execute("start_large_upload", self, || async move {
                let token = self.access_token().await?;
                self.provider
                    .start_large_upload(&token, job, sealed_size)
                    .await
            })
            .await?;
        let session = &session;

        let file = fs::File::open(&job.local_path).await?;
        let mut source = SealedChunks::new(&self.cipher, file);
        let plan = self.dispatcher.upload_plan(sealed_size);
        debug!(chunks = plan.chunk_count(), "Uploading in chunks");

        for chunk in plan.chunks() {
            progress.checkpoint()?;

            let content = source.next_block(chunk.len as usize).await?;
            if content.len() as u64 != chunk.len {
                return Err(SyncError::RuntimeFailure(format!(
                    "{} changed size during upload",
                    job.local_path.display()
                )));
            }

            self.executor
                .execute("upload_large_chunk", self, || {
                    let content = content.clone();
                    async move {
                        let token = self.access_token().await?;
                        self.provider
                            .upload_large_chunk(&token, session, &chunk, content)
                            .await
                    }
                })
                .await?;
            progress.chunk_done(&chunk);
        }

        Ok(sealed_size)
    }

    /// Downloads `remote` in fixed-size chunks, decrypting into
    /// `destination`. Returns the plaintext byte count. A failed download
    /// leaves no file behind.
    #[instrument(skip(self, remote, destination), fields(handler_id = %self.id, remote_name = %remote.name))]
    pub async fn download(&self, remote: &RemoteFile, destination: impl AsRef<Path>) -> Result<u64> {
        let destination = destination.as_ref();
        self.gate.check_reachable().await?;
        self.authorize().await?;

        let plan = self.dispatcher.download_plan(remote.size);
        let mut progress =
            self.dispatcher
                .begin(&remote.name, TransferDirection::Download, remote.size, None);

        // Only a file this call created is removed on failure.
        let file = match fs::File::create(destination).await {
            Ok(file) => file,
            Err(e) => return progress.finish(Err(e.into())),
        };
        let result = self.download_chunks(remote, file, plan, &mut progress).await;
        if result.is_err() {
            let _ = fs::remove_file(destination).await;
        }
        progress.finish(result)
    }

    async fn download_chunks(
        &self,
        remote: &RemoteFile,
        mut file: fs::File,
        plan: ChunkPlan,
        progress: &mut TransferProgress,
    ) -> Result<u64> {
        let mut decryptor = self.cipher.decryptor();
        let mut written = 0u64;

        for chunk in plan.chunks() {
            progress.checkpoint()?;

            let content = self
                .executor
                .execute("download", self, || async move {
                    let token = self.access_token().await?;
                    self.provider.download(&token, remote, &chunk).await
                })
                .await?;
            if content.len() as u64 != chunk.len {
                return Err(SyncError::Provider(format!(
                    "expected {} bytes at offset {}, got {}",
                    chunk.len,
                    chunk.offset,
                    content.len()
                )));
            }

            let plain = decryptor.update(&content)?;
            file.write_all(&plain).await?;
            written += plain.len() as u64;
            progress.chunk_done(&chunk);
        }

        let tail = decryptor.finish()?;
        file.write_all(&tail).await?;
        file.flush().await?;
        Ok(written + tail.len() as u64)
    }

    #[instrument(skip(self), fields(handler_id = %self.id))]
    pub async fn list(&self) -> Result<Vec<RemoteFile>> {
        self.gate.check_reachable().await?;
        self.authorize().await?;

        let files = self
            .executor
            .execute("list", self, || async move {
                let token = self.access_token().await?;
                self.provider.list(&token).await
            })
            .await?;

        debug!(count = files.len(), "Listed remote files");
        Ok(files)
    }

    #[instrument(skip(self), fields(handler_id = %self.id))]
    pub async fn delete(&self, name: &str) -> Result<()> {
        self.gate.check_reachable().await?;
        self.authorize().await?;

        self.executor
            .execute("delete", self, || async move {
                let token = self.access_token().await?;
                self.provider.delete(&token, name).await
            })
            .await?;

        info!(name, "Remote file deleted");
        Ok(())
    }

    fn emit_auth(&self, event: AuthEvent) {
        self.emit(CoreEvent::Auth(event));
    }

    fn emit(&self, event: CoreEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(event);
        }
    }
}

#[async_trait]
impl Reauthenticate for StorageHandler {
    async fn current_token(&self) -> Option<String> {
        self.guard.access_token().await.ok()
    }

    async fn reauthenticate(&self, rejected: Option<String>) -> Result<()> {
        self.gate.check_reachable().await?;
        self.guard
            .refresh_rejected(rejected.as_deref(), |current| self.renew(current))
            .await?;
        Ok(())
    }
}

/// A handler displays as its account label.
impl fmt::Display for StorageHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identity.try_read() {
            Ok(identity) => f.write_str(&identity.label),
            Err(_) => Ok(()),
        }
    }
}

impl fmt::Debug for StorageHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandler")
            .field("id", &self.id)
            .field("cipher", &self.cipher)
            .field("gate", &self.gate)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
