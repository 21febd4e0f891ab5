//! # Handler Configuration
//!
//! Settings and injected host capabilities for a storage handler.
//!
//! ## Overview
//!
//! - [`ProviderConfig`] - per-provider OAuth client settings, loaded from a
//!   key/value set (`clientId`, `clientSecret`, `loginUrl`, `redirectUri`, `scope`)
//! - [`RetryPolicy`] - backoff and re-authentication bounds for remote calls
//! - [`ConnectivityConfig`] - diagnostic endpoint probed before every operation
//! - [`TransferConfig`] - size threshold and chunk sizes for transfers
//! - [`HandlerConfig`] - all of the above plus the host bridges, assembled by
//!   [`HandlerConfigBuilder`]
//!
//! The builder enforces fail-fast validation. When the `desktop-shims` feature
//! is enabled, a TCP reachability probe and a keyring-backed secure store are
//! injected if the host did not provide them.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{HandlerConfig, ProviderConfig};
//!
//! let provider = ProviderConfig::from_properties(&properties)?;
//! let config = HandlerConfig::builder()
//!     .provider(provider)
//!     .probe_host("www.googleapis.com")
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, ConfigSource, LoginFlow, ReachabilityProbe, SecureStore, SystemClock,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Property keys read by [`ProviderConfig::from_properties`].
pub mod keys {
    pub const CLIENT_ID: &str = "clientId";
    pub const CLIENT_SECRET: &str = "clientSecret";
    pub const LOGIN_URL: &str = "loginUrl";
    pub const REDIRECT_URI: &str = "redirectUri";
    pub const SCOPE: &str = "scope";
}

/// OAuth client settings for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Authorization endpoint, including the trailing `?` (or `&`) that
    /// query parameters are appended to.
    pub login_url: String,
    pub redirect_uri: String,
    pub scope: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("login_url", &self.login_url)
            .field("redirect_uri", &self.redirect_uri)
            .field("scope", &self.scope)
            .finish()
    }
}

impl ProviderConfig {
    /// Builds a config from a loaded key/value set.
    ///
    /// Every key in [`keys`] must be present; the error names the first
    /// missing one.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| -> Result<String> {
            properties
                .get(key)
                .map(|value| value.trim().to_string())
                .ok_or_else(|| {
                    Error::Config(format!("Provider property '{}' is missing", key))
                })
        };

        let config = Self {
            client_id: get(keys::CLIENT_ID)?,
            client_secret: get(keys::CLIENT_SECRET)?,
            login_url: get(keys::LOGIN_URL)?,
            redirect_uri: get(keys::REDIRECT_URI)?,
            scope: get(keys::SCOPE)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads the key/value set named `provider` (for example `"googledrive"`)
    /// from `source`.
    pub async fn load(source: &dyn ConfigSource, provider: &str) -> Result<Self> {
        let properties = source.load(provider).await?;
        Self::from_properties(&properties)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            (keys::CLIENT_ID, &self.client_id),
            (keys::CLIENT_SECRET, &self.client_secret),
            (keys::LOGIN_URL, &self.login_url),
            (keys::REDIRECT_URI, &self.redirect_uri),
            (keys::SCOPE, &self.scope),
        ];

        for (key, value) in fields {
            if value.is_empty() {
                return Err(Error::Config(format!(
                    "Provider property '{}' cannot be empty",
                    key
                )));
            }
        }

        Ok(())
    }
}

/// Inclusive range, in milliseconds, that backoff jitter is drawn from.
///
/// The lower bound may be negative, which shortens a delay below its
/// exponential floor. Delays never go below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterRange {
    pub min_ms: i64,
    pub max_ms: i64,
}

impl JitterRange {
    pub const fn symmetric(bound_ms: i64) -> Self {
        Self {
            min_ms: -bound_ms,
            max_ms: bound_ms,
        }
    }

    pub const fn none() -> Self {
        Self {
            min_ms: 0,
            max_ms: 0,
        }
    }

    /// Applies `jitter_ms` to `base`, clamping at zero.
    pub fn apply(base: Duration, jitter_ms: i64) -> Duration {
        let base_ms = i64::try_from(base.as_millis()).unwrap_or(i64::MAX);
        let total = base_ms.saturating_add(jitter_ms).max(0);
        Duration::from_millis(total as u64)
    }
}

impl Default for JitterRange {
    fn default() -> Self {
        Self::symmetric(999)
    }
}

/// Retry behaviour for remote operations.
///
/// A `ServiceUnavailable` failure is retried with exponential backoff until
/// `max_attempts` calls have been made. An `Unauthorized` failure triggers a
/// credential refresh and an immediate retry that does not count as an
/// attempt; at most `max_unauthorized_refreshes` such refreshes happen per
/// execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: JitterRange,
    pub max_unauthorized_refreshes: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            jitter: JitterRange::default(),
            max_unauthorized_refreshes: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterRange) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_unauthorized_refreshes(mut self, refreshes: u32) -> Self {
        self.max_unauthorized_refreshes = refreshes;
        self
    }

    /// Backoff before jitter for zero-based attempt `attempt`: `2^attempt * base_delay`.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "Retry policy needs at least one attempt".to_string(),
            ));
        }

        if self.max_attempts > 16 {
            return Err(Error::Config(
                "Retry policy max_attempts exceeds maximum of 16".to_string(),
            ));
        }

        if self.jitter.min_ms > self.jitter.max_ms {
            return Err(Error::Config(format!(
                "Jitter range is inverted: {}..={} ms",
                self.jitter.min_ms, self.jitter.max_ms
            )));
        }

        Ok(())
    }
}

/// Diagnostic endpoint checked before each remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityConfig {
    pub probe_host: String,
    pub probe_port: u16,
    pub timeout: Duration,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_host: "www.google.com".to_string(),
            probe_port: 443,
            timeout: Duration::from_millis(1000),
        }
    }
}

impl ConnectivityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.probe_host.trim().is_empty() {
            return Err(Error::Config("Probe host cannot be empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config(
                "Probe timeout must be greater than 0ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Transfer sizing. Files strictly below `small_file_threshold` bytes use the
/// single-request upload; everything else is chunked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    pub small_file_threshold: u64,
    pub upload_chunk_size: usize,
    pub download_chunk_size: usize,
}

pub const SMALL_FILE_THRESHOLD: u64 = 10_000_000;
/// 7 x 320 KiB. Resumable-upload endpoints reject chunks that are not
/// multiples of 320 KiB.
pub const UPLOAD_CHUNK_SIZE: usize = 7 * 320 * 1024;
pub const DOWNLOAD_CHUNK_SIZE: usize = 5 * 1024 * 1024;

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            small_file_threshold: SMALL_FILE_THRESHOLD,
            upload_chunk_size: UPLOAD_CHUNK_SIZE,
            download_chunk_size: DOWNLOAD_CHUNK_SIZE,
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.upload_chunk_size == 0 || self.download_chunk_size == 0 {
            return Err(Error::Config(
                "Chunk sizes must be greater than 0 bytes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a storage handler needs, fully resolved.
#[derive(Clone)]
pub struct HandlerConfig {
    pub provider: ProviderConfig,
    pub retry: RetryPolicy,
    pub connectivity: ConnectivityConfig,
    pub transfer: TransferConfig,

    /// Connectivity check (required; desktop default: TCP connect)
    pub reachability_probe: Arc<dyn ReachabilityProbe>,

    /// Credential persistence (required; desktop default: OS keyring)
    pub secure_store: Arc<dyn SecureStore>,

    /// Consent page driver (optional; login fails without it)
    pub login_flow: Option<Arc<dyn LoginFlow>>,

    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HandlerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerConfig")
            .field("provider", &self.provider)
            .field("retry", &self.retry)
            .field("connectivity", &self.connectivity)
            .field("transfer", &self.transfer)
            .field("reachability_probe", &"ReachabilityProbe { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field(
                "login_flow",
                &self.login_flow.as_ref().map(|_| "LoginFlow { ... }"),
            )
            .finish()
    }
}

impl HandlerConfig {
    pub fn builder() -> HandlerConfigBuilder {
        HandlerConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.provider.validate()?;
        self.retry.validate()?;
        self.connectivity.validate()?;
        self.transfer.validate()?;
        Ok(())
    }

    /// The login collaborator, or an actionable error when none was injected.
    pub fn require_login_flow(&self) -> Result<Arc<dyn LoginFlow>> {
        self.login_flow.clone().ok_or_else(|| Error::CapabilityMissing {
            capability: "LoginFlow".to_string(),
            message: "A LoginFlow implementation is required to sign in. \
                      Inject one that opens the provider consent page and returns \
                      the redirect URL (embedded web view, system browser with loopback \
                      redirect, or a headless test double)."
                .to_string(),
        })
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_probe() -> Result<Arc<dyn ReachabilityProbe>> {
    use bridge_desktop::TcpReachabilityProbe;

    let probe: Arc<dyn ReachabilityProbe> = Arc::new(TcpReachabilityProbe::new());
    Ok(probe)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_probe() -> Result<Arc<dyn ReachabilityProbe>> {
    Err(capability_missing(
        "ReachabilityProbe",
        "ReachabilityProbe implementation is required to check connectivity before remote calls. \
         Desktop: ensure the 'desktop-shims' feature is enabled to use the default TcpReachabilityProbe. \
         Mobile: inject a probe backed by the platform network monitor.",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    let store: Arc<dyn SecureStore> = Arc::new(KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(capability_missing(
        "SecureStore",
        "SecureStore implementation is required for credential persistence. \
         Desktop: ensure the 'desktop-shims' feature is enabled to use the default KeyringSecureStore. \
         Mobile: inject platform-native secure storage (Keychain/Keystore).",
    ))
}

/// Builder for [`HandlerConfig`].
#[derive(Default)]
pub struct HandlerConfigBuilder {
    provider: Option<ProviderConfig>,
    retry: Option<RetryPolicy>,
    connectivity: ConnectivityConfig,
    transfer: Option<TransferConfig>,
    reachability_probe: Option<Arc<dyn ReachabilityProbe>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    login_flow: Option<Arc<dyn LoginFlow>>,
    clock: Option<Arc<dyn Clock>>,
}

impl HandlerConfigBuilder {
    /// Sets the provider client settings (required).
    pub fn provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Default: 5 attempts, 1 s base delay, ±999 ms jitter, 2 refreshes.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn connectivity(mut self, connectivity: ConnectivityConfig) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn probe_host(mut self, host: impl Into<String>) -> Self {
        self.connectivity.probe_host = host.into();
        self
    }

    pub fn probe_port(mut self, port: u16) -> Self {
        self.connectivity.probe_port = port;
        self
    }

    /// Default: 1000 ms.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.connectivity.timeout = timeout;
        self
    }

    pub fn transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = Some(transfer);
        self
    }

    pub fn reachability_probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.reachability_probe = Some(probe);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn login_flow(mut self, flow: Arc<dyn LoginFlow>) -> Self {
        self.login_flow = Some(flow);
        self
    }

    /// Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Resolves defaults and validates.
    ///
    /// Fails with [`Error::Config`] when the provider is missing or a value is
    /// out of range, and with [`Error::CapabilityMissing`] when a required
    /// bridge was not injected and no desktop default is available.
    pub fn build(self) -> Result<HandlerConfig> {
        let provider = self.provider.ok_or_else(|| {
            Error::Config("Provider config is required. Use .provider() to set it.".to_string())
        })?;

        let reachability_probe = match self.reachability_probe {
            Some(probe) => probe,
            None => provide_default_probe()?,
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let config = HandlerConfig {
            provider,
            retry: self.retry.unwrap_or_default(),
            connectivity: self.connectivity,
            transfer: self.transfer.unwrap_or_default(),
            reachability_probe,
            secure_store,
            login_flow: self.login_flow,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
