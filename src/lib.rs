//! Workspace facade crate.
//!
//! Re-exports the storage handler core so host applications can depend on
//! `cloudsync-workspace` alone. The `desktop-shims` feature (default) pulls in
//! the desktop bridge implementations and lets [`HandlerConfig`] fall back to
//! them when a capability is not injected.

pub use bridge_traits as bridge;
pub use core_auth as auth;
pub use core_crypto as crypto;
pub use core_runtime as runtime;
pub use core_sync as sync;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;

pub use core_runtime::config::{HandlerConfig, ProviderConfig, RetryPolicy};
pub use core_sync::{ProviderOperations, StorageHandler, SyncError};
