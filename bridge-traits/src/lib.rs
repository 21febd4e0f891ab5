//! # Host Bridge Traits
//!
//! Capabilities the storage handler core needs from its host but cannot
//! implement portably itself.
//!
//! ## Traits
//!
//! ### Connectivity
//! - [`ReachabilityProbe`](network::ReachabilityProbe) - Probe a diagnostic endpoint before remote calls
//!
//! ### Authentication
//! - [`LoginFlow`](login::LoginFlow) - Drive the user through the provider consent page
//!
//! ### Security & Configuration
//! - [`SecureStore`](storage::SecureStore) - Credential and key persistence (Keychain/Keystore)
//! - [`ConfigSource`](storage::ConfigSource) - Per-provider client settings
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic expiry checks
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Implementations
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it with actionable messages and never
//! include secret values.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single implementation can be
//! shared behind an `Arc` by concurrently running operations.

pub mod error;
pub mod login;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use login::LoginFlow;
pub use network::{ProbeTarget, Reachability, ReachabilityProbe};
pub use storage::{ConfigSource, SecureStore, StaticConfigSource};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
