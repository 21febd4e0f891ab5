//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `ReachabilityProbe` using a TCP connect (`TcpReachabilityProbe`) or an
//!   HTTP `HEAD` request via `reqwest` (`HttpReachabilityProbe`)
//! - `SecureStore` using the `keyring` crate
//! - `ConfigSource` reading Java-style `.properties` files
//!
//! `LoginFlow` has no desktop default; the host application owns the
//! browser or web view that shows the consent page.
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{PropertiesFileSource, TcpReachabilityProbe};
//! use bridge_traits::{ConfigSource, ProbeTarget, ReachabilityProbe};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let probe = TcpReachabilityProbe::new();
//!     let online = probe
//!         .is_reachable(&ProbeTarget::new("graph.microsoft.com", 443), Duration::from_millis(1000))
//!         .await;
//!
//!     let props = PropertiesFileSource::default_location().load("onedrive").await;
//! }
//! ```

mod network;
mod properties;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use network::{HttpReachabilityProbe, TcpReachabilityProbe};
pub use properties::{parse_properties, PropertiesFileSource};

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
