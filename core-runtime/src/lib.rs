//! # Core Runtime
//!
//! Shared runtime infrastructure for the storage handler core:
//! - Handler configuration ([`config`])
//! - Event bus ([`events`])
//! - Logging and tracing setup ([`logging`])
//!
//! Every other core crate depends on this one for its configuration types
//! and for the event and logging conventions it establishes.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
