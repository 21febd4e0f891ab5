//! Async runtime layer for the cloudsync core.
//!
//! Every `core-*` crate goes through this crate for timers, locks, task
//! spawning and cancellation instead of naming Tokio directly, so the
//! runtime choice stays in one place.
//!
//! # Modules
//!
//! - `task`: task spawning
//! - `io`: async reader and writer traits
//! - `fs`: async file access
//! - `time`: sleeps, timeouts and the cancellable sleep used by retry backoff
//! - `sync`: locks, channels and [`CancellationToken`](sync::CancellationToken)
//! - `runtime`: runtime handles for code that must bridge into async
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::time::{sleep_cancellable, Duration};
//!
//! async fn wait_or_stop(token: &CancellationToken) -> bool {
//!     sleep_cancellable(Duration::from_millis(250), token).await
//! }
//! ```

pub mod fs;
pub mod io;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
