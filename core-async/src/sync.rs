//! Synchronization primitives.
//!
//! Async-aware locks and channels from `tokio::sync`, plus the cooperative
//! cancellation token from `tokio-util`. All of them are `Send + Sync` and can
//! be shared across tasks behind an `Arc`.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::RwLock;
//!
//! async fn example() {
//!     let lock = RwLock::new(vec![1, 2, 3]);
//!     {
//!         let read = lock.read().await;
//!         assert_eq!(read.len(), 3);
//!     }
//!     lock.write().await.push(4);
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
