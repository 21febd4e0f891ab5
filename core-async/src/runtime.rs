//! Runtime handles.

pub use tokio::runtime::{Builder, Handle, Runtime};

use std::future::Future;

/// Runs a future to completion on a fresh current-thread runtime.
///
/// Intended for synchronous call sites such as tracing layers that fire
/// outside of any runtime. Must not be called from inside a runtime.
pub fn block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
