//! Async byte streams.
//!
//! Reader and writer traits plus their extension methods, for code that
//! pipes file content through transforms without naming Tokio.

pub use tokio::io::{
    empty, sink, AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    BufWriter, Empty, Sink,
};
