//! # Storage Handler Core
//!
//! The resilient-operation layer between a host application and a cloud
//! storage provider.
//!
//! ## Components
//!
//! - **Connectivity Gate** (`connectivity`): reachability precondition run before every remote operation
//! - **Resilient Executor** (`retry`): refresh-and-retry on `Unauthorized`, exponential backoff on `ServiceUnavailable`
//! - **Transfer Dispatcher** (`dispatcher`): small vs chunked strategy selection and chunk progress
//! - **Provider Operations** (`provider`): the trait a concrete backend implements
//! - **Storage Handler** (`handler`): the facade tying the above to credentials and encryption
//! - **JSON helpers** (`json`): field extraction for provider implementations
//!
//! Credentials come from `core-auth`, content encryption from `core-crypto`.

pub mod connectivity;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod identity;
pub mod json;
pub mod provider;
pub mod retry;

pub use connectivity::ConnectivityGate;
pub use dispatcher::{select_strategy, Chunk, ChunkPlan, TransferDispatcher, TransferProgress};
pub use error::{Result, SyncError};
pub use handler::StorageHandler;
pub use identity::{AccountMetadata, HandlerIdentity};
pub use provider::{ProviderOperations, RemoteFile, TransferJob, UploadSession};
pub use retry::{Reauthenticate, ResilientExecutor};
