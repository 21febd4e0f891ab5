//! # Authentication Module
//!
//! Credential lifecycle for a storage handler.
//!
//! ## Overview
//!
//! - [`Credential`] - access/refresh token pair with an absolute expiry
//! - [`CredentialGuard`] - refreshes the credential once it has expired and
//!   serializes concurrent refreshes
//! - [`login`] - consent URL construction and the authorization-code request
//! - [`CredentialStore`] - persistence in the host secure store
//!
//! Exchanging codes and refreshing tokens are provider calls; this crate
//! takes them as closures so it never depends on a concrete provider.

pub mod error;
pub mod guard;
pub mod login;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use guard::CredentialGuard;
pub use login::{build_login_url, request_authorization_code, REDIRECT_MARKER};
pub use token_store::CredentialStore;
pub use types::{Credential, HandlerId};
