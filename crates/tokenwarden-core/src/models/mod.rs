//! Data models for delegated-access credentials.
//!
//! - `Credential`: a bearer token with issuance time and lifetime
//! - `TokenGrant`: the provider's view of a token before it is stamped
//! - `Scope`: the set of permissions granted with a token

pub mod credential;

pub use credential::{Credential, Scope, TokenGrant};
