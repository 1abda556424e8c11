//! Token lifecycle management for browser-style OAuth clients.
//!
//! A [`Session`] signs a user in through an [`IdentityProvider`], persists the
//! resulting [`Credential`] in a [`KeyValueStore`], and keeps it fresh with
//! single-flight silent renewal driven by a background monitor.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod provider;
pub mod storage;
pub mod utils;

pub use auth::{AuthOptions, Freshness, Session, Thresholds, TokenStatus};
pub use config::{Config, SessionConfig};
pub use error::{ProviderError, RenewalError, SessionError, StorageError, StoreError};
pub use models::{Credential, Scope, TokenGrant};
pub use provider::{IdentityProvider, Prompt, ProviderResponse, TokenClient};
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore};
