//! Identity-provider collaborator contract.
//!
//! The session never talks to an authorization server directly. It drives an
//! `IdentityProvider` (client bootstrap and the in-memory current token) and a
//! `TokenClient` obtained from it (token requests, silent or interactive).
//!
//! A request either comes back with an `error` code, or succeeds implicitly:
//! the new token is then retrievable through `IdentityProvider::current_token`.

pub mod scripted;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::models::{Scope, TokenGrant};

pub use scripted::{ScriptedOutcome, ScriptedProvider};

/// How a token request may interact with the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// No user-visible consent UI. Fails if consent is required.
    Silent,
    /// Show the consent screen.
    Consent,
}

impl Prompt {
    /// The provider's `prompt` parameter value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Prompt::Silent => "",
            Prompt::Consent => "consent",
        }
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Prompt::Silent => "silent",
            Prompt::Consent => "consent",
        })
    }
}

/// Completion of a token request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ProviderResponse {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            error_description: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Handle for requesting tokens for one client id and scope.
#[async_trait]
pub trait TokenClient: Send + Sync {
    async fn request_access_token(&self, prompt: Prompt) -> Result<ProviderResponse, ProviderError>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Bootstrap the API client with the caller's API key.
    async fn initialize(&self, api_key: &str, discovery_docs: &[String]) -> Result<(), ProviderError>;

    /// Establish a token client for `client_id` requesting `scope`.
    async fn init_token_client(
        &self,
        client_id: &str,
        scope: &Scope,
    ) -> Result<Arc<dyn TokenClient>, ProviderError>;

    /// The token currently held by the API client, if any.
    fn current_token(&self) -> Option<TokenGrant>;

    /// Replace (or clear, with `None`) the API client's in-memory token.
    fn set_token(&self, token: Option<TokenGrant>);
}
