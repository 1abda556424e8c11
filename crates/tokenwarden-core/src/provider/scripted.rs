//! In-process identity provider driven by scripted outcomes.
//!
//! Requests consume queued outcomes per prompt mode; with an empty queue a
//! request succeeds with a freshly numbered token. Useful for tests and for
//! walking through the session lifecycle without a browser.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{IdentityProvider, Prompt, ProviderResponse, TokenClient};
use crate::error::ProviderError;
use crate::models::{Scope, TokenGrant};

/// Default lifetime of scripted tokens (one hour, like Google access tokens).
const DEFAULT_LIFETIME_SECS: u64 = 3600;

/// What the next token request of a given prompt mode does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Succeed and make this grant the current token.
    Grant(TokenGrant),
    /// Succeed with a generated token.
    Fresh,
    /// Respond with an `error` code.
    Reject(String),
    /// Succeed without leaving a retrievable token.
    Empty,
    /// Succeed but leave the current token as it was.
    Unchanged,
    /// Fail the request itself.
    Fault(String),
}

#[derive(Default)]
struct ScriptState {
    initialized: bool,
    scope: Scope,
    token: Option<TokenGrant>,
    silent: VecDeque<ScriptedOutcome>,
    consent: VecDeque<ScriptedOutcome>,
    issued: u64,
}

struct Inner {
    state: Mutex<ScriptState>,
    lifetime_secs: u64,
    latency: Duration,
    init_failure: Option<String>,
    silent_requests: AtomicUsize,
    consent_requests: AtomicUsize,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
pub struct ScriptedProvider {
    inner: Arc<Inner>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::build(DEFAULT_LIFETIME_SECS, Duration::ZERO, None)
    }

    fn build(lifetime_secs: u64, latency: Duration, init_failure: Option<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ScriptState::default()),
                lifetime_secs,
                latency,
                init_failure,
                silent_requests: AtomicUsize::new(0),
                consent_requests: AtomicUsize::new(0),
            }),
        }
    }

    /// Lifetime of generated tokens.
    pub fn with_lifetime(self, lifetime_secs: u64) -> Self {
        Self::build(lifetime_secs, self.inner.latency, self.inner.init_failure.clone())
    }

    /// Delay every token request by `latency` before it completes.
    pub fn with_latency(self, latency: Duration) -> Self {
        Self::build(self.inner.lifetime_secs, latency, self.inner.init_failure.clone())
    }

    /// Make `initialize` fail with `message`.
    pub fn failing_init(self, message: impl Into<String>) -> Self {
        Self::build(self.inner.lifetime_secs, self.inner.latency, Some(message.into()))
    }

    pub fn push_silent(&self, outcome: ScriptedOutcome) {
        self.inner.state().silent.push_back(outcome);
    }

    pub fn push_consent(&self, outcome: ScriptedOutcome) {
        self.inner.state().consent.push_back(outcome);
    }

    pub fn silent_requests(&self) -> usize {
        self.inner.silent_requests.load(Ordering::SeqCst)
    }

    pub fn consent_requests(&self) -> usize {
        self.inner.consent_requests.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state().initialized
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn initialize(&self, _api_key: &str, discovery_docs: &[String]) -> Result<(), ProviderError> {
        if let Some(ref message) = self.inner.init_failure {
            return Err(ProviderError::Init(message.clone()));
        }
        debug!(discovery_docs = discovery_docs.len(), "Scripted provider initialized");
        self.inner.state().initialized = true;
        Ok(())
    }

    async fn init_token_client(
        &self,
        _client_id: &str,
        scope: &Scope,
    ) -> Result<Arc<dyn TokenClient>, ProviderError> {
        self.inner.state().scope = scope.clone();
        Ok(Arc::new(ScriptedTokenClient {
            inner: Arc::clone(&self.inner),
        }))
    }

    fn current_token(&self) -> Option<TokenGrant> {
        self.inner.state().token.clone()
    }

    fn set_token(&self, token: Option<TokenGrant>) {
        self.inner.state().token = token;
    }
}

struct ScriptedTokenClient {
    inner: Arc<Inner>,
}

#[async_trait]
impl TokenClient for ScriptedTokenClient {
    async fn request_access_token(&self, prompt: Prompt) -> Result<ProviderResponse, ProviderError> {
        let counter = match prompt {
            Prompt::Silent => &self.inner.silent_requests,
            Prompt::Consent => &self.inner.consent_requests,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        if !self.inner.latency.is_zero() {
            tokio::time::sleep(self.inner.latency).await;
        }

        let mut state = self.inner.state();
        let queued = match prompt {
            Prompt::Silent => state.silent.pop_front(),
            Prompt::Consent => state.consent.pop_front(),
        };

        match queued.unwrap_or(ScriptedOutcome::Fresh) {
            ScriptedOutcome::Grant(grant) => {
                state.token = Some(grant);
                Ok(ProviderResponse::success())
            }
            ScriptedOutcome::Fresh => {
                state.issued += 1;
                state.token = Some(TokenGrant {
                    access_token: format!("scripted-token-{}", state.issued),
                    expires_in: self.inner.lifetime_secs,
                    scope: state.scope.clone(),
                });
                Ok(ProviderResponse::success())
            }
            ScriptedOutcome::Reject(error) => Ok(ProviderResponse::rejected(error)),
            ScriptedOutcome::Empty => {
                state.token = None;
                Ok(ProviderResponse::success())
            }
            ScriptedOutcome::Unchanged => Ok(ProviderResponse::success()),
            ScriptedOutcome::Fault(message) => Err(ProviderError::Transport(message)),
        }
    }
}
