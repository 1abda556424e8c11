//! Session façade.
//!
//! A `Session` is the explicit context for one signed-in user: the provider
//! client handle, the refresh subscriber and the background monitor all live
//! here. It is constructed up front, populated by `authenticate` and torn down
//! by `logout`.

use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use super::monitor::{Monitor, MonitorState};
use super::notify::{RefreshCallback, RefreshNotifier};
use super::policy::{remaining, Freshness};
use super::renewal::Renewer;
use super::store::CredentialStore;
use crate::config::SessionConfig;
use crate::error::{ProviderError, RenewalError, SessionError};
use crate::models::Credential;
use crate::provider::{IdentityProvider, Prompt};
use crate::storage::KeyValueStore;
use crate::utils::format_remaining;

/// Options for `Session::authenticate`.
#[derive(Clone)]
pub struct AuthOptions {
    /// Start the background monitor after a successful sign-in.
    pub auto_refresh: bool,
    /// Replaces the current refresh subscriber when set.
    pub on_token_refresh: Option<RefreshCallback>,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            on_token_refresh: None,
        }
    }
}

impl AuthOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    pub fn on_token_refresh<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Credential) + Send + Sync + 'static,
    {
        self.on_token_refresh = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOptions")
            .field("auto_refresh", &self.auto_refresh)
            .field("on_token_refresh", &self.on_token_refresh.is_some())
            .finish()
    }
}

/// Read-only snapshot of the stored credential's freshness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub valid: bool,
    pub needs_refresh: bool,
    pub time_until_expiry: Duration,
    pub credential: Option<Credential>,
}

impl TokenStatus {
    pub fn freshness(&self) -> Freshness {
        if self.credential.is_none() || self.time_until_expiry <= Duration::zero() {
            Freshness::Expired
        } else if self.needs_refresh {
            Freshness::RenewDue
        } else {
            Freshness::Valid
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.credential.is_none() {
            return f.write_str("no credential");
        }
        match self.freshness() {
            Freshness::Expired => f.write_str("expired"),
            freshness => write!(
                f,
                "{}, expires in {}",
                freshness,
                format_remaining(self.time_until_expiry)
            ),
        }
    }
}

pub struct Session {
    config: SessionConfig,
    provider: Arc<dyn IdentityProvider>,
    store: Arc<CredentialStore>,
    notifier: Arc<RefreshNotifier>,
    renewer: Renewer,
    monitor: Monitor,
    auth_gate: AsyncMutex<()>,
}

impl Session {
    pub fn new(
        provider: impl IdentityProvider + 'static,
        backend: impl KeyValueStore + 'static,
        config: SessionConfig,
    ) -> Self {
        let provider: Arc<dyn IdentityProvider> = Arc::new(provider);
        let store = Arc::new(CredentialStore::new(backend, config.storage_key.clone()));
        let notifier = Arc::new(RefreshNotifier::new());
        let renewer = Renewer::new(Arc::clone(&provider), Arc::clone(&store), Arc::clone(&notifier));

        Self {
            config,
            provider,
            store,
            notifier,
            renewer,
            monitor: Monitor::new(),
            auth_gate: AsyncMutex::new(()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Sign in, reusing a stored usable credential when there is one.
    ///
    /// Returns `true` when the session ends up with a usable credential in the
    /// store. Every failure, including provider faults, is logged and reduced
    /// to `false`. Concurrent calls on one session run one at a time.
    pub async fn authenticate(&self, api_key: &str, client_id: &str, options: AuthOptions) -> bool {
        let _gate = self.auth_gate.lock().await;

        let signed_in = match self.sign_in(api_key, client_id, &options).await {
            Ok(signed_in) => signed_in,
            Err(e) => {
                error!(error = %e, "Authentication failed");
                false
            }
        };

        if !options.auto_refresh {
            self.monitor.stop();
        } else if signed_in {
            self.monitor.start(
                self.renewer.clone(),
                Arc::clone(&self.store),
                self.config.thresholds,
            );
        }
        signed_in
    }

    async fn sign_in(
        &self,
        api_key: &str,
        client_id: &str,
        options: &AuthOptions,
    ) -> Result<bool, ProviderError> {
        self.provider
            .initialize(api_key, &self.config.discovery_docs)
            .await?;
        let client = self
            .provider
            .init_token_client(client_id, &self.config.scope)
            .await?;
        self.renewer.install_client(Arc::clone(&client));
        debug!(scope = %self.config.scope, "Identity provider client ready");

        if let Some(ref callback) = options.on_token_refresh {
            self.notifier.subscribe(Arc::clone(callback));
        }

        let stored = self.store.load();
        if self.config.thresholds.is_usable(stored.as_ref(), Utc::now()) {
            if let Some(credential) = stored {
                info!(
                    remaining = %format_remaining(remaining(Some(&credential), Utc::now())),
                    "Using existing valid credential"
                );
                self.provider.set_token(Some(credential.to_grant()));
                return Ok(true);
            }
        }

        // A stale credential still goes to the client before the consent request.
        if let Some(ref credential) = stored {
            self.provider.set_token(Some(credential.to_grant()));
        }
        let previous = self.provider.current_token();

        info!("Requesting interactive authorization");
        let response = client.request_access_token(Prompt::Consent).await?;
        if let Some(error) = response.error {
            warn!(
                error = %error,
                description = ?response.error_description,
                "Interactive authorization was not granted"
            );
            return Ok(false);
        }

        let issued = self
            .provider
            .current_token()
            .filter(|grant| previous.as_ref() != Some(grant));
        let Some(grant) = issued else {
            warn!("Authorization completed without issuing a new token");
            return Ok(false);
        };
        match self.store.save_grant(grant) {
            Ok(credential) => {
                info!(
                    lifetime_secs = credential.lifetime_secs,
                    scope = %credential.scope,
                    "Signed in"
                );
                Ok(true)
            }
            Err(e) => {
                error!(error = %e, "Failed to persist new credential");
                Ok(false)
            }
        }
    }

    /// Tear down the session: stop the monitor, drop the subscriber and the
    /// client handle, forget the provider's token and clear the store. A
    /// renewal still in flight is discarded when it completes.
    ///
    /// Returns `false` only if clearing the store fails.
    pub fn logout(&self) -> bool {
        self.monitor.stop();
        self.notifier.unsubscribe();
        self.renewer.invalidate();
        self.provider.set_token(None);

        match self.store.clear() {
            Ok(()) => {
                info!("Logged out");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to clear stored credential during logout");
                false
            }
        }
    }

    pub fn status(&self) -> TokenStatus {
        let now = Utc::now();
        let credential = self.store.load();
        let thresholds = &self.config.thresholds;

        TokenStatus {
            valid: thresholds.is_usable(credential.as_ref(), now),
            needs_refresh: thresholds.needs_renewal(credential.as_ref(), now),
            time_until_expiry: remaining(credential.as_ref(), now),
            credential,
        }
    }

    /// Renew now, outside the monitor's cadence. Joins a renewal already in flight.
    ///
    /// Classified renewal failures yield `Ok(false)`; only collaborator
    /// faults are returned as errors.
    pub async fn force_refresh(&self) -> Result<bool, SessionError> {
        match self.renewer.renew_silently().await {
            Ok(_) => Ok(true),
            Err(RenewalError::Provider(message)) => Err(SessionError::Provider(message)),
            Err(e) => {
                warn!(error = %e, "Forced refresh failed");
                Ok(false)
            }
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.state() == MonitorState::Running
    }

    /// Stop background renewal without signing out. Returns whether it was running.
    pub fn stop_monitoring(&self) -> bool {
        self.monitor.stop()
    }
}
