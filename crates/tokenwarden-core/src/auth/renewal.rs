//! Silent credential renewal with a single-flight guarantee.
//!
//! At most one renewal round-trip to the identity provider is in flight at a
//! time. A caller arriving while one is pending awaits that same renewal and
//! observes its outcome; no second request is issued and the subscriber is
//! notified once.
//!
//! The renewal itself runs on its own spawned task. Dropping a waiter, or
//! stopping the monitor that started it, never cancels a renewal that has
//! already been sent: it still persists its result and notifies. Ending the
//! session does: a renewal that finishes after `invalidate` is discarded.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use super::notify::RefreshNotifier;
use super::store::CredentialStore;
use crate::error::RenewalError;
use crate::models::Credential;
use crate::provider::{IdentityProvider, Prompt, TokenClient};

type RenewalResult = Result<Credential, RenewalError>;
type InFlight = Shared<BoxFuture<'static, RenewalResult>>;

struct RenewerInner {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<CredentialStore>,
    notifier: Arc<RefreshNotifier>,
    client: RwLock<Option<Arc<dyn TokenClient>>>,
    in_flight: Mutex<Option<InFlight>>,
    /// Bumped by `invalidate`. Held while a renewal persists its result.
    epoch: Mutex<u64>,
}

/// Empties the single-flight slot when the renewal task ends, even by panic.
struct ClearSlot(Arc<RenewerInner>);

impl Drop for ClearSlot {
    fn drop(&mut self) {
        self.0.in_flight().take();
    }
}

impl RenewerInner {
    fn in_flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn epoch(&self) -> MutexGuard<'_, u64> {
        self.epoch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn client(&self) -> Option<Arc<dyn TokenClient>> {
        self.client
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// One provider round-trip: request, classify, persist, notify.
    ///
    /// `started` is the epoch the renewal was requested in; the result is
    /// dropped if the session was invalidated since.
    async fn renew_once(&self, started: u64) -> RenewalResult {
        let client = self.client().ok_or(RenewalError::NotInitialized)?;
        let previous = self.provider.current_token();

        debug!(prompt = %Prompt::Silent, "Requesting access token");
        let response = client.request_access_token(Prompt::Silent).await?;
        if let Some(error) = response.error {
            debug!(error = %error, description = ?response.error_description, "Provider refused silent renewal");
            return Err(RenewalError::ProviderRejected(error));
        }

        // An unchanged token means nothing new was issued.
        let grant = self
            .provider
            .current_token()
            .filter(|grant| previous.as_ref() != Some(grant))
            .ok_or(RenewalError::NoResponse)?;

        let credential = {
            let epoch = self.epoch();
            if *epoch != started {
                debug!("Session ended during renewal; discarding result");
                return Err(RenewalError::SessionEnded);
            }
            self.store
                .save_grant(grant)
                .map_err(|e| RenewalError::Storage(e.to_string()))?
        };

        info!(
            lifetime_secs = credential.lifetime_secs,
            scope = %credential.scope,
            "Credential renewed"
        );
        // Always after the store write, so status() already reflects it.
        self.notifier.notify(&credential);
        Ok(credential)
    }
}

/// Handle to the renewal protocol. Clones share the same single-flight slot.
#[derive(Clone)]
pub struct Renewer {
    inner: Arc<RenewerInner>,
}

impl Renewer {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<CredentialStore>,
        notifier: Arc<RefreshNotifier>,
    ) -> Self {
        Self {
            inner: Arc::new(RenewerInner {
                provider,
                store,
                notifier,
                client: RwLock::new(None),
                in_flight: Mutex::new(None),
                epoch: Mutex::new(0),
            }),
        }
    }

    /// Use `client` for subsequent renewals.
    pub fn install_client(&self, client: Arc<dyn TokenClient>) {
        *self
            .inner
            .client
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(client);
    }

    /// Drop the token client. Later renewals fail with `NotInitialized`.
    pub fn clear_client(&self) -> bool {
        self.inner
            .client
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .is_some()
    }

    /// End the current session: drop the token client and discard the
    /// result of any renewal still in flight.
    pub fn invalidate(&self) {
        // Waits out a renewal that is already writing its result.
        *self.inner.epoch() += 1;
        self.clear_client();
    }

    pub fn has_client(&self) -> bool {
        self.inner.client().is_some()
    }

    pub fn is_renewing(&self) -> bool {
        self.inner.in_flight().is_some()
    }

    /// Renew the credential without any user-visible prompt.
    ///
    /// Joins the pending renewal if one is in flight.
    pub async fn renew_silently(&self) -> RenewalResult {
        self.join_or_start().await
    }

    fn join_or_start(&self) -> InFlight {
        let mut slot = self.inner.in_flight();
        if let Some(pending) = slot.as_ref() {
            debug!("Joining in-flight renewal");
            return pending.clone();
        }

        let started = *self.inner.epoch();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            // Cleared before any waiter resumes, so a caller that sees this
            // outcome and renews again starts a fresh round-trip.
            let _clear = ClearSlot(Arc::clone(&inner));
            let result = inner.renew_once(started).await;
            if let Err(ref e) = result {
                warn!(error = %e, "Silent renewal failed");
            }
            result
        });

        let pending = async move {
            task.await.unwrap_or_else(|e| {
                Err(RenewalError::Provider(format!("renewal task failed: {}", e)))
            })
        }
        .boxed()
        .shared();

        *slot = Some(pending.clone());
        pending
    }
}
