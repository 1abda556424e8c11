//! Background credential monitor.
//!
//! While running, the monitor wakes every poll interval, reads the stored
//! credential and triggers a silent renewal when it is inside the renewal
//! window. A failed tick is logged and retried on the next tick; the poll
//! interval is the only rate limit. The monitor never starts an interactive
//! flow.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::policy::{remaining, Thresholds};
use super::renewal::Renewer;
use super::store::CredentialStore;
use crate::error::RenewalError;
use crate::models::Credential;

/// Shortest accepted poll interval; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Running,
}

/// Result of one monitor check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Outside the renewal window; nothing to do.
    Fresh,
    Renewed(Credential),
    Failed(RenewalError),
}

enum Slot {
    Stopped,
    Running(JoinHandle<()>),
}

pub struct Monitor {
    slot: Mutex<Slot>,
    ticks: Arc<AtomicU64>,
}

impl Monitor {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Stopped),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start polling. A running monitor is stopped first, so timers never stack.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, renewer: Renewer, store: Arc<CredentialStore>, thresholds: Thresholds) {
        let mut slot = self.slot();
        if let Slot::Running(previous) = std::mem::replace(&mut *slot, Slot::Stopped) {
            debug!("Replacing running credential monitor");
            previous.abort();
        }

        let period = thresholds.poll_interval.max(MIN_POLL_INTERVAL);
        let ticks = Arc::clone(&self.ticks);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First check happens one full period after start.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                ticks.fetch_add(1, Ordering::Relaxed);
                match check_once(&renewer, &store, &thresholds).await {
                    TickOutcome::Fresh => {}
                    TickOutcome::Renewed(_) => debug!("Monitor tick renewed credential"),
                    TickOutcome::Failed(e) if e.requires_interaction() => {
                        warn!(error = %e, "Silent renewal refused; interactive sign-in required");
                    }
                    TickOutcome::Failed(e) => {
                        warn!(error = %e, "Monitor tick failed; retrying next interval");
                    }
                }
            }
        });

        *slot = Slot::Running(task);
        info!(poll_interval_secs = period.as_secs(), "Credential monitor started");
    }

    /// Cancel future ticks. A renewal already in flight still completes.
    /// Returns whether the monitor was running.
    pub fn stop(&self) -> bool {
        match std::mem::replace(&mut *self.slot(), Slot::Stopped) {
            Slot::Running(task) => {
                task.abort();
                info!("Credential monitor stopped");
                true
            }
            Slot::Stopped => false,
        }
    }

    pub fn state(&self) -> MonitorState {
        match &*self.slot() {
            Slot::Running(task) if !task.is_finished() => MonitorState::Running,
            _ => MonitorState::Stopped,
        }
    }

    /// Number of checks performed since this monitor was created.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Slot::Running(task) = std::mem::replace(&mut *self.slot(), Slot::Stopped) {
            task.abort();
        }
    }
}

/// Run a single check: renew when the stored credential is absent or inside
/// the renewal window.
pub async fn check_once(
    renewer: &Renewer,
    store: &CredentialStore,
    thresholds: &Thresholds,
) -> TickOutcome {
    let now = Utc::now();
    let current = store.load();
    if !thresholds.needs_renewal(current.as_ref(), now) {
        debug!(
            remaining_secs = remaining(current.as_ref(), now).num_seconds(),
            "Credential fresh; no renewal needed"
        );
        return TickOutcome::Fresh;
    }

    debug!(has_credential = current.is_some(), "Credential inside renewal window");
    match renewer.renew_silently().await {
        Ok(credential) => TickOutcome::Renewed(credential),
        Err(e) => TickOutcome::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::notify::RefreshNotifier;
    use crate::models::Scope;
    use crate::provider::{IdentityProvider, ScriptedOutcome, ScriptedProvider};
    use crate::storage::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::AtomicUsize;

    const POLL: Duration = Duration::from_secs(300);

    struct Harness {
        provider: ScriptedProvider,
        store: Arc<CredentialStore>,
        renewer: Renewer,
        notified: Arc<AtomicUsize>,
    }

    async fn harness() -> Harness {
        let provider = ScriptedProvider::new();
        let store = Arc::new(CredentialStore::new(MemoryStore::new(), "google_auth_token"));
        let notifier = Arc::new(RefreshNotifier::new());
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        notifier.subscribe(Arc::new(move |_credential: &Credential| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let renewer = Renewer::new(Arc::new(provider.clone()), Arc::clone(&store), notifier);
        renewer.install_client(
            provider
                .init_token_client("client", &Scope::default())
                .await
                .unwrap(),
        );
        Harness {
            provider,
            store,
            renewer,
            notified,
        }
    }

    fn with_remaining(secs: i64) -> Credential {
        let issued_at = Utc::now() - ChronoDuration::seconds(3600 - secs);
        Credential::new("stored", issued_at, 3600, Scope::default())
    }

    #[tokio::test]
    async fn test_check_once_skips_fresh_credential() {
        let h = harness().await;
        h.store.save(&with_remaining(1800)).unwrap();

        let outcome = check_once(&h.renewer, &h.store, &Thresholds::default()).await;
        assert_eq!(outcome, TickOutcome::Fresh);
        assert_eq!(h.provider.silent_requests(), 0);
    }

    #[tokio::test]
    async fn test_check_once_renews_inside_window() {
        let h = harness().await;
        h.store.save(&with_remaining(540)).unwrap();

        let outcome = check_once(&h.renewer, &h.store, &Thresholds::default()).await;
        match outcome {
            TickOutcome::Renewed(credential) => {
                assert_eq!(credential.access_token, "scripted-token-1");
            }
            other => panic!("expected renewal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_once_renews_when_absent() {
        let h = harness().await;
        let outcome = check_once(&h.renewer, &h.store, &Thresholds::default()).await;
        assert!(matches!(outcome, TickOutcome::Renewed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_renews_and_notifies_once() {
        let h = harness().await;
        h.store.save(&with_remaining(300)).unwrap();
        let monitor = Monitor::new();
        monitor.start(h.renewer.clone(), Arc::clone(&h.store), Thresholds::default());

        tokio::time::sleep(POLL - Duration::from_secs(1)).await;
        assert_eq!(monitor.ticks(), 0);
        assert_eq!(h.store.load().unwrap().access_token, "stored");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(monitor.ticks(), 1);
        let renewed = h.store.load().unwrap();
        assert_eq!(renewed.access_token, "scripted-token-1");
        assert_eq!(renewed.lifetime_secs, 3600);
        assert_eq!(h.notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_keeps_monitor_running() {
        let h = harness().await;
        h.store.save(&with_remaining(300)).unwrap();
        h.provider.push_silent(ScriptedOutcome::Reject("consent_required".into()));
        let monitor = Monitor::new();
        monitor.start(h.renewer.clone(), Arc::clone(&h.store), Thresholds::default());

        tokio::time::sleep(POLL + Duration::from_secs(1)).await;
        assert_eq!(monitor.ticks(), 1);
        assert_eq!(monitor.state(), MonitorState::Running);
        assert_eq!(h.store.load().unwrap().access_token, "stored");
        assert_eq!(h.notified.load(Ordering::SeqCst), 0);

        tokio::time::sleep(POLL).await;
        assert_eq!(monitor.ticks(), 2);
        assert_eq!(h.store.load().unwrap().access_token, "scripted-token-1");
        assert_eq!(h.provider.silent_requests(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_timer() {
        let h = harness().await;
        h.store.save(&with_remaining(3000)).unwrap();
        let monitor = Monitor::new();
        monitor.start(h.renewer.clone(), Arc::clone(&h.store), Thresholds::default());
        monitor.start(h.renewer.clone(), Arc::clone(&h.store), Thresholds::default());

        tokio::time::sleep(POLL * 3 + Duration::from_secs(1)).await;
        assert_eq!(monitor.ticks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_halts_ticks() {
        let h = harness().await;
        let monitor = Monitor::new();
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!(!monitor.stop());

        monitor.start(h.renewer.clone(), Arc::clone(&h.store), Thresholds::default());
        assert_eq!(monitor.state(), MonitorState::Running);
        assert!(monitor.stop());
        assert!(!monitor.stop());
        assert_eq!(monitor.state(), MonitorState::Stopped);

        tokio::time::sleep(POLL * 2).await;
        assert_eq!(monitor.ticks(), 0);
        assert_eq!(h.provider.silent_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_does_not_cancel_in_flight_renewal() {
        let provider = ScriptedProvider::new().with_latency(Duration::from_secs(30));
        let store = Arc::new(CredentialStore::new(MemoryStore::new(), "google_auth_token"));
        let renewer = Renewer::new(
            Arc::new(provider.clone()),
            Arc::clone(&store),
            Arc::new(RefreshNotifier::new()),
        );
        renewer.install_client(provider.init_token_client("c", &Scope::default()).await.unwrap());

        let monitor = Monitor::new();
        monitor.start(renewer.clone(), Arc::clone(&store), Thresholds::default());
        tokio::time::sleep(POLL + Duration::from_secs(1)).await;
        assert!(renewer.is_renewing());

        monitor.stop();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!renewer.is_renewing());
        assert_eq!(store.load().unwrap().access_token, "scripted-token-1");
    }
}
