use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::models::Credential;

/// Callback invoked with each renewed credential.
pub type RefreshCallback = Arc<dyn Fn(&Credential) + Send + Sync>;

/// Single-subscriber channel for renewal notifications.
///
/// At most one subscriber is registered at a time. Subscribing replaces the
/// previous subscriber; delivery is synchronous on the renewing task.
#[derive(Default)]
pub struct RefreshNotifier {
    subscriber: Mutex<Option<RefreshCallback>>,
}

impl RefreshNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<RefreshCallback>> {
        self.subscriber.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Unsubscribe the current subscriber, if any, and subscribe `callback`.
    /// Returns the subscriber that was replaced.
    pub fn subscribe(&self, callback: RefreshCallback) -> Option<RefreshCallback> {
        let previous = self.slot().replace(callback);
        debug!(replaced = previous.is_some(), "Refresh subscriber registered");
        previous
    }

    /// Remove the current subscriber. Returns whether one was registered.
    pub fn unsubscribe(&self) -> bool {
        self.slot().take().is_some()
    }

    pub fn has_subscriber(&self) -> bool {
        self.slot().is_some()
    }

    /// Deliver `credential` to the subscriber. Returns whether anyone received it.
    pub fn notify(&self, credential: &Credential) -> bool {
        // Cloned out so the callback may re-enter the notifier.
        let subscriber = self.slot().clone();
        match subscriber {
            Some(callback) => {
                callback(credential);
                true
            }
            None => false,
        }
    }
}
