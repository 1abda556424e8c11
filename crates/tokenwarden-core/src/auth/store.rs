use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{Credential, TokenGrant};
use crate::storage::KeyValueStore;

/// Owns the persisted credential under a single storage key.
///
/// Readers always get a copy; the stored value only changes through `save`,
/// `save_grant` and `clear`. Writes are last-write-wins.
pub struct CredentialStore {
    backend: Box<dyn KeyValueStore>,
    key: String,
}

impl CredentialStore {
    pub fn new(backend: impl KeyValueStore + 'static, key: impl Into<String>) -> Self {
        Self {
            backend: Box::new(backend),
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the stored credential.
    ///
    /// A corrupted entry is deleted and reported as absent. Backend read
    /// failures are logged and also reported as absent.
    pub fn load(&self) -> Option<Credential> {
        let bytes = match self.backend.get(&self.key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read stored credential");
                return None;
            }
        };

        match serde_json::from_slice::<Credential>(&bytes) {
            Ok(credential) if credential.is_well_formed() => Some(credential),
            Ok(_) => {
                self.discard_corrupted("credential has no token or lifetime");
                None
            }
            Err(e) => {
                self.discard_corrupted(&e.to_string());
                None
            }
        }
    }

    /// Persist `credential`. An `issued_at` later than the write time is
    /// clamped to the write time.
    pub fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let now = Utc::now();
        if credential.issued_at > now {
            let mut clamped = credential.clone();
            clamped.issued_at = now.trunc_subsecs(3);
            return self.write(&clamped);
        }
        self.write(credential)
    }

    /// Stamp a provider grant with the local write time and persist it.
    ///
    /// Issuance is taken from the local clock rather than anything the
    /// provider reports, so freshness checks never drift with provider skew.
    pub fn save_grant(&self, grant: TokenGrant) -> Result<Credential, StoreError> {
        self.save_grant_at(grant, Utc::now())
    }

    fn save_grant_at(&self, grant: TokenGrant, now: DateTime<Utc>) -> Result<Credential, StoreError> {
        let credential = Credential::from_grant(grant, now);
        self.write(&credential)?;
        Ok(credential)
    }

    /// Remove the stored credential. Clearing an empty store succeeds.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove(&self.key)?;
        debug!(key = %self.key, "Cleared stored credential");
        Ok(())
    }

    fn write(&self, credential: &Credential) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(credential)?;
        self.backend.set(&self.key, &bytes)?;
        debug!(
            key = %self.key,
            lifetime_secs = credential.lifetime_secs,
            scope = %credential.scope,
            "Stored credential"
        );
        Ok(())
    }

    fn discard_corrupted(&self, reason: &str) {
        warn!(key = %self.key, reason, "Discarding corrupted stored credential");
        if let Err(e) = self.backend.remove(&self.key) {
            warn!(key = %self.key, error = %e, "Failed to remove corrupted credential");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scope;
    use crate::storage::{FileStore, MemoryStore};
    use chrono::{Duration, TimeZone};

    fn store() -> CredentialStore {
        CredentialStore::new(MemoryStore::new(), "google_auth_token")
    }

    fn sample(issued_at: DateTime<Utc>) -> Credential {
        Credential::new("ya29.sample", issued_at, 3600, Scope::parse("a b"))
    }

    #[test]
    fn test_load_returns_saved_credential() {
        let store = store();
        let issued_at = Utc.timestamp_millis_opt(1_700_000_000_500).unwrap();
        let credential = sample(issued_at);

        store.save(&credential).unwrap();
        assert_eq!(store.load(), Some(credential));
    }

    #[test]
    fn test_load_empty_store() {
        assert_eq!(store().load(), None);
    }

    #[test]
    fn test_corrupted_entry_is_deleted() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FileStore::new(tmp.path());
        backend.set("google_auth_token", b"{not json").unwrap();

        let store = CredentialStore::new(backend.clone(), "google_auth_token");
        assert_eq!(store.load(), None);
        assert_eq!(backend.get("google_auth_token").unwrap(), None);
    }

    #[test]
    fn test_zero_lifetime_entry_is_deleted() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FileStore::new(tmp.path());
        let raw = br#"{"access_token":"t","expires_in":0,"created_at":1700000000000,"scope":""}"#;
        backend.set("google_auth_token", raw).unwrap();

        let store = CredentialStore::new(backend.clone(), "google_auth_token");
        assert_eq!(store.load(), None);
        assert_eq!(backend.get("google_auth_token").unwrap(), None);
    }

    #[test]
    fn test_future_issued_at_is_clamped() {
        let store = store();
        let future = Utc::now() + Duration::hours(2);
        store.save(&sample(future)).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.issued_at <= Utc::now());
        assert_eq!(loaded.lifetime_secs, 3600);
    }

    #[test]
    fn test_save_grant_stamps_write_time() {
        let store = store();
        let now = Utc.timestamp_millis_opt(1_700_000_123_000).unwrap();
        let grant = TokenGrant {
            access_token: "fresh".into(),
            expires_in: 3599,
            scope: Scope::parse("a"),
        };

        let credential = store.save_grant_at(grant, now).unwrap();
        assert_eq!(credential.issued_at, now);
        assert_eq!(store.load(), Some(credential));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = store();
        store.save(&sample(Utc::now())).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load(), None);
    }
}
