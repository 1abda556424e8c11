//! Durable key-value backends for persisted credentials.
//!
//! - `FileStore`: one JSON file per key in a directory
//! - `KeyringStore`: OS keychain via the `keyring` crate
//! - `MemoryStore`: process-local map for tests and demos

pub mod file;
pub mod keychain;

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StorageError;

pub use file::FileStore;
pub use keychain::KeyringStore;

/// Namespaced byte store.
///
/// Calls are synchronous; implementations are expected to be quick enough
/// that cancellation is never needed.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}
