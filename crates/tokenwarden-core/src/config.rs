//! Session and application configuration.
//!
//! `SessionConfig` carries what a session needs from its host: the permission
//! scope to request, discovery documents for the provider client, the storage
//! key for the persisted credential, and the freshness thresholds.
//!
//! `Config` is the on-disk form stored at `~/.config/tokenwarden/config.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::Thresholds;
use crate::models::Scope;

/// Application name used for config/storage directory paths
const APP_NAME: &str = "tokenwarden";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Storage key of the persisted credential
pub const DEFAULT_STORAGE_KEY: &str = "google_auth_token";

/// Permissions requested by default: send mail and manage app-created files.
pub const DEFAULT_SCOPES: &str =
    "https://www.googleapis.com/auth/gmail.send https://www.googleapis.com/auth/drive.file";

/// Discovery documents loaded into the provider client by default.
pub const DEFAULT_DISCOVERY_DOCS: [&str; 2] = [
    "https://www.googleapis.com/discovery/v1/apis/gmail/v1/rest",
    "https://sheets.googleapis.com/$discovery/rest?version=v4",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub scope: Scope,
    pub discovery_docs: Vec<String>,
    pub storage_key: String,
    #[serde(flatten)]
    pub thresholds: Thresholds,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scope: Scope::parse(DEFAULT_SCOPES),
            discovery_docs: DEFAULT_DISCOVERY_DOCS.iter().map(|d| d.to_string()).collect(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            thresholds: Thresholds::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    /// Overrides the default storage directory for the file backend.
    pub storage_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding persisted credentials for the file backend.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

/// Serde helper storing a `std::time::Duration` as whole seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
