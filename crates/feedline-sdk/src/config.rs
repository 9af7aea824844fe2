//! SDK configuration

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use feedline_client::{GatewayConfig, SortMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::credential::{
    CredentialStore, JsonFileStore, KeyValueStore, MemoryStore, DEFAULT_CREDENTIAL_KEY,
};

/// Credential file used when the config names none
pub const DEFAULT_CREDENTIAL_FILE: &str = "feedline-credentials.json";

pub const ENV_API_URL: &str = "FEEDLINE_API_URL";
pub const ENV_CREDENTIAL_PATH: &str = "FEEDLINE_CREDENTIAL_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SdkConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

/// Feed service connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the feed service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Where the session token is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding the credential
    #[serde(default = "default_credential_path")]
    pub credential_path: PathBuf,

    /// Key the token is stored under
    #[serde(default = "default_credential_key")]
    pub credential_key: String,

    /// Keep the credential in memory only; nothing survives a restart
    #[serde(default)]
    pub ephemeral: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credential_path: default_credential_path(),
            credential_key: default_credential_key(),
            ephemeral: false,
        }
    }
}

impl StorageConfig {
    /// Open the configured credential store.
    pub fn credential_store(&self) -> CredentialStore {
        let store: Arc<dyn KeyValueStore> = if self.ephemeral {
            Arc::new(MemoryStore::new())
        } else {
            debug!(path = %self.credential_path.display(), "Using file credential store");
            Arc::new(JsonFileStore::new(&self.credential_path))
        };
        CredentialStore::with_key(store, self.credential_key.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Sort mode new feed views start with
    #[serde(default)]
    pub default_sort: SortMode,
}

fn default_base_url() -> String {
    GatewayConfig::default().base_url
}

fn default_timeout() -> u64 {
    GatewayConfig::default().timeout_secs
}

fn default_user_agent() -> String {
    GatewayConfig::default().user_agent
}

fn default_credential_path() -> PathBuf {
    PathBuf::from(DEFAULT_CREDENTIAL_FILE)
}

fn default_credential_key() -> String {
    DEFAULT_CREDENTIAL_KEY.to_string()
}

impl SdkConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `FEEDLINE_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api.base_url = url;
        }
        if let Some(path) = lookup(ENV_CREDENTIAL_PATH).filter(|v| !v.is_empty()) {
            self.storage.credential_path = PathBuf::from(path);
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.api.base_url.clone(),
            timeout_secs: self.api.timeout_secs,
            user_agent: self.api.user_agent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedline_client::AccessToken;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_equals_default() {
        let config = SdkConfig::from_toml_str("").unwrap();
        assert_eq!(config, SdkConfig::default());
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.storage.credential_key, "token");
        assert_eq!(config.feed.default_sort, SortMode::Newest);
        assert_eq!(
            config.storage.credential_path,
            PathBuf::from("feedline-credentials.json")
        );
        assert!(!config.storage.ephemeral);
    }

    #[test]
    fn test_default_storage_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let storage = StorageConfig {
            credential_path: dir.path().join(DEFAULT_CREDENTIAL_FILE),
            ..Default::default()
        };

        storage
            .credential_store()
            .save(&AccessToken::new("durable"))
            .unwrap();
        let reopened = storage.credential_store().load().unwrap();
        assert_eq!(reopened.unwrap().secret(), "durable");
    }

    #[test]
    fn test_ephemeral_storage_is_not_shared() {
        let dir = TempDir::new().unwrap();
        let storage = StorageConfig {
            credential_path: dir.path().join(DEFAULT_CREDENTIAL_FILE),
            ephemeral: true,
            ..Default::default()
        };

        storage
            .credential_store()
            .save(&AccessToken::new("fleeting"))
            .unwrap();
        assert!(storage.credential_store().load().unwrap().is_none());
        assert!(!storage.credential_path.exists());
    }

    #[test]
    fn test_partial_file() {
        let config = SdkConfig::from_toml_str(
            r#"
            [api]
            base_url = "https://feed.example.org"

            [storage]
            credential_path = "/tmp/feedline/credentials.json"

            [feed]
            default_sort = "most_likes"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://feed.example.org");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(
            config.storage.credential_path,
            PathBuf::from("/tmp/feedline/credentials.json")
        );
        assert_eq!(config.feed.default_sort, SortMode::MostLiked);
    }

    #[test]
    fn test_invalid_sort_is_rejected() {
        let err = SdkConfig::from_toml_str("[feed]\ndefault_sort = \"sideways\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = SdkConfig::load(dir.path().join("feedline.toml")).unwrap();
        assert_eq!(config, SdkConfig::default());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedline.toml");
        std::fs::write(&path, "[api]\ntimeout_secs = 5\n").unwrap();

        let config = SdkConfig::load(&path).unwrap();
        assert_eq!(config.api.timeout_secs, 5);
        assert_eq!(config.gateway_config().timeout_secs, 5);
    }

    #[test]
    fn test_overrides() {
        let mut config = SdkConfig::default();
        config.apply_overrides(|key| match key {
            ENV_API_URL => Some("http://api.test:9000".to_string()),
            ENV_CREDENTIAL_PATH => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.api.base_url, "http://api.test:9000");
        assert_eq!(
            config.storage.credential_path,
            PathBuf::from(DEFAULT_CREDENTIAL_FILE)
        );
    }
}
