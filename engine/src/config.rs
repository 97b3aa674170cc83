//! Configuration loading and the resolved sync policy.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use waymark_types::{AuthToken, Phata};

/// Raw TOML configuration, all sections optional.
///
/// ```toml
/// [owner]
/// phata = "mary.hubofallthings.net"
/// token = "..."
///
/// [sync]
/// trigger_threshold = 10
/// max_batch = 100
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct WaymarkConfig {
    pub owner: Option<OwnerSection>,
    pub sync: Option<SyncSection>,
    pub storage: Option<StorageSection>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("config at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

#[derive(Default, Deserialize)]
pub struct OwnerSection {
    pub phata: Option<String>,
    pub token: Option<String>,
}

// Manual Debug impl to prevent leaking tokens in logs.
impl std::fmt::Debug for OwnerSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerSection")
            .field("phata", &self.phata)
            .field(
                "token",
                &if self.token.is_some() { "[REDACTED]" } else { "None" },
            )
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncSection {
    pub trigger_threshold: Option<usize>,
    pub max_batch: Option<usize>,
    pub split_threshold: Option<usize>,
    pub lease_secs: Option<i64>,
    pub split_delay_secs: Option<u64>,
    /// Full endpoint URL override. Testing escape hatch; when unset the
    /// endpoint is derived from the owner's phata.
    pub endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageSection {
    pub data_dir: Option<PathBuf>,
}

impl WaymarkConfig {
    /// Config file location: `$WAYMARK_CONFIG` when set, otherwise
    /// `~/.waymark/waymark.toml`.
    #[must_use]
    pub fn path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("WAYMARK_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::home_dir().map(|home| home.join(".waymark").join("waymark.toml"))
    }

    /// Load and parse the config file. A missing file is an empty config.
    pub fn load() -> Result<Self, ConfigError> {
        let Some(path) = Self::path() else {
            return Ok(Self::default());
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve owner settings, with `WAYMARK_TOKEN` overriding the config
    /// file's token.
    pub fn owner_settings(&self) -> Result<OwnerSettings, ConfigError> {
        let path = Self::path().unwrap_or_default();
        let section = self.owner.as_ref();

        let phata = section
            .and_then(|o| o.phata.as_deref())
            .ok_or_else(|| ConfigError::Invalid {
                path: path.clone(),
                reason: "owner.phata is required".to_string(),
            })
            .and_then(|raw| {
                Phata::new(raw).map_err(|e| ConfigError::Invalid {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            })?;

        let token = std::env::var("WAYMARK_TOKEN")
            .ok()
            .or_else(|| section.and_then(|o| o.token.clone()))
            .and_then(|raw| AuthToken::new(raw).ok());

        Ok(OwnerSettings { phata, token })
    }

    /// Resolve the sync policy, config values over defaults.
    #[must_use]
    pub fn sync_policy(&self) -> SyncPolicy {
        let defaults = SyncPolicy::default();
        let Some(section) = &self.sync else {
            return defaults;
        };
        SyncPolicy {
            trigger_threshold: section.trigger_threshold.unwrap_or(defaults.trigger_threshold),
            max_batch: section.max_batch.unwrap_or(defaults.max_batch),
            split_threshold: section.split_threshold.unwrap_or(defaults.split_threshold),
            lease_secs: section.lease_secs.unwrap_or(defaults.lease_secs),
            split_delay: section
                .split_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.split_delay),
        }
    }

    /// Data directory for the queue database, token file, and logs.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = self.storage.as_ref().and_then(|s| s.data_dir.clone()) {
            return dir;
        }
        dirs::home_dir()
            .map(|home| home.join(".waymark"))
            .unwrap_or_else(|| PathBuf::from(".waymark"))
    }
}

/// Resolved owner identity and (optional) bootstrap token.
#[derive(Debug, Clone)]
pub struct OwnerSettings {
    pub phata: Phata,
    pub token: Option<AuthToken>,
}

/// Tunables of the sync state machine. Defaults mirror the platform
/// client's shipped behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPolicy {
    /// A sync cycle starts only once strictly more than this many records
    /// are pending.
    pub trigger_threshold: usize,
    /// Hard cap on records per upload batch.
    pub max_batch: usize,
    /// Batches at or below this size are terminal: no further halving.
    pub split_threshold: usize,
    /// How long a `syncing` claim stays valid.
    pub lease_secs: i64,
    /// Fixed delay before retrying a refused batch as halves. Deliberately
    /// not exponential.
    pub split_delay: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            trigger_threshold: 10,
            max_batch: 100,
            split_threshold: 10,
            lease_secs: 300,
            split_delay: Duration::from_secs(4),
        }
    }
}
