use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use stakevote_store::{RetryPolicy, StoreOptions};
use stakevote_types::{BasisPoints, PropertyId};
use thiserror::Error;

const DEFAULT_QUORUM_BPS: u16 = 5_000;
const DEFAULT_MIN_WINDOW_SECS: u64 = 60;
const DEFAULT_MAX_WINDOW_SECS: u64 = 90 * 24 * 60 * 60;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// Contents of `~/.stakevote/config.toml`. Every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub quorum: QuorumConfig,
    pub voting: VotingConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuorumConfig {
    /// Fraction of total eligible weight required, in basis points.
    pub default_bps: BasisPoints,
    /// Per-property overrides keyed by property id.
    pub properties: BTreeMap<String, BasisPoints>,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            default_bps: BasisPoints::new(DEFAULT_QUORUM_BPS).unwrap_or(BasisPoints::FULL),
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    pub min_window_secs: u64,
    pub max_window_secs: u64,
    /// Close voting as soon as every eligible unit of weight has voted.
    pub early_resolution: bool,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            min_window_secs: DEFAULT_MIN_WINDOW_SECS,
            max_window_secs: DEFAULT_MAX_WINDOW_SECS,
            early_resolution: false,
        }
    }
}

impl VotingConfig {
    #[must_use]
    pub fn min_window(&self) -> Duration {
        Duration::from_secs(self.min_window_secs)
    }

    #[must_use]
    pub fn max_window(&self) -> Duration {
        Duration::from_secs(self.max_window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file; `~/` is expanded. Defaults to `~/.stakevote/governance.db`.
    pub path: Option<String>,
    pub busy_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            retry: RetryPolicy::default(),
        }
    }
}

impl GovernanceConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!(path = %path.display(), %source, "Failed to read config");
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load `~/.stakevote/config.toml`, falling back to defaults when absent.
    pub fn load_default() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Basis-point ranges are enforced by [`BasisPoints`] at parse time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let voting = &self.voting;
        if voting.min_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "voting.min_window_secs must be greater than zero".to_string(),
            ));
        }
        if voting.min_window_secs > voting.max_window_secs {
            return Err(ConfigError::Invalid(format!(
                "voting.min_window_secs ({}) exceeds voting.max_window_secs ({})",
                voting.min_window_secs, voting.max_window_secs
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn quorum_bps_for(&self, property_id: &PropertyId) -> BasisPoints {
        self.quorum
            .properties
            .get(property_id.as_str())
            .copied()
            .unwrap_or(self.quorum.default_bps)
    }

    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.storage.busy_timeout_ms),
            retry: self.storage.retry.clone(),
        }
    }

    /// Resolved database path, or `None` if no home directory is known.
    #[must_use]
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.storage.path {
            Some(raw) => expand_home(raw),
            None => stakevote_dir().map(|dir| dir.join("governance.db")),
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

fn expand_home(raw: &str) -> Option<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(raw)),
    }
}

fn stakevote_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".stakevote"))
}

pub fn config_path() -> Option<PathBuf> {
    stakevote_dir().map(|dir| dir.join("config.toml"))
}
