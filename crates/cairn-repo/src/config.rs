use std::fs;
use std::path::{Component, Path, PathBuf};

use cairn_store::{EngineOptions, SyncPolicy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RepoError, RepoResult};

/// Current on-disk configuration format.
pub const CONFIG_VERSION: u32 = 1;

/// Datastore implementation a repository opens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Durable embedded redb engine.
    #[default]
    Redb,
    /// Non-durable in-memory map. Contents vanish on close.
    Memory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreConfig {
    pub backend: Backend,
    /// Engine directory, relative to the repository root.
    pub path: PathBuf,
    pub sync: SyncPolicy,
    /// Engine page cache in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<usize>,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Redb,
            path: PathBuf::from("datastore"),
            sync: SyncPolicy::Immediate,
            cache_size: None,
        }
    }
}

impl DatastoreConfig {
    pub(crate) fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            sync: self.sync,
            cache_size: self.cache_size,
        }
    }
}

/// Contents of the repository `config` file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub version: u32,
    pub datastore: DatastoreConfig,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            datastore: DatastoreConfig::default(),
        }
    }
}

impl RepoConfig {
    /// Configuration for a repository backed by the in-memory datastore.
    pub fn in_memory() -> Self {
        Self {
            datastore: DatastoreConfig {
                backend: Backend::Memory,
                ..DatastoreConfig::default()
            },
            ..Self::default()
        }
    }

    /// Parse a config from TOML text. `path` is only used in errors.
    pub fn from_toml(text: &str, path: &Path) -> RepoResult<Self> {
        let corrupt = |reason: String| RepoError::CorruptConfig {
            path: path.to_path_buf(),
            reason,
        };

        let config: Self = toml::from_str(text).map_err(|e| corrupt(e.to_string()))?;
        config.validate().map_err(corrupt)?;
        Ok(config)
    }

    /// Check the fields serde cannot: the format version and that the engine
    /// directory stays inside the repository root.
    pub fn validate(&self) -> Result<(), String> {
        if self.version != CONFIG_VERSION {
            return Err(format!("unsupported config version {}", self.version));
        }
        let path = &self.datastore.path;
        if path.as_os_str().is_empty() || path.is_absolute() {
            return Err(format!(
                "datastore path {} must be a non-empty relative path",
                path.display()
            ));
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(format!("datastore path {} leaves the repository", path.display()));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> RepoResult<String> {
        toml::to_string_pretty(self).map_err(|e| RepoError::ConfigSerialization(e.to_string()))
    }

    /// Read and validate the config file at `path`.
    pub fn load(path: &Path) -> RepoResult<Self> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml(&text, path)?;
        debug!(path = %path.display(), backend = ?config.datastore.backend, "loaded config");
        Ok(config)
    }

    /// Write the config file, replacing it atomically via a temporary file.
    pub fn save(&self, path: &Path) -> RepoResult<()> {
        let text = self.to_toml()?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "saved config");
        Ok(())
    }
}
