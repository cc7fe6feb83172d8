//! Configuration
//!
//! Read from `~/.config/smt_db/config.json` (or an explicit path). Every
//! field is optional; command line flags override whatever the file says.

use crate::smt::HasherKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default tree name when none is given
pub const DEFAULT_TREE: &str = "default";

/// Default database file name
pub const DEFAULT_DATABASE: &str = "tree.smt";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the database file
    pub database: PathBuf,
    /// Tree to operate on inside the database
    pub tree: String,
    /// Node hash function
    pub hasher: HasherKind,
    /// File store settings
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: PathBuf::from(DEFAULT_DATABASE),
            tree: DEFAULT_TREE.to_string(),
            hasher: HasherKind::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Settings for [`FileStore`](crate::store::FileStore)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// zstd level for log records; 0 stores them uncompressed
    pub compression_level: i32,
    /// fsync the log after every commit
    pub sync_on_commit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            compression_level: 3,
            sync_on_commit: true,
        }
    }
}

impl Config {
    /// The per-user config file location
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".into()))?;
        Ok(config_dir.join("smt_db").join("config.json"))
    }

    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the per-user file if it exists, else defaults
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Ok(default) if default.exists() => Self::load(default),
            _ => Ok(Self::default()),
        }
    }

    /// Save as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write {}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Reject settings no store or tree can be opened with
    pub fn validate(&self) -> Result<()> {
        if self.tree.is_empty() {
            return Err(Error::Config("tree name must not be empty".into()));
        }
        if !(0..=22).contains(&self.store.compression_level) {
            return Err(Error::Config(format!(
                "compression_level {} out of range 0..=22",
                self.store.compression_level
            )));
        }
        Ok(())
    }
}
