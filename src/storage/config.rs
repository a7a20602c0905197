//! Configuration handling for cardstore
//!
//! Configuration is stored in `cardstore.toml` at the project root:
//!
//! ```toml
//! [directory]
//! csv = "csv"
//! json = "json"
//! ```
//!
//! Relative directories resolve against the project root. The resolved
//! [`StoreConfig`] is built once and handed to every store component.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Dataset;

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "cardstore.toml";

const MANIFEST_FILE: &str = "cache.json";
const BACKUP_DIR: &str = "backup";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Data directories, relative to the project root unless absolute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Tabular sources and backups
    pub csv: PathBuf,

    /// Projections and the manifest
    pub json: PathBuf,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            csv: PathBuf::from("csv"),
            json: PathBuf::from("json"),
        }
    }
}

/// Contents of `cardstore.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub directory: DirectoryConfig,
}

impl ProjectConfig {
    /// Parses configuration text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Loads `cardstore.toml` from a root, falling back to defaults when absent
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        Self::parse(&content).context("Failed to parse project config")
    }
}

/// Resolved file layout of a store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    root: PathBuf,
    csv_dir: PathBuf,
    json_dir: PathBuf,
}

impl StoreConfig {
    /// Creates a layout from explicit directories
    pub fn new(root: impl Into<PathBuf>, csv_dir: impl Into<PathBuf>, json_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            csv_dir: csv_dir.into(),
            json_dir: json_dir.into(),
        }
    }

    /// Resolves a project configuration against its root
    pub fn resolve(root: &Path, config: &ProjectConfig) -> Result<Self, ConfigError> {
        let dirs = &config.directory;
        if dirs.csv.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("directory.csv must not be empty".to_string()));
        }
        if dirs.json.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("directory.json must not be empty".to_string()));
        }

        Ok(Self::new(root, root.join(&dirs.csv), root.join(&dirs.json)))
    }

    /// Loads and resolves the configuration of a project root
    pub fn load(root: &Path) -> Result<Self> {
        let config = ProjectConfig::load(root)?;
        Ok(Self::resolve(root, &config)?)
    }

    /// Finds the project root by looking for `cardstore.toml` upwards
    pub fn find_project_root() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;

        loop {
            if current.join(CONFIG_FILE).is_file() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Per-user data directory, used when no project is found
    pub fn user_data_root() -> Option<PathBuf> {
        ProjectDirs::from("dev", "cardstore", "cardstore").map(|dirs| dirs.data_dir().to_path_buf())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn csv_dir(&self) -> &Path {
        &self.csv_dir
    }

    pub fn json_dir(&self) -> &Path {
        &self.json_dir
    }

    /// Directory holding timestamped backup snapshots
    pub fn backup_dir(&self) -> PathBuf {
        self.csv_dir.join(BACKUP_DIR)
    }

    /// `<csvDir>/<Display>.csv`
    pub fn source_path(&self, dataset: Dataset) -> PathBuf {
        self.csv_dir.join(dataset.source_file_name())
    }

    /// `<jsonDir>/<name>.json`
    pub fn projection_path(&self, dataset: Dataset) -> PathBuf {
        self.json_dir.join(dataset.projection_file_name())
    }

    /// `<jsonDir>/cache.json`
    pub fn manifest_path(&self) -> PathBuf {
        self.json_dir.join(MANIFEST_FILE)
    }

    /// Path shown to operators, relative to the root when possible
    pub fn display_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(relative) => format!("./{}", relative.display()),
            Err(_) => path.display().to_string(),
        }
    }
}
