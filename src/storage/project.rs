//! Project management
//!
//! Handles project initialization and provides access to the store.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

use super::config::{ProjectConfig, StoreConfig, CONFIG_FILE};
use super::store::ResourceStore;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a cardstore project. Run 'cardstore init' first.")]
    NotInProject,

    #[error("Project root does not exist: {0}")]
    MissingRoot(PathBuf),
}

const DEFAULT_CONFIG: &str = r#"# cardstore configuration

[directory]
# Tabular sources (<Display>.csv) and backup snapshots
csv = "csv"

# Projections (<name>.json) and the hash manifest (cache.json)
json = "json"
"#;

/// A cardstore project: a root directory and its resolved layout
pub struct Project {
    root: PathBuf,
    config: StoreConfig,
}

impl Project {
    /// Opens the project at the given path; `cardstore.toml` is optional
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ProjectError::MissingRoot(root).into());
        }

        let config = StoreConfig::load(&root)?;
        debug!(root = %root.display(), csv = %config.csv_dir().display(), "project opened");

        Ok(Self { root, config })
    }

    /// Opens an explicit root, else the enclosing project, else the per-user store
    pub fn discover(root: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = root {
            return Self::open(root);
        }
        if let Some(root) = StoreConfig::find_project_root() {
            return Self::open(root);
        }

        let root = StoreConfig::user_data_root().ok_or(ProjectError::NotInProject)?;
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create data directory: {}", root.display()))?;
        Self::open(root)
    }

    /// Initializes a project at the given path; existing files are kept
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create project root: {}", root.display()))?;

        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let config = StoreConfig::resolve(&root, &ProjectConfig::load(&root)?)?;
        for dir in [config.csv_dir(), config.json_dir()] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        Self::open(root)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the resolved layout
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns a store over this project's layout
    pub fn store(&self) -> ResourceStore {
        ResourceStore::new(self.config.clone())
    }
}
