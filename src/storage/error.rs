//! Error taxonomy of the store
//!
//! Every failure is scoped to a single request:
//! - `Validation` happens before any I/O
//! - `NotFound` is terminal for the request
//! - `Conversion` is isolated to one dataset
//! - `Persistence` is propagated without retry
//! - `Inconsistent` reports a write that replaced the source but could not
//!   finish the derived files

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::csv::CsvError;
use crate::domain::{Dataset, Resource, ResourceError};

/// A derived-state problem that does not roll back an accepted write
#[derive(Debug, Error)]
pub enum ConsistencyWarning {
    #[error("Backup of {resource} failed: {source}")]
    BackupFailed {
        resource: Dataset,
        #[source]
        source: io::Error,
    },

    #[error("Source of {resource} was written but its projection failed: {source}")]
    ProjectionWriteFailed {
        resource: Dataset,
        #[source]
        source: io::Error,
    },

    #[error("Projection of {resource} was written but the manifest update failed: {source}")]
    ManifestUpdateFailed {
        resource: Dataset,
        #[source]
        source: io::Error,
    },
}

impl ConsistencyWarning {
    /// Dataset the warning concerns
    pub fn resource(&self) -> Dataset {
        match self {
            ConsistencyWarning::BackupFailed { resource, .. }
            | ConsistencyWarning::ProjectionWriteFailed { resource, .. }
            | ConsistencyWarning::ManifestUpdateFailed { resource, .. } => *resource,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("No {} for '{resource}'. {hint}", not_found_noun(.resource))]
    NotFound { resource: Resource, hint: String },

    #[error("Failed to convert {resource} source: {source}")]
    Conversion {
        resource: Dataset,
        #[source]
        source: CsvError,
    },

    #[error("I/O failure on {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Partial write: {0}")]
    Inconsistent(#[from] ConsistencyWarning),
}

fn not_found_noun(resource: &Resource) -> &'static str {
    if resource.is_cache() {
        "datasets"
    } else {
        "dataset"
    }
}

impl StoreError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Persistence {
            path: path.into(),
            source,
        }
    }

    /// True for the "nothing to serve" outcomes
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<ResourceError> for StoreError {
    fn from(err: ResourceError) -> Self {
        StoreError::Validation(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
