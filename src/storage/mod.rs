//! # Storage Layer
//!
//! Persistence for datasets with a derived JSON cache.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Sources | CSV with `#!` directives | `csv/<Display>.csv` |
//! | Backups | CSV snapshots | `csv/backup/CSV-<timestamp>/<Display>.csv` |
//! | Projections | Pretty JSON object | `json/<name>.json` |
//! | Manifest | Pretty JSON object | `json/cache.json` |
//! | Config | TOML | `cardstore.toml` |
//!
//! ## Concurrency Safety
//!
//! - All writes are atomic (temp file + rename)
//! - Writes to one dataset are serialized by a per-dataset lock
//! - [`ManifestStore`] serializes updates with a mutex and a file lock (`fs2`)
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for a project directory
//! - [`ResourceStore`] - Reads, writes and rebuilds datasets
//! - [`StoreConfig`] - Resolved file layout

pub mod csv;

mod backup;
mod config;
mod error;
mod fsutil;
mod manifest;
mod project;
mod state;
mod store;

pub use backup::{snapshot_timestamp, Snapshotter};
pub use config::{ConfigError, DirectoryConfig, ProjectConfig, StoreConfig, CONFIG_FILE};
pub use error::{ConsistencyWarning, StoreError, StoreResult};
pub use fsutil::write_atomic;
pub use manifest::{Manifest, ManifestStore};
pub use project::{Project, ProjectError};
pub use state::{plan, Facts, ReadState};
pub use store::{
    AggregateFailure, AggregateReport, DatasetStatus, ReadOutcome, ResourceBody, ResourceStore,
    StoreStatus, WriteReceipt,
};
