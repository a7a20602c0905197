//! Backup snapshots of tabular sources
//!
//! Every accepted write copies the incoming source into
//! `<csvDir>/backup/CSV-<timestamp>/<Display>.csv`. Snapshots are write-once:
//! a second snapshot of the same dataset at the same millisecond fails with
//! `AlreadyExists` and the first is kept. The store never reads them back.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::fsutil::write_new_async;

/// Millisecond-precision UTC timestamp, e.g. `2024-05-01T09:30:00.125Z`
pub fn snapshot_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Writes backup snapshots under a backup directory
pub struct Snapshotter {
    dir: PathBuf,
}

impl Snapshotter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory of the snapshot taken at `timestamp`
    pub fn snapshot_dir(&self, timestamp: DateTime<Utc>) -> PathBuf {
        self.dir.join(format!("CSV-{}", snapshot_timestamp(timestamp)))
    }

    /// Stores `bytes` as `<Display>.csv` in the snapshot for `timestamp`
    ///
    /// Never replaces an existing snapshot file.
    pub async fn snapshot(
        &self,
        display_name: &str,
        bytes: &[u8],
        timestamp: DateTime<Utc>,
    ) -> io::Result<PathBuf> {
        let path = self
            .snapshot_dir(timestamp)
            .join(format!("{}.csv", display_name));

        write_new_async(path.clone(), bytes.to_vec()).await?;
        Ok(path)
    }
}
