//! Hash manifest (`<jsonDir>/cache.json`)
//!
//! Maps lower-case resource names to the content hash of their current
//! projection. Updates are read-modify-write cycles, so the store is a single
//! writer: an in-process mutex orders writers within this process and an
//! exclusive file lock on `cache.json.lock` orders them across processes.
//! The manifest itself is replaced atomically, so unlocked readers never see
//! a partial file.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::config::StoreConfig;
use super::fsutil::{self, write_atomic};

/// Resource name -> projection hash
pub type Manifest = BTreeMap<String, String>;

/// Store for the hash manifest
pub struct ManifestStore {
    path: PathBuf,
    lock_path: PathBuf,
    writer: Mutex<()>,
}

impl ManifestStore {
    /// Creates a manifest store at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("json.lock");
        Self {
            path,
            lock_path,
            writer: Mutex::new(()),
        }
    }

    /// Creates the manifest store of a layout
    pub fn for_config(config: &StoreConfig) -> Self {
        Self::new(config.manifest_path())
    }

    /// Returns the path to the manifest file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fsutil::exists(&self.path).await
    }

    /// Reads the manifest; absent or malformed files read as empty
    pub async fn get(&self) -> io::Result<Manifest> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(decode(&self.path, &bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Manifest::new()),
            Err(e) => Err(e),
        }
    }

    /// Sets `resource -> hash` and returns the updated manifest
    pub async fn upsert(&self, resource: &str, hash: &str) -> io::Result<Manifest> {
        let resource = resource.to_string();
        let hash = hash.to_string();
        debug!(%resource, %hash, "manifest upsert");

        self.update(move |manifest| {
            manifest.insert(resource, hash);
        })
        .await
    }

    /// Replaces the whole manifest
    pub async fn replace(&self, manifest: Manifest) -> io::Result<()> {
        debug!(entries = manifest.len(), "manifest replace");

        self.update(move |current| *current = manifest).await?;
        Ok(())
    }

    /// Drops every entry whose resource fails `keep`; other entries are untouched
    pub async fn retain<K>(&self, keep: K) -> io::Result<Manifest>
    where
        K: Fn(&str) -> bool + Send + 'static,
    {
        self.update(move |manifest| {
            manifest.retain(|resource, _| {
                let kept = keep(resource);
                if !kept {
                    debug!(%resource, "manifest entry dropped");
                }
                kept
            });
        })
        .await
    }

    async fn update<F>(&self, apply: F) -> io::Result<Manifest>
    where
        F: FnOnce(&mut Manifest) + Send + 'static,
    {
        let _guard = self.writer.lock().await;

        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || update_locked(&path, &lock_path, apply))
            .await
            .map_err(io::Error::other)?
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Manifest {
    serde_json::from_slice(bytes).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "malformed manifest, starting from empty");
        Manifest::new()
    })
}

fn encode(manifest: &Manifest) -> io::Result<Vec<u8>> {
    serde_json::to_vec_pretty(manifest).map_err(io::Error::other)
}

/// Read-modify-write under an exclusive file lock
fn update_locked(
    path: &Path,
    lock_path: &Path,
    apply: impl FnOnce(&mut Manifest),
) -> io::Result<Manifest> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let lock = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)?;

    // Lock is released when the file is dropped
    lock.lock_exclusive()?;

    let mut manifest = match fs::read(path) {
        Ok(bytes) => decode(path, &bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Manifest::new(),
        Err(e) => return Err(e),
    };

    apply(&mut manifest);
    write_atomic(path, &encode(&manifest)?)?;

    Ok(manifest)
}
