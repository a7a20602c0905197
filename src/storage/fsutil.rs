//! Atomic whole-file writes
//!
//! Every file the store produces is written to a temp file in the target
//! directory, flushed, synced and renamed into place, so readers see either
//! the previous content or the new one, never a partial file. Write-once
//! files use the same path but refuse to replace an existing file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

fn parent_dir_or_dot(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Atomically replaces `dest` with `bytes`, creating parent directories
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Atomically creates `dest` with `bytes`; fails with `AlreadyExists` if it exists
pub fn write_new(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    tmp.persist_noclobber(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Runs [`write_new`] on the blocking pool
pub async fn write_new_async(dest: PathBuf, bytes: Vec<u8>) -> io::Result<()> {
    tokio::task::spawn_blocking(move || write_new(&dest, &bytes))
        .await
        .map_err(io::Error::other)?
}

/// Runs [`write_atomic`] on the blocking pool
///
/// The write runs to completion even if the calling future is dropped.
pub async fn write_atomic_async(dest: PathBuf, bytes: Vec<u8>) -> io::Result<()> {
    tokio::task::spawn_blocking(move || write_atomic(&dest, &bytes))
        .await
        .map_err(io::Error::other)?
}

/// Returns whether a path exists; permission errors count as absent
pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nested").join("dir").join("file.json");

        write_atomic(&dest, b"{}").unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"{}");
    }

    #[test]
    fn replaces_existing_content() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("file.csv");

        write_atomic(&dest, b"old contents that are longer").unwrap();
        write_atomic(&dest, b"new").unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn no_temp_file_left() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("file.csv");

        write_atomic(&dest, b"a,b\n").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("file.csv")]);
    }

    #[test]
    fn write_new_refuses_to_replace() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("snap").join("Kanji.csv");

        write_new(&dest, b"first").unwrap();
        let err = write_new(&dest, b"second").unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&dest).unwrap(), b"first");
        assert_eq!(fs::read_dir(dest.parent().unwrap()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn async_write_and_exists() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("file.json");

        assert!(!exists(&dest).await);
        write_atomic_async(dest.clone(), b"[]".to_vec()).await.unwrap();
        assert!(exists(&dest).await);
    }
}
