//! Conversions between `/`-delimited storage keys and local filesystem paths, plus
//! the directory cleanup shared by the filesystem driver and staging areas.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{OcflError, Result};

/// Resolves a `/`-delimited storage key to a path beneath `base`. Empty segments are
/// skipped, so leading and trailing slashes are tolerated.
pub fn key_to_path(base: &Path, key: &str) -> PathBuf {
    let mut path = base.to_path_buf();
    for part in key.split('/') {
        if !part.is_empty() {
            path.push(part);
        }
    }
    path
}

/// Converts a local path into a `/`-delimited storage key relative to `base`.
/// Staging directories mirror content-path layouts, so a staged file's key is exactly
/// its path under the staging root.
pub fn path_to_key(path: &Path, base: &Path) -> String {
    let relative = pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf());

    let mut key = String::new();
    for component in relative.components() {
        if !key.is_empty() {
            key.push('/');
        }
        key.push_str(&component.as_os_str().to_string_lossy());
    }
    key
}

/// Removes leading and trailing `/`s from a key
pub fn trim_slashes(key: &str) -> &str {
    key.trim_start_matches('/').trim_end_matches('/')
}

/// Errors when the directory exists and is not empty. A missing directory passes.
pub fn ensure_empty_dir(dir: &Path) -> Result<()> {
    if dir.exists() && fs::read_dir(dir)?.next().is_some() {
        return Err(OcflError::InvalidValue(format!(
            "The directory {} must be empty",
            dir.to_string_lossy()
        )));
    }
    Ok(())
}

/// Deletes a file, treating a missing file as success
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Walks up from `start_dir` deleting empty directories until a non-empty directory
/// or the `stop` boundary is reached. Object deletes leave directory husks behind on
/// both the driver and staging sides; this keeps them from accumulating.
pub fn prune_empty_dirs_up(start_dir: &Path, stop: &Path) -> Result<()> {
    let mut current = start_dir;

    while current != stop && current.exists() {
        if fs::read_dir(current)?.next().is_some() {
            break;
        }

        fs::remove_dir(current)?;

        current = match current.parent() {
            Some(parent) => parent,
            None => break,
        };
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    use super::{ensure_empty_dir, key_to_path, path_to_key, prune_empty_dirs_up};

    #[test]
    fn keys_and_paths_round_trip() {
        let base = TempDir::new().unwrap();

        let path = key_to_path(base.path(), "v1/content/a/b.txt");
        assert_eq!(base.path().join("v1/content/a/b.txt"), path);
        assert_eq!("v1/content/a/b.txt", path_to_key(&path, base.path()));
    }

    #[test]
    fn key_to_path_skips_empty_segments() {
        let base = TempDir::new().unwrap();

        assert_eq!(
            base.path().join("a/b"),
            key_to_path(base.path(), "/a//b/")
        );
    }

    #[test]
    fn prune_stops_at_boundary_and_non_empty_dirs() {
        let temp = TempDir::new().unwrap();
        temp.child("a/keep.txt").write_str("x").unwrap();
        temp.child("a/b/c/d").create_dir_all().unwrap();

        prune_empty_dirs_up(&temp.path().join("a/b/c/d"), temp.path()).unwrap();

        assert!(!temp.path().join("a/b").exists());
        assert!(temp.path().join("a/keep.txt").exists());

        prune_empty_dirs_up(temp.path(), temp.path()).unwrap();
        assert!(temp.path().exists());
    }

    #[test]
    fn ensure_empty_dir_accepts_missing_and_empty() {
        let temp = TempDir::new().unwrap();

        ensure_empty_dir(&temp.path().join("missing")).unwrap();
        ensure_empty_dir(temp.path()).unwrap();

        temp.child("file").write_str("x").unwrap();
        assert!(ensure_empty_dir(temp.path()).is_err());
    }
}
