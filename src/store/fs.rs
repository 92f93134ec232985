//! Local filesystem storage driver

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{error, info};
use walkdir::WalkDir;

use crate::error::{OcflError, Result};
use crate::store::{DirectoryListing, ObjectMeta, StorageDriver};
use crate::util;

/// `StorageDriver` over a local directory. The "bucket" is the repository root
/// directory; keys are resolved beneath it.
pub struct FsStorageDriver {
    storage_root: PathBuf,
    bucket: String,
}

impl FsStorageDriver {
    /// Creates a driver rooted at the specified directory. The directory is created if
    /// it does not exist.
    pub fn new(storage_root: impl AsRef<Path>) -> Result<Self> {
        let storage_root = storage_root.as_ref().to_path_buf();

        if !storage_root.exists() {
            fs::create_dir_all(&storage_root)?;
        } else if !storage_root.is_dir() {
            return Err(OcflError::IllegalState(format!(
                "Storage root {} is not a directory",
                storage_root.to_string_lossy()
            )));
        }

        let bucket = storage_root.to_string_lossy().to_string();

        Ok(Self {
            storage_root,
            bucket,
        })
    }

    /// Resolves a `/`-delimited key to a physical path under the storage root
    fn key_to_path(&self, key: &str) -> PathBuf {
        util::key_to_path(&self.storage_root, key)
    }

    /// Maps a physical path back to a `/`-delimited key
    fn path_to_key(&self, path: &Path) -> String {
        util::path_to_key(path, &self.storage_root)
    }

    fn not_found(key: &str) -> OcflError {
        OcflError::KeyNotFound(key.to_string())
    }
}

impl StorageDriver for FsStorageDriver {
    fn upload(
        &self,
        local_path: &Path,
        key: &str,
        _content_md5: Option<&crate::digest::HexDigest>,
        _content_type: Option<&str>,
    ) -> Result<()> {
        let target = self.key_to_path(key);
        fs::create_dir_all(target.parent().unwrap())?;
        fs::copy(local_path, &target)?;
        Ok(())
    }

    fn upload_bytes(&self, key: &str, bytes: &[u8], _content_type: Option<&str>) -> Result<()> {
        let target = self.key_to_path(key);
        fs::create_dir_all(target.parent().unwrap())?;
        fs::write(&target, bytes)?;
        Ok(())
    }

    fn download(&self, key: &str) -> Result<Box<dyn Read>> {
        match File::open(self.key_to_path(key)) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Self::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    fn download_string(&self, key: &str) -> Result<String> {
        match fs::read_to_string(self.key_to_path(key)) {
            Ok(string) => Ok(string),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Self::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    fn download_to_path(&self, key: &str, local_path: &Path) -> Result<()> {
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut reader = self.download(key)?;
        let mut writer = File::create(local_path)?;
        io::copy(&mut reader, &mut writer)?;
        Ok(())
    }

    /// A filesystem "server-side" copy is a plain copy within the root
    fn copy_object(&self, src_key: &str, dst_key: &str) -> Result<()> {
        let src = self.key_to_path(src_key);
        let dst = self.key_to_path(dst_key);

        if !src.exists() {
            return Err(Self::not_found(src_key));
        }

        fs::create_dir_all(dst.parent().unwrap())?;
        fs::copy(&src, &dst)?;
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.key_to_path(prefix);
        let mut keys = Vec::new();

        if fs::metadata(&root).is_err() {
            return Ok(keys);
        }

        for entry in WalkDir::new(&root) {
            let entry = entry?;
            if entry.file_type().is_file() {
                keys.push(self.path_to_key(entry.path()));
            }
        }

        Ok(keys)
    }

    fn list_directory(&self, path: &str) -> Result<DirectoryListing> {
        let root = self.key_to_path(path);
        let mut listing = DirectoryListing::default();

        if fs::metadata(&root).is_err() {
            return Ok(listing);
        }

        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            let key = self.path_to_key(&entry.path());
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                listing.directories.push(key);
            } else if file_type.is_file() {
                listing.objects.push(key);
            }
        }

        Ok(listing)
    }

    fn head(&self, key: &str) -> Result<ObjectMeta> {
        match fs::metadata(self.key_to_path(key)) {
            Ok(meta) if meta.is_file() => {
                let last_modified = meta
                    .modified()
                    .ok()
                    .map(|modified| DateTime::<Local>::from(modified));

                Ok(ObjectMeta {
                    content_length: meta.len(),
                    last_modified,
                    etag: None,
                })
            }
            Ok(_) => Err(Self::not_found(key)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Self::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_path(&self, prefix: &str) -> Result<()> {
        let root = self.key_to_path(prefix);

        if root.exists() {
            info!("Deleting path: {}", root.to_string_lossy());
            fs::remove_dir_all(&root)?;
        }

        if root != self.storage_root {
            if let Some(parent) = root.parent() {
                util::prune_empty_dirs_up(parent, &self.storage_root)?;
            }
        }

        Ok(())
    }

    fn delete_objects(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            let path = self.key_to_path(key);
            util::remove_file_if_exists(&path)?;
            if let Some(parent) = path.parent() {
                util::prune_empty_dirs_up(parent, &self.storage_root)?;
            }
        }
        Ok(())
    }

    fn safe_delete_objects(&self, keys: &[String]) {
        for key in keys {
            let path = self.key_to_path(key);
            if let Err(e) = util::remove_file_if_exists(&path) {
                error!("Failed to delete {}: {}", path.to_string_lossy(), e);
                continue;
            }
            if let Some(parent) = path.parent() {
                if let Err(e) = util::prune_empty_dirs_up(parent, &self.storage_root) {
                    error!(
                        "Failed to remove empty directories under {}: {}",
                        parent.to_string_lossy(),
                        e
                    );
                }
            }
        }
    }

    fn bucket_exists(&self) -> Result<bool> {
        Ok(self.storage_root.exists())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn prefix(&self) -> &str {
        ""
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    use crate::error::OcflError;
    use crate::store::fs::FsStorageDriver;
    use crate::store::StorageDriver;

    #[test]
    fn upload_download_round_trip() {
        let temp = TempDir::new().unwrap();
        let driver = FsStorageDriver::new(temp.path()).unwrap();

        driver
            .upload_bytes("a/b/c.txt", b"hello", None)
            .unwrap();

        assert_eq!("hello", driver.download_string("a/b/c.txt").unwrap());
        assert_eq!(5, driver.head("a/b/c.txt").unwrap().content_length);
    }

    #[test]
    fn head_missing_key_is_key_not_found() {
        let temp = TempDir::new().unwrap();
        let driver = FsStorageDriver::new(temp.path()).unwrap();

        match driver.head("nope") {
            Err(OcflError::KeyNotFound(_)) => (),
            other => panic!("expected KeyNotFound, got {:?}", other),
        }
    }

    #[test]
    fn list_directory_splits_dirs_and_objects() {
        let temp = TempDir::new().unwrap();
        temp.child("root/file1").write_str("1").unwrap();
        temp.child("root/sub/file2").write_str("2").unwrap();

        let driver = FsStorageDriver::new(temp.path()).unwrap();
        let listing = driver.list_directory("root").unwrap();

        assert_eq!(vec!["root/file1".to_string()], listing.objects);
        assert_eq!(vec!["root/sub".to_string()], listing.directories);
    }

    #[test]
    fn list_is_recursive_and_flat() {
        let temp = TempDir::new().unwrap();
        temp.child("root/file1").write_str("1").unwrap();
        temp.child("root/sub/file2").write_str("2").unwrap();

        let driver = FsStorageDriver::new(temp.path()).unwrap();
        let mut keys = driver.list("root").unwrap();
        keys.sort();

        assert_eq!(
            vec!["root/file1".to_string(), "root/sub/file2".to_string()],
            keys
        );
    }

    #[test]
    fn delete_path_removes_tree_and_empty_parents() {
        let temp = TempDir::new().unwrap();
        temp.child("a/b/c/file").write_str("x").unwrap();

        let driver = FsStorageDriver::new(temp.path()).unwrap();
        driver.delete_path("a/b/c").unwrap();

        assert!(!temp.child("a").path().exists());
    }

    #[test]
    fn copy_object_copies_within_root() {
        let temp = TempDir::new().unwrap();
        temp.child("src.txt").write_str("data").unwrap();

        let driver = FsStorageDriver::new(temp.path()).unwrap();
        driver.copy_object("src.txt", "deep/dst.txt").unwrap();

        assert_eq!("data", driver.download_string("deep/dst.txt").unwrap());
        assert_eq!("data", driver.download_string("src.txt").unwrap());
    }
}
