//! The storage backend contract. Drivers present a bucket-like, `/`-delimited key
//! namespace over a filesystem or object store.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::digest::HexDigest;
use crate::error::Result;
use crate::layout::LayoutExtensionName;

pub mod fs;

/// Backend contract covering both filesystems and cloud object stores. All keys are
/// `/`-delimited and relative the repository root; an empty prefix is permitted.
/// Operations are independent; there is no implicit batching.
pub trait StorageDriver: Send + Sync {
    /// Uploads a local file to the specified key. `content_md5` is an optional
    /// precomputed digest a backend may use for end-to-end integrity.
    fn upload(
        &self,
        local_path: &Path,
        key: &str,
        content_md5: Option<&HexDigest>,
        content_type: Option<&str>,
    ) -> Result<()>;

    /// Writes the bytes to the specified key
    fn upload_bytes(&self, key: &str, bytes: &[u8], content_type: Option<&str>) -> Result<()>;

    /// Opens a read stream over the key's content. `KeyNotFound` when it does not exist.
    fn download(&self, key: &str) -> Result<Box<dyn Read>>;

    /// Downloads the key's content as a UTF-8 string
    fn download_string(&self, key: &str) -> Result<String>;

    /// Downloads the key's content to a local file, creating parent directories
    fn download_to_path(&self, key: &str, local_path: &Path) -> Result<()>;

    /// Server-side copy of one key to another
    fn copy_object(&self, src_key: &str, dst_key: &str) -> Result<()>;

    /// Returns every object under the prefix as a flat list of keys
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Returns the immediate children of the path, split into directories and objects
    fn list_directory(&self, path: &str) -> Result<DirectoryListing>;

    /// Returns metadata about the key, or `KeyNotFound` when it does not exist
    fn head(&self, key: &str) -> Result<ObjectMeta>;

    /// Returns true if the key exists
    fn exists(&self, key: &str) -> Result<bool> {
        match self.head(key) {
            Ok(_) => Ok(true),
            Err(crate::error::OcflError::KeyNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes every object under the prefix
    fn delete_path(&self, prefix: &str) -> Result<()>;

    /// Deletes the specified keys, failing fast on the first error
    fn delete_objects(&self, keys: &[String]) -> Result<()>;

    /// Deletes the specified keys, logging failures instead of surfacing them. Used for
    /// rollback cleanup where the original error must not be masked.
    fn safe_delete_objects(&self, keys: &[String]);

    /// Returns true if the backing bucket (or root directory) exists
    fn bucket_exists(&self) -> Result<bool>;

    /// The bucket, or root directory, the driver operates against
    fn bucket(&self) -> &str;

    /// The repository prefix within the bucket; may be empty
    fn prefix(&self) -> &str;
}

/// Metadata about a stored object
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub content_length: u64,
    pub last_modified: Option<DateTime<Local>>,
    pub etag: Option<String>,
}

/// The immediate children of a directory. Cloud backends synthesize directories from
/// the common-prefix delimiter.
#[derive(Debug, Default)]
pub struct DirectoryListing {
    /// Keys of the sub-directories, relative the repository root, no trailing slash
    pub directories: Vec<String>,
    /// Keys of the objects, relative the repository root
    pub objects: Vec<String>,
}

impl DirectoryListing {
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.objects.is_empty()
    }
}

/// `ocfl_layout.json` serialization object
#[derive(Deserialize, Serialize, Debug)]
pub struct OcflLayout {
    pub extension: LayoutExtensionName,
    pub description: String,
}
