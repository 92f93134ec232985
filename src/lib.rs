//! A storage-agnostic engine for [OCFL](https://ocfl.io/) objects: create, update,
//! read, validate, export, import, roll back, and delete versioned, content-addressed
//! objects over a filesystem or object store.
//!
//! Open a repository and write an object:
//!
//! ```rust,no_run
//! use ocflkit::{CommitMeta, OcflRepo};
//!
//! # fn main() -> ocflkit::Result<()> {
//! let repo = OcflRepo::fs_repo("path/to/ocfl/storage/root", None)?;
//! repo.put_object("urn:example:o1", "path/to/source".as_ref(), CommitMeta::new())?;
//! # Ok(())
//! # }
//! ```

pub use self::cache::{Cache, InventoryCache};
pub use self::digest::{DigestAlgorithm, DigestReader, DigestWriter, FixityReader, HexDigest};
pub use self::error::{OcflError, Result};
pub use self::inventory::{Inventory, InventoryBuilder, User, Version};
pub use self::layout::{LayoutExtensionName, StorageLayout};
pub use self::lock::{LockManager, ObjectLock};
pub use self::repo::{ObjectStreams, ObjectUpdater, OcflRepo, UnsupportedExtensionBehavior};
pub use self::store::fs::FsStorageDriver;
pub use self::store::{DirectoryListing, ObjectMeta, StorageDriver};
pub use self::types::{
    CommitMeta, ContentPath, ContentPathVersion, Diff, FileChange, FileChangeType, FileDetails,
    InventoryPath, LogicalPath, ObjectDetails, ObjectVersion, RevisionNum, VersionDetails,
    VersionNum, VersionRef,
};
pub use self::updater::InventoryUpdater;
pub use self::validate::{
    ErrorCode, ObjectValidationResult, ValidationError, ValidationWarning, Validator, WarnCode,
};

mod cache;
mod consts;
mod digest;
mod error;
mod inventory;
mod layout;
mod lock;
mod mutable_head;
mod paths;
mod repo;
mod store;
mod types;
mod updater;
mod util;
mod validate;
mod writer;
