//! The object lifecycle orchestrator: loads, plans, writes, verifies, purges, rolls
//! back, exports, and imports OCFL objects over an abstract storage driver.

use std::convert::TryFrom;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use globset::GlobBuilder;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use tempfile::TempDir;

use crate::cache::{Cache, InventoryCache};
use crate::consts::{DEFAULT_CONTENT_DIR, INVENTORY_FILE, SUPPORTED_EXTENSIONS};
use crate::digest::{DigestAlgorithm, FixityReader, HexDigest};
use crate::error::{not_found, not_found_path, OcflError, Result};
use crate::inventory::Inventory;
use crate::layout::StorageLayout;
use crate::lock::LockManager;
use crate::mutable_head::rewrite_mutable_head;
use crate::store::fs::FsStorageDriver;
use crate::store::{OcflLayout, StorageDriver};
use crate::types::{
    CommitMeta, FileChange, FileChangeType, InventoryPath, LogicalPath, ObjectDetails,
    ObjectVersion, RevisionNum, VersionDetails, VersionNum, VersionRef,
};
use crate::updater::InventoryUpdater;
use crate::validate::{ObjectValidationResult, Validator};
use crate::writer::{sidecar_digest, VersionWriter};
use crate::{consts, paths, util};

static OBJECT_ID_MATCHER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""id"\s*:\s*"([^"]+)""#).unwrap());

/// What to do when an object uses an extension this implementation does not know
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UnsupportedExtensionBehavior {
    Fail,
    Warn,
}

/// Interface for interacting with an OCFL repository
pub struct OcflRepo {
    driver: Box<dyn StorageDriver>,
    layout: StorageLayout,
    locks: LockManager,
    cache: Box<dyn Cache<String, Arc<Inventory>>>,
    fixity_algorithms: Vec<DigestAlgorithm>,
    unsupported_behavior: UnsupportedExtensionBehavior,
    closed: AtomicBool,
}

impl OcflRepo {
    /// Opens an existing repository backed by the local filesystem. When `layout` is
    /// provided it must match the layout the repository was initialized with.
    pub fn fs_repo(
        storage_root: impl AsRef<Path>,
        layout: Option<StorageLayout>,
    ) -> Result<Self> {
        Self::open(Box::new(FsStorageDriver::new(storage_root)?), layout)
    }

    /// Initializes a new repository backed by the local filesystem. The storage root
    /// must be empty.
    pub fn init_fs_repo(storage_root: impl AsRef<Path>, layout: StorageLayout) -> Result<Self> {
        Self::init(Box::new(FsStorageDriver::new(storage_root)?), layout)
    }

    /// Opens an existing repository over the supplied driver
    pub fn open(driver: Box<dyn StorageDriver>, layout: Option<StorageLayout>) -> Result<Self> {
        let stored = Self::load_layout(driver.as_ref())?;

        let stored = match (stored, layout) {
            (Some(stored), Some(requested)) => {
                if stored != requested {
                    return Err(OcflError::InvalidConfiguration(format!(
                        "The repository uses the {} storage layout, which does not match \
                         the requested {} configuration",
                        stored.extension_name(),
                        requested.extension_name()
                    )));
                }
                stored
            }
            (Some(stored), None) => stored,
            (None, _) => {
                return Err(OcflError::InvalidConfiguration(
                    "The repository does not declare a storage layout".to_string(),
                ))
            }
        };

        Ok(Self::assemble(driver, stored))
    }

    /// Initializes a new repository over the supplied driver. The repository root must
    /// be empty.
    pub fn init(driver: Box<dyn StorageDriver>, layout: StorageLayout) -> Result<Self> {
        if !driver.list_directory("")?.is_empty() {
            return Err(OcflError::IllegalState(
                "Cannot initialize a repository in a non-empty root".to_string(),
            ));
        }

        info!(
            "Initializing OCFL repository with layout {}",
            layout.extension_name()
        );

        driver.upload_bytes(
            consts::REPO_NAMASTE_FILE,
            consts::REPO_NAMASTE_CONTENT.as_bytes(),
            None,
        )?;

        let ocfl_layout = OcflLayout {
            extension: layout.extension_name(),
            description: format!(
                "See specification document {}.md",
                layout.extension_name()
            ),
        };
        driver.upload_bytes(
            &paths::ocfl_layout_key(),
            &serde_json::to_vec_pretty(&ocfl_layout)?,
            None,
        )?;

        driver.upload_bytes(
            &paths::layout_config_key(layout.extension_name().as_extension_str()),
            &layout.serialize()?,
            None,
        )?;

        Ok(Self::assemble(driver, layout))
    }

    fn assemble(driver: Box<dyn StorageDriver>, layout: StorageLayout) -> Self {
        Self {
            driver,
            layout,
            locks: LockManager::default(),
            cache: Box::new(InventoryCache::default()),
            fixity_algorithms: Vec::new(),
            unsupported_behavior: UnsupportedExtensionBehavior::Fail,
            closed: AtomicBool::new(false),
        }
    }

    /// Configures additional fixity algorithms computed for every file added to an
    /// object
    pub fn with_fixity_algorithms(mut self, algorithms: Vec<DigestAlgorithm>) -> Self {
        self.fixity_algorithms = algorithms;
        self
    }

    /// Configures what happens when an object uses an unknown extension
    pub fn with_unsupported_extension_behavior(
        mut self,
        behavior: UnsupportedExtensionBehavior,
    ) -> Self {
        self.unsupported_behavior = behavior;
        self
    }

    /// Replaces the inventory cache
    pub fn with_cache(mut self, cache: Box<dyn Cache<String, Arc<Inventory>>>) -> Self {
        self.cache = cache;
        self
    }

    /// Configures how long lock acquisition waits before failing
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.locks = LockManager::new(timeout);
        self
    }

    /// Instructs the repo to stop accepting requests. All subsequent operations fail
    /// with a closed-state error.
    pub fn close(&self) {
        info!("Closing OCFL repository");
        self.closed.store(true, Ordering::Release);
        self.cache.invalidate_all();
    }

    /// Creates the object if it does not exist, or adds a new version whose state
    /// exactly mirrors the tree at `source_path`.
    pub fn put_object(
        &self,
        object_id: &str,
        source_path: &Path,
        meta: CommitMeta,
    ) -> Result<()> {
        self.put_object_with(object_id, source_path, meta, DigestAlgorithm::Sha512, 0)
    }

    /// Same as `put_object`, with control over the digest algorithm and version number
    /// padding used when the object is created
    pub fn put_object_with(
        &self,
        object_id: &str,
        source_path: &Path,
        meta: CommitMeta,
        digest_algorithm: DigestAlgorithm,
        padding_width: u32,
    ) -> Result<()> {
        self.ensure_open()?;
        let object_id = validated_id(object_id)?;

        let _lock = self.locks.acquire(object_id)?;

        let existing = self.load_inventory_opt(object_id)?;
        let is_new = existing.is_none();

        let updater = match existing {
            Some(inventory) => {
                self.ensure_no_mutable_head(&inventory)?;
                InventoryUpdater::insert_new_version(
                    (*inventory).clone(),
                    self.fixity_algorithms.clone(),
                )?
            }
            None => {
                let mut updater = InventoryUpdater::new_object(
                    object_id,
                    digest_algorithm,
                    DEFAULT_CONTENT_DIR,
                    padding_width,
                    self.fixity_algorithms.clone(),
                )?;
                self.assign_object_root(updater.inventory_mut())?;
                updater
            }
        };

        let staging = TempDir::new()?;
        let mut object_updater = ObjectUpdater::new(updater, staging.path());

        object_updater.write_dir(source_path, "/", false)?;

        let mut inventory = object_updater.finalize(meta)?;

        let writer = VersionWriter::new(self.driver.as_ref());
        if is_new {
            writer.write_new_object(&mut inventory, staging.path())?;
        } else {
            writer.write_new_version(&mut inventory, staging.path())?;
        }

        self.cache_inventory(inventory);

        Ok(())
    }

    /// Updates an object by applying the mutations the block makes through the
    /// supplied `ObjectUpdater`. The object must already exist.
    pub fn update_object<F>(&self, object_id: &str, meta: CommitMeta, block: F) -> Result<()>
    where
        F: FnOnce(&mut ObjectUpdater) -> Result<()>,
    {
        self.ensure_open()?;
        let object_id = validated_id(object_id)?;

        let _lock = self.locks.acquire(object_id)?;

        let inventory = self.load_inventory(object_id)?;
        self.ensure_no_mutable_head(&inventory)?;

        let updater = InventoryUpdater::update_new_version(
            (*inventory).clone(),
            self.fixity_algorithms.clone(),
        )?;

        let staging = TempDir::new()?;
        let mut object_updater = ObjectUpdater::new(updater, staging.path());

        block(&mut object_updater)?;

        let mut inventory = object_updater.finalize(meta)?;

        VersionWriter::new(self.driver.as_ref()).write_new_version(&mut inventory, staging.path())?;

        self.cache_inventory(inventory);

        Ok(())
    }

    /// Stages changes in the object's mutable HEAD without creating an immutable
    /// version. The object is created when it does not exist; its first version then
    /// lives entirely in the mutable HEAD until committed.
    pub fn stage_changes<F>(&self, object_id: &str, meta: CommitMeta, block: F) -> Result<()>
    where
        F: FnOnce(&mut ObjectUpdater) -> Result<()>,
    {
        self.ensure_open()?;
        let object_id = validated_id(object_id)?;

        let _lock = self.locks.acquire(object_id)?;

        let existing = self.load_inventory_opt(object_id)?;
        let object_is_new = existing.is_none();

        let updater = match existing {
            Some(inventory) => InventoryUpdater::mutate_head(
                (*inventory).clone(),
                self.fixity_algorithms.clone(),
            )?,
            None => {
                let mut updater = InventoryUpdater::stage_new_object(
                    object_id,
                    DigestAlgorithm::Sha512,
                    DEFAULT_CONTENT_DIR,
                    0,
                    self.fixity_algorithms.clone(),
                )?;
                self.assign_object_root(updater.inventory_mut())?;
                updater
            }
        };

        let staging = TempDir::new()?;
        let mut object_updater = ObjectUpdater::new(updater, staging.path());

        block(&mut object_updater)?;

        let mut inventory = object_updater.finalize(meta)?;

        VersionWriter::new(self.driver.as_ref()).write_mutable_head_revision(
            &mut inventory,
            staging.path(),
            object_is_new,
        )?;

        self.cache_inventory(inventory);

        Ok(())
    }

    /// Returns true if the object has an uncommitted mutable HEAD
    pub fn has_staged_changes(&self, object_id: &str) -> Result<bool> {
        self.ensure_open()?;
        let object_root = self.object_root(validated_id(object_id)?)?;
        self.driver
            .exists(&paths::mutable_head_inventory_key(&object_root))
    }

    /// Drops the object's mutable HEAD without committing it. Nothing happens when no
    /// changes are staged.
    pub fn purge_staged_changes(&self, object_id: &str) -> Result<()> {
        self.ensure_open()?;
        let object_id = validated_id(object_id)?;

        let _lock = self.locks.acquire(object_id)?;

        let object_root = self.object_root(object_id)?;
        info!("Purging staged changes of object {}", object_id);
        self.driver
            .delete_path(&paths::mutable_head_ext_key(&object_root))?;
        self.cache.invalidate(&object_id.to_string());

        Ok(())
    }

    /// Promotes the object's mutable HEAD into a regular, immutable version. The
    /// extension directory is removed afterwards.
    pub fn commit_staged_changes(&self, object_id: &str, meta: CommitMeta) -> Result<()> {
        self.ensure_open()?;
        let object_id = validated_id(object_id)?;

        let _lock = self.locks.acquire(object_id)?;

        let inventory = self.load_inventory(object_id)?;

        if !inventory.mutable_head {
            return Err(OcflError::IllegalState(format!(
                "No staged changes found for object {}",
                object_id
            )));
        }

        let mut rewritten = rewrite_mutable_head(&inventory, meta)?;

        VersionWriter::new(self.driver.as_ref()).commit_mutable_head(&mut rewritten)?;

        self.cache_inventory(rewritten);

        Ok(())
    }

    /// Returns high-level details about an object and all of its versions
    pub fn describe_object(&self, object_id: &str) -> Result<ObjectDetails> {
        self.ensure_open()?;
        let inventory = self.load_inventory(validated_id(object_id)?)?;
        Ok(ObjectDetails::from_inventory((*inventory).clone()))
    }

    /// Returns the full state of a version of an object. The head version is described
    /// when no version is specified.
    pub fn describe_version(
        &self,
        object_id: &str,
        version_num: Option<VersionNum>,
    ) -> Result<ObjectVersion> {
        self.ensure_open()?;
        let inventory = self.load_inventory(validated_id(object_id)?)?;
        ObjectVersion::from_inventory((*inventory).clone(), version_num.into())
    }

    /// Returns true if the repository contains the object
    pub fn contains_object(&self, object_id: &str) -> Result<bool> {
        self.ensure_open()?;
        let object_root = self.object_root(validated_id(object_id)?)?;
        self.driver
            .exists(&paths::object_namaste_key(&object_root))
    }

    /// Materializes a version of an object into the output directory, verifying the
    /// fixity of every file along the way. The directory must be empty or absent.
    pub fn get_object(
        &self,
        object_id: &str,
        version_num: Option<VersionNum>,
        output_path: &Path,
    ) -> Result<()> {
        self.ensure_open()?;
        let object_id = validated_id(object_id)?;

        util::ensure_empty_dir(output_path)?;

        let inventory = self.load_inventory(object_id)?;
        let version_num = VersionRef::from(version_num).resolve(inventory.head);
        let version = inventory.get_version(version_num)?;

        info!(
            "Reconstructing object {} version {} at {}",
            object_id,
            version_num,
            output_path.to_string_lossy()
        );

        for (logical_path, digest) in version.state_iter() {
            let content_path =
                inventory.content_path_for_digest(digest, Some(version_num), Some(logical_path))?;
            let key = inventory.storage_path(content_path);

            let target = util::key_to_path(output_path, logical_path.as_str());
            fs::create_dir_all(target.parent().unwrap())?;

            let mut reader = inventory.digest_algorithm.reader(self.driver.download(&key)?);
            io::copy(&mut reader, &mut File::create(&target)?)?;
            let actual = reader.finalize_hex();

            if actual != **digest {
                util::remove_file_if_exists(&target)?;
                return Err(OcflError::FixityCheck {
                    expected: inventory.digest_algorithm.to_string(),
                    expected_digest: digest.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Returns lazy per-file readers over a version of an object. Each stream verifies
    /// the file's digest as it is consumed.
    pub fn get_object_streams(
        &self,
        object_id: &str,
        version_num: Option<VersionNum>,
    ) -> Result<ObjectStreams> {
        self.ensure_open()?;
        let inventory = self.load_inventory(validated_id(object_id)?)?;
        let version_num = VersionRef::from(version_num).resolve(inventory.head);

        // fail early when the version does not exist
        inventory.get_version(version_num)?;

        Ok(ObjectStreams {
            repo: self,
            inventory,
            version_num,
        })
    }

    /// Walks versions emitting an event each time the file at the logical path changed:
    /// an update when the (digest, content path) pair changed, a remove when the path
    /// disappeared.
    pub fn file_change_history(
        &self,
        object_id: &str,
        logical_path: &str,
    ) -> Result<Vec<FileChange>> {
        self.ensure_open()?;
        let inventory = self.load_inventory(validated_id(object_id)?)?;
        let logical_path = LogicalPath::try_from(logical_path)?;

        let mut changes: Vec<FileChange> = Vec::new();
        let mut last: Option<(Arc<HexDigest>, String)> = None;

        for (version_num, version) in &inventory.versions {
            match version.lookup_digest(&logical_path) {
                Some(digest) => {
                    let content_path = inventory.content_path_for_digest(
                        digest,
                        Some(*version_num),
                        Some(&logical_path),
                    )?;

                    let current = (digest.clone(), content_path.as_str().to_string());
                    let changed = match &last {
                        Some(previous) => {
                            previous.0 != current.0 || previous.1 != current.1
                        }
                        None => true,
                    };

                    if changed {
                        changes.push(FileChange {
                            change_type: FileChangeType::Update,
                            path: Arc::new(logical_path.clone()),
                            content_path: Some(content_path.clone()),
                            digest: Some(digest.clone()),
                            version_details: VersionDetails::new(*version_num, version),
                        });
                        last = Some(current);
                    }
                }
                None => {
                    if last.is_some() {
                        changes.push(FileChange {
                            change_type: FileChangeType::Remove,
                            path: Arc::new(logical_path.clone()),
                            content_path: None,
                            digest: None,
                            version_details: VersionDetails::new(*version_num, version),
                        });
                        last = None;
                    }
                }
            }
        }

        if changes.is_empty() {
            return Err(not_found_path(
                &inventory.id,
                inventory.head,
                &logical_path,
            ));
        }

        Ok(changes)
    }

    /// Returns the diff of two object versions. If the left version is not specified,
    /// the diff is against the version immediately before the right version.
    pub fn diff(
        &self,
        object_id: &str,
        left_version: Option<VersionNum>,
        right_version: VersionNum,
    ) -> Result<Vec<crate::types::Diff>> {
        self.ensure_open()?;
        self.load_inventory(validated_id(object_id)?)?
            .diff_versions(left_version, right_version)
    }

    /// Streams the ids of every object in the repository. An object root is any
    /// directory containing an OCFL object NAMASTE file; `extensions` directories are
    /// never descended into. An optional glob filters the returned ids.
    pub fn list_object_ids<'a>(
        &'a self,
        filter_glob: Option<&str>,
    ) -> Result<Box<dyn Iterator<Item = Result<String>> + 'a>> {
        self.ensure_open()?;

        let matcher = match filter_glob {
            Some(glob) => Some(
                GlobBuilder::new(glob)
                    .backslash_escape(true)
                    .build()?
                    .compile_matcher(),
            ),
            None => None,
        };

        Ok(Box::new(ObjectIdIter {
            driver: self.driver.as_ref(),
            dir_stack: vec![String::new()],
            matcher,
            closed: &self.closed,
        }))
    }

    /// Completely removes the object from the repository. Nothing happens when the
    /// object does not exist.
    pub fn purge_object(&self, object_id: &str) -> Result<()> {
        self.ensure_open()?;
        let object_id = validated_id(object_id)?;

        let _lock = self.locks.acquire(object_id)?;

        let object_root = self.object_root(object_id)?;
        info!("Purging object {}", object_id);
        self.driver.delete_path(&object_root)?;
        self.cache.invalidate(&object_id.to_string());

        Ok(())
    }

    /// Rewinds the object so the specified version becomes its head: the version's
    /// inventory is restored to the object root, every later version directory is
    /// deleted, and any mutable HEAD is purged.
    pub fn rollback_to_version(&self, object_id: &str, version_num: VersionNum) -> Result<()> {
        self.ensure_open()?;
        let object_id = validated_id(object_id)?;

        let _lock = self.locks.acquire(object_id)?;

        let inventory = self.load_inventory(object_id)?;

        if !inventory.versions.contains_key(&version_num) {
            return Err(not_found(object_id, Some(version_num)));
        }

        // The head of a mutable HEAD inventory only exists in the extension area; the
        // highest persisted version is one earlier
        let persisted_head = if inventory.mutable_head {
            inventory.head.previous()?
        } else {
            inventory.head
        };

        if version_num > persisted_head {
            return Err(not_found(object_id, Some(version_num)));
        }

        info!("Rolling object {} back to {}", object_id, version_num);

        let object_root = &inventory.object_root;
        let version_key = paths::version_key(object_root, version_num);

        // Restore the root inventory from the target version directory
        let listing = self.driver.list_directory(&version_key)?;
        let sidecar_prefix = format!("{}.", paths::inventory_key(&version_key));
        let sidecar_key = listing
            .objects
            .iter()
            .find(|key| key.starts_with(&sidecar_prefix))
            .ok_or_else(|| OcflError::CorruptObject {
                object_id: object_id.to_string(),
                message: format!("Version {} has no inventory sidecar", version_num),
            })?;

        let sidecar_name = sidecar_key.rsplit('/').next().unwrap().to_string();

        // Stale root sidecars with a different algorithm must not survive
        let root_listing = self.driver.list_directory(object_root)?;
        let root_sidecar_prefix = format!("{}.", paths::inventory_key(object_root));
        let stale: Vec<String> = root_listing
            .objects
            .into_iter()
            .filter(|key| key.starts_with(&root_sidecar_prefix))
            .collect();
        self.driver.delete_objects(&stale)?;

        self.driver.copy_object(
            &paths::inventory_key(&version_key),
            &paths::inventory_key(object_root),
        )?;
        self.driver
            .copy_object(sidecar_key, &paths::join(object_root, &sidecar_name))?;

        // Remove every version after the rollback target
        let mut current = version_num;
        while current < persisted_head {
            current = current.next()?;
            self.driver
                .delete_path(&paths::version_key(object_root, current))?;
        }

        self.driver
            .delete_path(&paths::mutable_head_ext_key(object_root))?;

        self.cache.invalidate(&object_id.to_string());

        Ok(())
    }

    /// Creates a new head version whose state is identical to the specified version
    pub fn replicate_version_as_head(
        &self,
        object_id: &str,
        version_num: VersionNum,
        meta: CommitMeta,
    ) -> Result<()> {
        self.ensure_open()?;
        let object_id = validated_id(object_id)?;

        let _lock = self.locks.acquire(object_id)?;

        let inventory = self.load_inventory(object_id)?;
        self.ensure_no_mutable_head(&inventory)?;

        // fail early when the version does not exist
        inventory.get_version(version_num)?;

        let mut updater = InventoryUpdater::insert_new_version(
            (*inventory).clone(),
            self.fixity_algorithms.clone(),
        )?;

        let paths: Vec<Arc<LogicalPath>> = inventory
            .get_version(version_num)?
            .state_iter()
            .map(|(path, _)| path.clone())
            .collect();

        for path in paths {
            updater.reinstate_file(version_num, &path, (*path).clone(), false)?;
        }

        let mut new_inventory = updater.finalize_update(meta)?;

        let staging = TempDir::new()?;
        VersionWriter::new(self.driver.as_ref())
            .write_new_version(&mut new_inventory, staging.path())?;

        self.cache_inventory(new_inventory);

        Ok(())
    }

    /// Copies the object's entire storage tree, byte for byte, into the output
    /// directory
    pub fn export_object(&self, object_id: &str, output_path: &Path) -> Result<()> {
        self.ensure_open()?;
        let object_id = validated_id(object_id)?;

        util::ensure_empty_dir(output_path)?;

        let object_root = self.object_root(object_id)?;

        if !self
            .driver
            .exists(&paths::object_namaste_key(&object_root))?
        {
            return Err(not_found(object_id, None));
        }

        info!(
            "Exporting object {} to {}",
            object_id,
            output_path.to_string_lossy()
        );

        let prefix = format!("{}/", object_root);

        for key in self.driver.list(&object_root)? {
            let relative = key.strip_prefix(&prefix).unwrap_or(&key);
            let target = util::key_to_path(output_path, relative);
            self.driver.download_to_path(&key, &target)?;
        }

        Ok(())
    }

    /// Materializes a version's logical state into the output directory. Identical to
    /// `get_object` with an explicit version.
    pub fn export_version(
        &self,
        object_id: &str,
        version_num: VersionNum,
        output_path: &Path,
    ) -> Result<()> {
        self.get_object(object_id, Some(version_num), output_path)
    }

    /// Imports a complete OCFL object from a local directory. The source is deeply
    /// validated before anything is written; the object must not already exist.
    pub fn import_object(&self, source_path: &Path) -> Result<()> {
        self.ensure_open()?;

        let source_driver = FsStorageDriver::new(source_path)?;
        let validator = Validator::new(&source_driver);
        let result = validator.validate_object(None, "", true)?;

        if result.has_errors() {
            let first = result.errors.first().unwrap();
            return Err(OcflError::CorruptObject {
                object_id: result.object_id.unwrap_or_else(|| "unknown".to_string()),
                message: format!(
                    "The object cannot be imported because it is invalid: {}: {}",
                    first.code, first.text
                ),
            });
        }

        let inventory_json = fs::read_to_string(source_path.join(INVENTORY_FILE))?;
        let inventory: Inventory = serde_json::from_str(&inventory_json)?;
        let object_id = inventory.id.clone();

        let _lock = self.locks.acquire(&object_id)?;

        if self.contains_object(&object_id)? {
            return Err(OcflError::IllegalState(format!(
                "Cannot import object {} because it already exists",
                object_id
            )));
        }

        let object_root = self.object_root(&object_id)?;

        if !self.driver.list_directory(&object_root)?.is_empty() {
            return Err(OcflError::ObjectOutOfSync {
                object_id,
                message: format!("an object already exists at {}", object_root),
            });
        }

        info!("Importing object {}", object_id);

        for key in source_driver.list("")? {
            let target = paths::join(&object_root, &key);
            self.driver
                .upload(&util::key_to_path(source_path, &key), &target, None, None)?;
        }

        Ok(())
    }

    /// Imports a single version directory produced by another repository. The version
    /// must extend the object's current head by exactly one.
    pub fn import_version(&self, source_path: &Path) -> Result<()> {
        self.ensure_open()?;

        let inventory_json = fs::read_to_string(source_path.join(INVENTORY_FILE))?;
        let mut imported: Inventory = serde_json::from_str(&inventory_json)?;
        imported.validate_shallow()?;

        let object_id = imported.id.clone();

        let _lock = self.locks.acquire(&object_id)?;

        let existing = self.load_inventory(&object_id)?;
        self.ensure_no_mutable_head(&existing)?;

        if imported.head != existing.head.next()? {
            return Err(OcflError::ObjectOutOfSync {
                object_id,
                message: format!(
                    "the imported version is {} but the object's head is {}",
                    imported.head, existing.head
                ),
            });
        }

        imported.object_root = existing.object_root.clone();
        imported.previous_digest = existing.previous_digest.clone();

        info!("Importing version {} of object {}", imported.head, object_id);

        // Stage the version's content, verifying it against the imported manifest
        let staging = TempDir::new()?;
        let version_prefix = imported.head.to_string();
        let content_dir = source_path.join(imported.defaulted_content_dir());

        if content_dir.exists() {
            for entry in walkdir::WalkDir::new(&content_dir) {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }

                let relative = util::path_to_key(entry.path(), source_path);
                let content_path = crate::types::ContentPath::try_from(format!(
                    "{}/{}",
                    version_prefix, relative
                ))?;

                if !imported.contains_content_path(&content_path) {
                    return Err(OcflError::CorruptObject {
                        object_id,
                        message: format!(
                            "Content file {} is not referenced in the imported inventory",
                            content_path
                        ),
                    });
                }

                let expected = imported
                    .manifest()
                    .digest_for(&content_path)
                    .unwrap()
                    .clone();
                let actual = imported
                    .digest_algorithm
                    .hash_hex(&mut File::open(entry.path())?)?;

                if actual != *expected {
                    return Err(OcflError::FixityCheck {
                        expected: imported.digest_algorithm.to_string(),
                        expected_digest: expected.to_string(),
                        actual: actual.to_string(),
                    });
                }

                let target = util::key_to_path(staging.path(), content_path.as_str());
                fs::create_dir_all(target.parent().unwrap())?;
                fs::copy(entry.path(), &target)?;
            }
        }

        VersionWriter::new(self.driver.as_ref())
            .write_new_version(&mut imported, staging.path())?;

        self.cache_inventory(imported);

        Ok(())
    }

    /// Deeply validates a stored object, returning every error and warning found
    pub fn validate_object(
        &self,
        object_id: &str,
        fixity_check: bool,
    ) -> Result<ObjectValidationResult> {
        self.ensure_open()?;
        let object_id = validated_id(object_id)?;

        let object_root = self.object_root(object_id)?;
        Validator::new(self.driver.as_ref()).validate_object(
            Some(object_id),
            &object_root,
            fixity_check,
        )
    }

    /// Drops the object's cached inventory so the next read hits storage
    pub fn invalidate_cache(&self, object_id: &str) -> Result<()> {
        self.ensure_open()?;
        self.cache.invalidate(&object_id.to_string());
        Ok(())
    }

    /// Drops every cached inventory
    pub fn invalidate_cache_all(&self) -> Result<()> {
        self.ensure_open()?;
        self.cache.invalidate_all();
        Ok(())
    }

    // ------------------------------------------------------------------------------

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(OcflError::Closed)
        } else {
            Ok(())
        }
    }

    fn ensure_no_mutable_head(&self, inventory: &Inventory) -> Result<()> {
        if inventory.mutable_head {
            return Err(OcflError::IllegalState(format!(
                "Object {} cannot be updated because it has an active mutable HEAD. \
                 Commit or purge the staged changes first.",
                inventory.id
            )));
        }
        Ok(())
    }

    fn object_root(&self, object_id: &str) -> Result<String> {
        self.layout.map_object_id(object_id)
    }

    fn assign_object_root(&self, inventory: &mut Inventory) -> Result<()> {
        inventory.object_root = self.object_root(&inventory.id)?;
        Ok(())
    }

    fn cache_inventory(&self, inventory: Inventory) {
        self.cache
            .put(inventory.id.clone(), Arc::new(inventory));
    }

    fn load_inventory_opt(&self, object_id: &str) -> Result<Option<Arc<Inventory>>> {
        match self.load_inventory(object_id) {
            Ok(inventory) => Ok(Some(inventory)),
            Err(OcflError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Loads an object's inventory: existence is checked through the NAMASTE file, a
    /// mutable HEAD takes precedence over the root inventory, the inventory is
    /// fixity-verified against its sidecar, and the digest of the persisted root
    /// inventory is captured for optimistic concurrency.
    fn load_inventory(&self, object_id: &str) -> Result<Arc<Inventory>> {
        if let Some(inventory) = self.cache.get(&object_id.to_string()) {
            return Ok(inventory);
        }

        let object_root = self.object_root(object_id)?;

        if !self
            .driver
            .exists(&paths::object_namaste_key(&object_root))?
        {
            return Err(not_found(object_id, None));
        }

        self.check_object_extensions(object_id, &object_root)?;

        let mutable_head = self
            .driver
            .exists(&paths::mutable_head_inventory_key(&object_root))?;

        let inventory_dir = if mutable_head {
            paths::mutable_head_key(&object_root)
        } else {
            object_root.clone()
        };

        let mut inventory = self.parse_verified_inventory(object_id, &inventory_dir)?;

        if inventory.id != object_id {
            return Err(OcflError::CorruptObject {
                object_id: object_id.to_string(),
                message: format!(
                    "Expected the object at {} to have id {} but found {}",
                    object_root, object_id, inventory.id
                ),
            });
        }

        inventory.object_root = object_root.clone();
        inventory.mutable_head = mutable_head;

        if mutable_head {
            inventory.revision_num = Some(self.latest_revision(&object_root)?);
            inventory.previous_digest = self.root_inventory_digest(&object_root, &inventory)?;
        }

        inventory.validate_shallow()?;

        let inventory = Arc::new(inventory);
        self.cache
            .put(object_id.to_string(), inventory.clone());

        Ok(inventory)
    }

    /// Downloads and parses the inventory in the directory, verifying its digest
    /// against the sidecar. The verified digest is stored as the inventory's
    /// `previous_digest`.
    fn parse_verified_inventory(&self, object_id: &str, dir: &str) -> Result<Inventory> {
        let inventory_key = paths::inventory_key(dir);

        let mut bytes = Vec::new();
        self.driver.download(&inventory_key)?.read_to_end(&mut bytes)?;

        let mut inventory: Inventory =
            serde_json::from_slice(&bytes).map_err(|e| OcflError::CorruptObject {
                object_id: object_id.to_string(),
                message: format!("Failed to parse inventory at {}: {}", inventory_key, e),
            })?;

        let digest = inventory
            .digest_algorithm
            .hash_hex(&mut bytes.as_slice())?;

        let sidecar_key = paths::sidecar_key(dir, inventory.digest_algorithm);
        let sidecar = match self.driver.download_string(&sidecar_key) {
            Ok(contents) => sidecar_digest(&contents)?,
            Err(OcflError::KeyNotFound(_)) => {
                return Err(OcflError::CorruptObject {
                    object_id: object_id.to_string(),
                    message: format!("Inventory sidecar {} is missing", sidecar_key),
                })
            }
            Err(e) => return Err(e),
        };

        if sidecar != digest {
            return Err(OcflError::CorruptObject {
                object_id: object_id.to_string(),
                message: format!(
                    "Inventory at {} does not match its sidecar digest. Expected: {}; \
                     Found: {}",
                    inventory_key, sidecar, digest
                ),
            });
        }

        inventory.previous_digest = Some(digest);

        Ok(inventory)
    }

    /// The digest of the persisted root inventory, when one exists. An object staged
    /// entirely in a mutable HEAD has none.
    fn root_inventory_digest(
        &self,
        object_root: &str,
        inventory: &Inventory,
    ) -> Result<Option<HexDigest>> {
        let sidecar_key = paths::sidecar_key(object_root, inventory.digest_algorithm);

        match self.driver.download_string(&sidecar_key) {
            Ok(contents) => Ok(Some(sidecar_digest(&contents)?)),
            Err(OcflError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn latest_revision(&self, object_root: &str) -> Result<RevisionNum> {
        let listing = self
            .driver
            .list_directory(&paths::mutable_head_revisions_key(object_root))?;

        let mut latest = RevisionNum::new(1);

        for key in listing.objects {
            let name = key.rsplit('/').next().unwrap_or(&key);
            if let Ok(revision) = RevisionNum::try_from(name) {
                if revision > latest {
                    latest = revision;
                }
            }
        }

        Ok(latest)
    }

    fn check_object_extensions(&self, object_id: &str, object_root: &str) -> Result<()> {
        let listing = self
            .driver
            .list_directory(&paths::extensions_key(object_root))?;

        for dir in listing.directories {
            let name = dir.rsplit('/').next().unwrap_or(&dir).to_string();
            if !SUPPORTED_EXTENSIONS.contains(&name.as_str()) {
                match self.unsupported_behavior {
                    UnsupportedExtensionBehavior::Fail => {
                        return Err(OcflError::ExtensionUnsupported(name))
                    }
                    UnsupportedExtensionBehavior::Warn => {
                        warn!(
                            "Object {} uses unsupported extension {}. Modifying this \
                             object may have unintended consequences.",
                            object_id, name
                        );
                    }
                }
            }
        }

        Ok(())
    }

    fn load_layout(driver: &dyn StorageDriver) -> Result<Option<StorageLayout>> {
        let layout_json = match driver.download_string(&paths::ocfl_layout_key()) {
            Ok(json) => json,
            Err(OcflError::KeyNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let layout: OcflLayout = serde_json::from_str(&layout_json)?;

        let config_key = paths::layout_config_key(layout.extension.as_extension_str());
        let config = match driver.download_string(&config_key) {
            Ok(config) => Some(config.into_bytes()),
            Err(OcflError::KeyNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(Some(StorageLayout::new(
            layout.extension,
            config.as_deref(),
        )?))
    }
}

/// Applies a caller's mutations to a staged version. Obtained through
/// `OcflRepo::update_object`, `put_object`, or `stage_changes`.
pub struct ObjectUpdater<'a> {
    updater: InventoryUpdater,
    staging: &'a Path,
}

impl<'a> ObjectUpdater<'a> {
    fn new(updater: InventoryUpdater, staging: &'a Path) -> Self {
        Self { updater, staging }
    }

    /// Writes the file at `source` into the object at the logical path. Returns true
    /// when the file introduced new content, false when it deduplicated against
    /// content the object already stores.
    pub fn write_file(
        &mut self,
        source: &Path,
        logical_path: &str,
        overwrite: bool,
    ) -> Result<bool> {
        let logical_path = LogicalPath::try_from(logical_path)?;

        self.updater.check_can_add(&logical_path, overwrite)?;

        let content_path = self.updater.new_content_path(&logical_path)?;
        let staged_path = self.staged_path(content_path.as_str());
        fs::create_dir_all(staged_path.parent().unwrap())?;

        let algorithm = self.updater.inventory().digest_algorithm;
        let mut reader = algorithm.reader(File::open(source)?);
        io::copy(&mut reader, &mut File::create(&staged_path)?)?;
        let digest = reader.finalize_hex();

        let result =
            self.updater
                .add_file(digest, &staged_path, logical_path, overwrite);

        match result {
            Ok(true) => {
                self.clean_orphans()?;
                Ok(true)
            }
            Ok(false) => {
                // deduplicated; the staged copy is not needed
                util::remove_file_if_exists(&staged_path)?;
                util::prune_empty_dirs_up(staged_path.parent().unwrap(), self.staging)?;
                self.clean_orphans()?;
                Ok(false)
            }
            Err(e) => {
                util::remove_file_if_exists(&staged_path)?;
                util::prune_empty_dirs_up(staged_path.parent().unwrap(), self.staging)?;
                Err(e)
            }
        }
    }

    /// Recursively writes every file under `source_dir` into the object beneath the
    /// logical destination
    pub fn write_dir(
        &mut self,
        source_dir: &Path,
        logical_dst: &str,
        overwrite: bool,
    ) -> Result<()> {
        for entry in walkdir::WalkDir::new(source_dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = util::path_to_key(entry.path(), source_dir);

            let logical = if util::trim_slashes(logical_dst).is_empty() {
                relative
            } else {
                format!("{}/{}", util::trim_slashes(logical_dst), relative)
            };

            self.write_file(entry.path(), &logical, overwrite)?;
        }

        Ok(())
    }

    /// Removes the logical path from the version being planned. Earlier versions are
    /// unchanged.
    pub fn remove_file(&mut self, logical_path: &str) -> Result<()> {
        let logical_path = LogicalPath::try_from(logical_path)?;
        self.updater.remove_file(&logical_path)?;
        self.clean_orphans()
    }

    /// Moves a logical path within the version being planned
    pub fn rename_file(&mut self, src: &str, dst: &str, overwrite: bool) -> Result<()> {
        let src = LogicalPath::try_from(src)?;
        let dst = LogicalPath::try_from(dst)?;
        self.updater.rename_file(&src, dst, overwrite)?;
        self.clean_orphans()
    }

    /// Restores the file a historical version had at `source_path` to the current
    /// version at `dst`
    pub fn reinstate_file(
        &mut self,
        source_version: VersionNum,
        source_path: &str,
        dst: &str,
        overwrite: bool,
    ) -> Result<()> {
        let source_path = LogicalPath::try_from(source_path)?;
        let dst = LogicalPath::try_from(dst)?;
        self.updater
            .reinstate_file(source_version, &source_path, dst, overwrite)?;
        self.clean_orphans()
    }

    /// Drops every file from the version being planned
    pub fn clear_version_state(&mut self) -> Result<()> {
        self.updater.clear_version_state()?;
        self.clean_orphans()
    }

    /// Records a caller-asserted fixity digest for a file written in this block
    pub fn add_file_fixity(
        &mut self,
        logical_path: &str,
        algorithm: DigestAlgorithm,
        expected_digest: &str,
    ) -> Result<()> {
        let logical_path = LogicalPath::try_from(logical_path)?;
        self.updater
            .add_file_fixity(&logical_path, algorithm, expected_digest.into())
    }

    fn finalize(mut self, meta: CommitMeta) -> Result<Inventory> {
        self.clean_orphans()?;
        self.updater.finalize_update(meta)
    }

    fn staged_path(&self, content_path: &str) -> PathBuf {
        util::key_to_path(self.staging, content_path)
    }

    /// Deletes staged files whose manifest entries were dropped. A path that was
    /// re-added after the drop, eg by an overwrite, is live again and must be kept.
    fn clean_orphans(&mut self) -> Result<()> {
        for orphan in self.updater.take_orphaned_paths() {
            if self.updater.inventory().contains_content_path(&orphan) {
                continue;
            }

            let staged = self.staged_path(orphan.as_str());
            if staged.exists() {
                util::remove_file_if_exists(&staged)?;
                util::prune_empty_dirs_up(staged.parent().unwrap(), self.staging)?;
            }
        }
        Ok(())
    }
}

/// Lazy per-file readers over a version of an object
pub struct ObjectStreams<'a> {
    repo: &'a OcflRepo,
    inventory: Arc<Inventory>,
    version_num: VersionNum,
}

impl<'a> ObjectStreams<'a> {
    /// The logical paths present in the version
    pub fn logical_paths(&self) -> Vec<Arc<LogicalPath>> {
        let mut paths: Vec<Arc<LogicalPath>> = self
            .inventory
            .get_version(self.version_num)
            .map(|version| version.state_iter().map(|(path, _)| path.clone()).collect())
            .unwrap_or_default();
        paths.sort_unstable();
        paths
    }

    /// Opens a reader over the file at the logical path. The reader verifies the
    /// file's digest as it is consumed; reaching the end of a corrupt stream fails.
    pub fn stream(&self, logical_path: &str) -> Result<FixityReader<Box<dyn Read>>> {
        let logical_path = LogicalPath::try_from(logical_path)?;
        let version = self.inventory.get_version(self.version_num)?;

        let digest = version.lookup_digest(&logical_path).ok_or_else(|| {
            not_found_path(&self.inventory.id, self.version_num, &logical_path)
        })?;

        let content_path = self.inventory.content_path_for_digest(
            digest,
            Some(self.version_num),
            Some(&logical_path),
        )?;
        let key = self.inventory.storage_path(content_path);

        Ok(FixityReader::new(
            self.inventory.digest_algorithm,
            (**digest).clone(),
            self.repo.driver.download(&key)?,
        ))
    }
}

/// Walks the repository yielding the id of every object root it finds. A directory is
/// an object root iff it contains the OCFL object NAMASTE file. `extensions`
/// directories are skipped.
struct ObjectIdIter<'a> {
    driver: &'a dyn StorageDriver,
    dir_stack: Vec<String>,
    matcher: Option<globset::GlobMatcher>,
    closed: &'a AtomicBool,
}

impl<'a> ObjectIdIter<'a> {
    fn extract_object_id(&self, object_root: &str) -> Result<String> {
        let inventory_key = paths::inventory_key(object_root);
        let json = self.driver.download_string(&inventory_key)?;

        match OBJECT_ID_MATCHER.captures(&json) {
            Some(captures) => Ok(captures.get(1).unwrap().as_str().to_string()),
            None => Err(OcflError::General(format!(
                "Failed to locate object ID in inventory at {}",
                inventory_key
            ))),
        }
    }
}

impl<'a> Iterator for ObjectIdIter<'a> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                info!("Terminating object id iteration");
                return None;
            }

            let dir = self.dir_stack.pop()?;

            let listing = match self.driver.list_directory(&dir) {
                Ok(listing) => listing,
                Err(e) => return Some(Err(e)),
            };

            let namaste_key = paths::object_namaste_key(&dir);
            let is_object_root = listing.objects.contains(&namaste_key);

            if is_object_root {
                match self.extract_object_id(&dir) {
                    Ok(id) => {
                        if self
                            .matcher
                            .as_ref()
                            .map_or(true, |matcher| matcher.is_match(&id))
                        {
                            return Some(Ok(id));
                        }
                    }
                    Err(e) => return Some(Err(e)),
                }
            } else {
                for sub_dir in listing.directories {
                    let name = sub_dir.rsplit('/').next().unwrap_or(&sub_dir);
                    if name != consts::EXTENSIONS_DIR {
                        self.dir_stack.push(sub_dir);
                    }
                }
            }
        }
    }
}

fn validated_id(object_id: &str) -> Result<&str> {
    let trimmed = object_id.trim();
    if trimmed.is_empty() {
        return Err(OcflError::InvalidValue(
            "Object IDs may not be blank".to_string(),
        ));
    }
    Ok(object_id)
}

#[cfg(test)]
mod tests {
    use super::validated_id;

    #[test]
    fn blank_ids_rejected() {
        assert!(validated_id("  ").is_err());
        assert!(validated_id("").is_err());
        assert!(validated_id("o1").is_ok());
    }
}
