//! Lays new versions and mutable HEAD revisions out on storage. Content is always
//! uploaded before the inventory that references it, the root inventory is replaced
//! last, and failures trigger best-effort rollback that never masks the original
//! error.

use std::convert::TryFrom;
use std::path::Path;

use log::{error, info, warn};
use walkdir::WalkDir;

use crate::consts::{INVENTORY_FILE, OBJECT_NAMASTE_CONTENT};
use crate::digest::HexDigest;
use crate::error::{OcflError, Result};
use crate::inventory::Inventory;
use crate::store::StorageDriver;
use crate::types::{ContentPathVersion, InventoryPath, RevisionNum};
use crate::{paths, util};

const TYPE_JSON: &str = "application/json; charset=UTF-8";
const TYPE_PLAIN: &str = "text/plain; charset=UTF-8";

/// Writes finalized inventories and their staged content to storage
pub struct VersionWriter<'a> {
    driver: &'a dyn StorageDriver,
}

impl<'a> VersionWriter<'a> {
    pub fn new(driver: &'a dyn StorageDriver) -> Self {
        Self { driver }
    }

    /// Writes a brand new object to storage. The object root must not already exist.
    /// On success the inventory's `previous_digest` is updated to the digest of the
    /// newly installed root inventory.
    pub fn write_new_object(&self, inventory: &mut Inventory, staging: &Path) -> Result<()> {
        let object_root = inventory.object_root.clone();

        if !self.driver.list_directory(&object_root)?.is_empty() {
            return Err(OcflError::ObjectOutOfSync {
                object_id: inventory.id.clone(),
                message: format!(
                    "an object already exists at {}",
                    paths::join(self.driver.prefix(), &object_root)
                ),
            });
        }

        info!("Creating new object {}", inventory.id);

        let mut written = Vec::new();

        let result = (|| -> Result<HexDigest> {
            let namaste_key = paths::object_namaste_key(&object_root);
            self.driver
                .upload_bytes(&namaste_key, OBJECT_NAMASTE_CONTENT.as_bytes(), Some(TYPE_PLAIN))?;
            written.push(namaste_key);

            self.upload_staged_content(&object_root, staging, &mut written)?;

            let version_key = paths::version_key(&object_root, inventory.head);
            self.install_inventory(inventory, &version_key, true, &mut written)
        })();

        match result {
            Ok(digest) => {
                inventory.previous_digest = Some(digest);
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to create object {}; removing partially written files",
                    inventory.id
                );
                self.driver.safe_delete_objects(&written);
                if let Err(cleanup) = self.driver.delete_path(&object_root) {
                    error!(
                        "Failed to clean up object root {}: {}",
                        object_root, cleanup
                    );
                }
                Err(e)
            }
        }
    }

    /// Writes a new version of an existing object. The version directory must not
    /// already exist and the persisted root inventory must still match the inventory's
    /// `previous_digest`.
    pub fn write_new_version(&self, inventory: &mut Inventory, staging: &Path) -> Result<()> {
        let object_root = inventory.object_root.clone();
        let version_key = paths::version_key(&object_root, inventory.head);

        if !self.driver.list_directory(&version_key)?.is_empty() {
            return Err(OcflError::ObjectOutOfSync {
                object_id: inventory.id.clone(),
                message: format!("version directory {} already exists", inventory.head),
            });
        }

        info!(
            "Writing version {} of object {}",
            inventory.head, inventory.id
        );

        let mut written = Vec::new();
        let mut root_replaced = false;

        let result = (|| -> Result<HexDigest> {
            self.upload_staged_content(&object_root, staging, &mut written)?;

            self.check_prior_inventory(inventory)?;

            let digest =
                self.install_versioned_inventory(inventory, &version_key, &mut written)?;
            root_replaced = true;
            self.copy_inventory_to_root(inventory, &version_key)?;
            Ok(digest)
        })();

        match result {
            Ok(digest) => {
                inventory.previous_digest = Some(digest);
                Ok(())
            }
            Err(e) => {
                self.rollback_version(inventory, &written, root_replaced);
                Err(e)
            }
        }
    }

    /// Writes a mutable HEAD revision. The revision is claimed through a marker file;
    /// a marker at or beyond the target revision means another writer got there first.
    /// The root inventory is never touched; on the first revision the root sidecar is
    /// snapshot so later writes can detect out-of-band changes to the object.
    pub fn write_mutable_head_revision(
        &self,
        inventory: &mut Inventory,
        staging: &Path,
        object_is_new: bool,
    ) -> Result<()> {
        let object_root = inventory.object_root.clone();
        let revision = match inventory.revision_num {
            Some(revision) => revision,
            None => {
                return Err(OcflError::IllegalState(format!(
                    "Object {} does not have an active revision",
                    inventory.id
                )))
            }
        };

        let latest_marker = self.latest_revision_marker(&object_root)?;
        let expected = match revision.number {
            1 => None,
            n => Some(RevisionNum::new(n - 1)),
        };

        if latest_marker != expected {
            return Err(OcflError::ObjectOutOfSync {
                object_id: inventory.id.clone(),
                message: format!(
                    "mutable HEAD revision {} cannot be created because the latest \
                     persisted revision is {}",
                    revision,
                    latest_marker
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "absent".to_string())
                ),
            });
        }

        info!(
            "Writing mutable HEAD revision {} of object {}",
            revision, inventory.id
        );

        let mut written = Vec::new();

        let result = (|| -> Result<()> {
            let marker_key = paths::revision_marker_key(&object_root, revision);
            self.driver
                .upload_bytes(&marker_key, b"\n", Some(TYPE_PLAIN))?;
            written.push(marker_key);

            if revision.number == 1 {
                if object_is_new {
                    let namaste_key = paths::object_namaste_key(&object_root);
                    self.driver.upload_bytes(
                        &namaste_key,
                        OBJECT_NAMASTE_CONTENT.as_bytes(),
                        Some(TYPE_PLAIN),
                    )?;
                    written.push(namaste_key);
                } else {
                    self.check_prior_inventory(inventory)?;
                    self.snapshot_root_sidecar(inventory, &mut written)?;
                }
            } else {
                self.check_root_sidecar_snapshot(inventory)?;
            }

            self.upload_staged_content(&object_root, staging, &mut written)?;

            let head_key = paths::mutable_head_key(&object_root);
            self.install_inventory(inventory, &head_key, false, &mut written)?;

            Ok(())
        })();

        if let Err(e) = result {
            error!(
                "Failed to write mutable HEAD revision {} of object {}; removing \
                 partially written files",
                revision, inventory.id
            );
            self.driver.safe_delete_objects(&written);
            return Err(e);
        }

        Ok(())
    }

    /// Promotes a committed mutable HEAD into a regular version. `inventory` must be
    /// the rewritten inventory whose manifest no longer references the mutable HEAD
    /// area.
    pub fn commit_mutable_head(&self, inventory: &mut Inventory) -> Result<()> {
        let object_root = inventory.object_root.clone();

        self.check_root_sidecar_snapshot(inventory)?;

        let version_key = paths::version_key(&object_root, inventory.head);
        if !self.driver.list_directory(&version_key)?.is_empty() {
            return Err(OcflError::ObjectOutOfSync {
                object_id: inventory.id.clone(),
                message: format!(
                    "version directory {} already exists; the mutable HEAD is stale",
                    inventory.head
                ),
            });
        }

        info!(
            "Committing mutable HEAD of object {} as version {}",
            inventory.id, inventory.head
        );

        let mut written = Vec::new();
        let mut root_replaced = false;

        let result = (|| -> Result<HexDigest> {
            self.promote_mutable_head_content(inventory, &mut written)?;

            let digest =
                self.install_versioned_inventory(inventory, &version_key, &mut written)?;
            root_replaced = true;
            self.copy_inventory_to_root(inventory, &version_key)?;
            Ok(digest)
        })();

        match result {
            Ok(digest) => {
                inventory.previous_digest = Some(digest);

                if let Err(e) = self
                    .driver
                    .delete_path(&paths::mutable_head_ext_key(&object_root))
                {
                    warn!(
                        "Failed to purge the mutable HEAD extension of object {}: {}",
                        inventory.id, e
                    );
                }

                Ok(())
            }
            Err(e) => {
                self.rollback_version(inventory, &written, root_replaced);
                Err(e)
            }
        }
    }

    /// Copies every staged file under the staging directory to its key beneath the
    /// object root. The staging directory mirrors the content-path layout.
    fn upload_staged_content(
        &self,
        object_root: &str,
        staging: &Path,
        written: &mut Vec<String>,
    ) -> Result<()> {
        for entry in WalkDir::new(staging) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let content_path = util::path_to_key(entry.path(), staging);
            let key = paths::join(object_root, &content_path);

            self.driver.upload(entry.path(), &key, None, None)?;
            written.push(key);
        }

        Ok(())
    }

    /// Verifies the persisted root inventory still matches the digest the caller
    /// observed when the inventory was loaded. Skipped for first versions, which have
    /// no prior inventory.
    fn check_prior_inventory(&self, inventory: &Inventory) -> Result<()> {
        let previous = match &inventory.previous_digest {
            Some(previous) => previous,
            None => return Ok(()),
        };

        let sidecar_key =
            paths::sidecar_key(&inventory.object_root, inventory.digest_algorithm);

        let current = match self.driver.download_string(&sidecar_key) {
            Ok(contents) => sidecar_digest(&contents)?,
            Err(OcflError::KeyNotFound(_)) => {
                return Err(OcflError::ObjectOutOfSync {
                    object_id: inventory.id.clone(),
                    message: "the root inventory sidecar no longer exists".to_string(),
                })
            }
            Err(e) => return Err(e),
        };

        if current != *previous {
            return Err(OcflError::ObjectOutOfSync {
                object_id: inventory.id.clone(),
                message: format!(
                    "the root inventory digest has changed. Expected: {}; Found: {}",
                    previous, current
                ),
            });
        }

        Ok(())
    }

    /// Copies the current root sidecar into the mutable HEAD extension
    fn snapshot_root_sidecar(
        &self,
        inventory: &Inventory,
        written: &mut Vec<String>,
    ) -> Result<()> {
        let sidecar_key =
            paths::sidecar_key(&inventory.object_root, inventory.digest_algorithm);
        let snapshot_key =
            paths::root_sidecar_snapshot_key(&inventory.object_root, inventory.digest_algorithm);

        self.driver.copy_object(&sidecar_key, &snapshot_key)?;
        written.push(snapshot_key);
        Ok(())
    }

    /// Verifies the root sidecar still matches the snapshot taken when the mutable
    /// HEAD was created. Detects regular version commits that happened while the
    /// mutable HEAD was active.
    fn check_root_sidecar_snapshot(&self, inventory: &Inventory) -> Result<()> {
        let sidecar_key =
            paths::sidecar_key(&inventory.object_root, inventory.digest_algorithm);
        let snapshot_key =
            paths::root_sidecar_snapshot_key(&inventory.object_root, inventory.digest_algorithm);

        let snapshot = match self.driver.download_string(&snapshot_key) {
            Ok(contents) => Some(sidecar_digest(&contents)?),
            Err(OcflError::KeyNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let current = match self.driver.download_string(&sidecar_key) {
            Ok(contents) => Some(sidecar_digest(&contents)?),
            Err(OcflError::KeyNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let matches = match (&snapshot, &current) {
            (Some(snapshot), Some(current)) => snapshot == current,
            // A brand new object staged through the mutable HEAD has neither
            (None, None) => true,
            _ => false,
        };

        if !matches {
            return Err(OcflError::ObjectOutOfSync {
                object_id: inventory.id.clone(),
                message: "the object was modified while its mutable HEAD was active"
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Server-side copies every manifest entry that was staged in the mutable HEAD
    /// area to its final key under the version directory
    fn promote_mutable_head_content(
        &self,
        inventory: &Inventory,
        written: &mut Vec<String>,
    ) -> Result<()> {
        let version_prefix = format!("{}/", inventory.head);

        for (path, _) in inventory.manifest().paths() {
            if let ContentPathVersion::VersionNum(num) = path.version {
                if num != inventory.head {
                    continue;
                }
            } else {
                continue;
            }

            let remainder = &path.as_str()[version_prefix.len() - 1..];
            let src = format!("{}{}", crate::consts::MUTABLE_HEAD_DIR, remainder);

            let src_key = paths::join(&inventory.object_root, &src);
            let dst_key = paths::join(&inventory.object_root, path.as_str());

            self.driver.copy_object(&src_key, &dst_key)?;
            written.push(dst_key);
        }

        Ok(())
    }

    /// Serializes the inventory and writes `inventory.json` and its sidecar under the
    /// target prefix. When `copy_to_root` is set, both files are also copied into the
    /// object root. Returns the inventory digest.
    fn install_inventory(
        &self,
        inventory: &Inventory,
        target_prefix: &str,
        copy_to_root: bool,
        written: &mut Vec<String>,
    ) -> Result<HexDigest> {
        let digest = self.install_versioned_inventory(inventory, target_prefix, written)?;
        if copy_to_root {
            self.copy_inventory_to_root(inventory, target_prefix)?;
        }
        Ok(digest)
    }

    fn install_versioned_inventory(
        &self,
        inventory: &Inventory,
        target_prefix: &str,
        written: &mut Vec<String>,
    ) -> Result<HexDigest> {
        let (bytes, digest) = serialize_inventory(inventory)?;

        let inventory_key = paths::inventory_key(target_prefix);
        self.driver
            .upload_bytes(&inventory_key, &bytes, Some(TYPE_JSON))?;
        written.push(inventory_key);

        let sidecar_key = paths::sidecar_key(target_prefix, inventory.digest_algorithm);
        let sidecar = format!("{}  {}\n", digest, INVENTORY_FILE);
        self.driver
            .upload_bytes(&sidecar_key, sidecar.as_bytes(), Some(TYPE_PLAIN))?;
        written.push(sidecar_key);

        Ok(digest)
    }

    /// The root inventory must be byte-identical to the head version's, so it is
    /// installed through a server-side copy
    fn copy_inventory_to_root(&self, inventory: &Inventory, version_prefix: &str) -> Result<()> {
        self.driver.copy_object(
            &paths::inventory_key(version_prefix),
            &paths::inventory_key(&inventory.object_root),
        )?;
        self.driver.copy_object(
            &paths::sidecar_key(version_prefix, inventory.digest_algorithm),
            &paths::sidecar_key(&inventory.object_root, inventory.digest_algorithm),
        )?;
        Ok(())
    }

    /// Deletes everything this commit wrote and, when the root inventory was already
    /// replaced, restores it from the previous version directory. Cleanup failures are
    /// logged so they never mask the original error.
    fn rollback_version(&self, inventory: &Inventory, written: &[String], root_replaced: bool) {
        error!(
            "Failed to write version {} of object {}; rolling back",
            inventory.head, inventory.id
        );

        self.driver.safe_delete_objects(written);

        if root_replaced {
            let previous = match inventory.head.previous() {
                Ok(previous) => previous,
                Err(_) => return,
            };

            let previous_key = paths::version_key(&inventory.object_root, previous);
            if let Err(e) = self.copy_inventory_to_root(inventory, &previous_key) {
                error!(
                    "Failed to restore the root inventory of object {} from {}: {}. \
                     Manual intervention may be required.",
                    inventory.id, previous, e
                );
            }
        }
    }

    fn latest_revision_marker(&self, object_root: &str) -> Result<Option<RevisionNum>> {
        let listing = self
            .driver
            .list_directory(&paths::mutable_head_revisions_key(object_root))?;

        let mut latest: Option<RevisionNum> = None;

        for key in listing.objects {
            let name = key.rsplit('/').next().unwrap_or(&key);
            match RevisionNum::try_from(name) {
                Ok(revision) => {
                    if latest.map_or(true, |current| revision > current) {
                        latest = Some(revision);
                    }
                }
                Err(_) => warn!("Ignoring unexpected revision marker: {}", key),
            }
        }

        Ok(latest)
    }
}

/// Serializes an inventory to JSON, computing its digest along the way
pub fn serialize_inventory(inventory: &Inventory) -> Result<(Vec<u8>, HexDigest)> {
    let mut writer = inventory.digest_algorithm.writer(Vec::new());
    serde_json::to_writer(&mut writer, inventory)?;
    let bytes = writer.inner().clone();
    let digest = writer.finalize_hex();
    Ok((bytes, digest))
}

/// Extracts the digest from sidecar file content. Only the first whitespace-delimited
/// token is meaningful.
pub fn sidecar_digest(contents: &str) -> Result<HexDigest> {
    match contents.split_whitespace().next() {
        Some(token) => Ok(HexDigest::from(token)),
        None => Err(OcflError::General(
            "Inventory sidecar file is empty".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::sidecar_digest;

    #[test]
    fn sidecar_digest_reads_first_token() {
        let digest = sidecar_digest("abc123  inventory.json\n").unwrap();
        assert_eq!("abc123", digest.as_str());
    }

    #[test]
    fn sidecar_digest_rejects_empty() {
        assert!(sidecar_digest("  \n").is_err());
    }
}
