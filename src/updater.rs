//! Plans the content and state changes that make up a new object version or mutable
//! HEAD revision.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use crate::digest::{DigestAlgorithm, HexDigest, MultiDigestWriter};
use crate::error::{not_found_path, OcflError, Result};
use crate::inventory::Inventory;
use crate::types::{
    CommitMeta, ContentPath, ContentPathVersion, LogicalPath, RevisionNum, VersionNum,
};

/// A file that was added by the updater in the current block
struct StagedFile {
    /// The content path the file's bytes live at; an existing path when the digest
    /// deduplicated against the manifest
    content_path: Arc<ContentPath>,
    /// Local path holding the file's bytes, used for fixity assertions
    source: PathBuf,
}

/// Single-use builder that produces the inventory of a new version. The updater owns a
/// deep copy of the prior inventory; the original remains untouched until the new
/// version is committed. `finalize_update` consumes the updater, so a finalized updater
/// cannot be mutated further.
pub struct InventoryUpdater {
    inventory: Inventory,
    fixity_algorithms: Vec<DigestAlgorithm>,
    staged_files: HashMap<LogicalPath, StagedFile>,
    orphaned: Vec<Arc<ContentPath>>,
}

impl InventoryUpdater {
    /// Creates an updater for a brand new object at version 1
    pub fn new_object(
        object_id: &str,
        digest_algorithm: DigestAlgorithm,
        content_dir: &str,
        padding_width: u32,
        fixity_algorithms: Vec<DigestAlgorithm>,
    ) -> Result<Self> {
        let inventory = Inventory::builder(object_id)
            .with_digest_algorithm(digest_algorithm)
            .with_content_directory(content_dir)
            .with_head(VersionNum::with_width(1, padding_width))
            .build()?;

        Ok(Self::wrap(inventory, fixity_algorithms))
    }

    /// Creates an updater whose new version starts with an empty state
    pub fn insert_new_version(
        mut inventory: Inventory,
        fixity_algorithms: Vec<DigestAlgorithm>,
    ) -> Result<Self> {
        let next = inventory.head.next()?;
        inventory
            .versions
            .insert(next, crate::inventory::Version::new_staged());
        inventory.head = next;

        Ok(Self::wrap(inventory, fixity_algorithms))
    }

    /// Creates an updater whose new version starts with the head version's state copied
    /// forward
    pub fn update_new_version(
        mut inventory: Inventory,
        fixity_algorithms: Vec<DigestAlgorithm>,
    ) -> Result<Self> {
        let next = inventory.head.next()?;
        let version = inventory.head_version().clone_staged();
        inventory.versions.insert(next, version);
        inventory.head = next;

        Ok(Self::wrap(inventory, fixity_algorithms))
    }

    /// Creates an updater that stages a brand new object's first version as a mutable
    /// HEAD. The object gains no root inventory until the staged changes are committed.
    pub fn stage_new_object(
        object_id: &str,
        digest_algorithm: DigestAlgorithm,
        content_dir: &str,
        padding_width: u32,
        fixity_algorithms: Vec<DigestAlgorithm>,
    ) -> Result<Self> {
        let mut inventory = Inventory::builder(object_id)
            .with_digest_algorithm(digest_algorithm)
            .with_content_directory(content_dir)
            .with_head(VersionNum::with_width(1, padding_width))
            .build()?;

        inventory.mutable_head = true;
        inventory.revision_num = Some(RevisionNum::new(1));

        Ok(Self::wrap(inventory, fixity_algorithms))
    }

    /// Creates an updater that targets the mutable HEAD. When no mutable HEAD exists,
    /// a new head version is created and the first revision is `r1`; otherwise the
    /// existing mutable HEAD version is reused and the next revision is allocated.
    pub fn mutate_head(
        mut inventory: Inventory,
        fixity_algorithms: Vec<DigestAlgorithm>,
    ) -> Result<Self> {
        if inventory.mutable_head {
            let revision = match inventory.revision_num {
                Some(revision) => revision.next(),
                None => {
                    return Err(OcflError::IllegalState(format!(
                        "Object {} has a mutable HEAD but its revision is unknown",
                        inventory.id
                    )))
                }
            };
            inventory.revision_num = Some(revision);
        } else {
            let next = inventory.head.next()?;
            let version = inventory.head_version().clone_staged();
            inventory.versions.insert(next, version);
            inventory.head = next;
            inventory.mutable_head = true;
            inventory.revision_num = Some(RevisionNum::new(1));
        }

        Ok(Self::wrap(inventory, fixity_algorithms))
    }

    fn wrap(inventory: Inventory, fixity_algorithms: Vec<DigestAlgorithm>) -> Self {
        Self {
            inventory,
            fixity_algorithms,
            staged_files: HashMap::new(),
            orphaned: Vec::new(),
        }
    }

    /// Read access to the draft inventory
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub(crate) fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }

    /// The revision content is staged under, when targeting the mutable HEAD
    pub fn revision_num(&self) -> Option<RevisionNum> {
        self.inventory.revision_num
    }

    /// Returns the content path a new file at the logical path would be stored at
    pub fn new_content_path(&self, logical_path: &LogicalPath) -> Result<ContentPath> {
        match self.inventory.revision_num {
            Some(revision) => self
                .inventory
                .new_revision_content_path(revision, logical_path),
            None => self
                .inventory
                .new_content_path(self.inventory.head, logical_path),
        }
    }

    /// Fails fast when a logical path cannot be written without the overwrite flag or
    /// conflicts with the existing state
    pub fn check_can_add(&self, logical_path: &LogicalPath, overwrite: bool) -> Result<()> {
        let head = self.inventory.head_version();

        if head.is_file(logical_path) {
            if !overwrite {
                return Err(OcflError::Overwrite(logical_path.clone()));
            }
        } else {
            head.validate_non_conflicting(logical_path)?;
        }

        Ok(())
    }

    /// Adds a file to the new version's state. `source_path` must hold the file's bytes
    /// at a stable location; it is read to compute any configured additional fixity
    /// digests and is retained for later fixity assertions.
    ///
    /// If the digest is not already present in the manifest, a new content path is
    /// created for it. A digest that is already known is stored once; no new content
    /// path is added. Returns true when the digest was new.
    pub fn add_file(
        &mut self,
        digest: HexDigest,
        source_path: &Path,
        logical_path: LogicalPath,
        overwrite: bool,
    ) -> Result<bool> {
        self.check_can_add(&logical_path, overwrite)?;

        if self.inventory.head_version().is_file(&logical_path) {
            // Replacing a file is a remove followed by an add so that manifest entries
            // staged in this block do not leak
            self.remove_file(&logical_path)?;
        }

        let digest_is_new = !self.inventory.contains_digest(&digest);

        let digest_arc = match self.inventory.manifest().shared_digest(&digest) {
            Some(existing) => existing,
            None => Arc::new(digest),
        };

        let content_path = if digest_is_new {
            let content_path = Arc::new(self.new_content_path(&logical_path)?);
            self.inventory
                .manifest_mut()
                .bind(digest_arc.clone(), content_path.clone());

            self.record_fixity_digests(source_path, &content_path)?;

            content_path
        } else {
            self.inventory
                .content_path_for_digest(&digest_arc, None, Some(&logical_path))?
                .clone()
        };

        let logical_arc = Arc::new(logical_path.clone());
        self.inventory
            .head_version_mut()
            .add_file(digest_arc.clone(), logical_arc)?;

        self.staged_files.insert(
            logical_path,
            StagedFile {
                content_path,
                source: source_path.to_path_buf(),
            },
        );

        Ok(digest_is_new)
    }

    /// Removes a logical path from the new version's state. Nothing happens when the
    /// path does not exist. When the path's content was staged by this version, or lies
    /// in the mutable HEAD staging area, and no other logical path still references the
    /// digest, the content entry is dropped from the manifest.
    pub fn remove_file(&mut self, logical_path: &LogicalPath) -> Result<()> {
        let removed = self.inventory.head_version_mut().remove_file(logical_path);

        if let Some((_, digest)) = removed {
            self.staged_files.remove(logical_path);
            self.drop_unreferenced_staged_content(&digest);
        }

        Ok(())
    }

    /// Moves a logical path within the new version's state. The content path is
    /// unchanged; only the state mapping moves.
    pub fn rename_file(
        &mut self,
        src_path: &LogicalPath,
        dst_path: LogicalPath,
        overwrite: bool,
    ) -> Result<()> {
        if *src_path == dst_path {
            return Ok(());
        }

        let digest = match self.inventory.head_version().lookup_digest(src_path) {
            Some(digest) => digest.clone(),
            None => {
                return Err(not_found_path(
                    &self.inventory.id,
                    self.inventory.head,
                    src_path,
                ))
            }
        };

        self.check_can_add(&dst_path, overwrite)?;

        if self.inventory.head_version().is_file(&dst_path) {
            self.remove_file(&dst_path)?;
        }

        let head = self.inventory.head_version_mut();
        head.add_file(digest, Arc::new(dst_path.clone()))?;
        head.remove_file(src_path);

        // fixity assertions against the staged source must follow the rename
        if let Some(staged) = self.staged_files.remove(src_path) {
            self.staged_files.insert(dst_path, staged);
        }

        Ok(())
    }

    /// Looks up the digest a logical path had in a previous version and adds it to the
    /// new version's state at the destination path.
    pub fn reinstate_file(
        &mut self,
        source_version: VersionNum,
        source_path: &LogicalPath,
        dst_path: LogicalPath,
        overwrite: bool,
    ) -> Result<()> {
        let digest = {
            let version = self.inventory.get_version(source_version)?;
            match version.lookup_digest(source_path) {
                Some(digest) => digest.clone(),
                None => {
                    return Err(not_found_path(
                        &self.inventory.id,
                        source_version,
                        source_path,
                    ))
                }
            }
        };

        self.check_can_add(&dst_path, overwrite)?;

        if self.inventory.head_version().is_file(&dst_path) {
            self.remove_file(&dst_path)?;
        }

        info!(
            "Reinstating {} {} at {}",
            source_version, source_path, dst_path
        );

        self.inventory
            .head_version_mut()
            .add_file(digest, Arc::new(dst_path))?;

        Ok(())
    }

    /// Drops every entry from the new version's state. Historical versions are
    /// unchanged.
    pub fn clear_version_state(&mut self) -> Result<()> {
        let paths: Vec<Arc<LogicalPath>> = self
            .inventory
            .head_version()
            .state_iter()
            .map(|(path, _)| path.clone())
            .collect();

        for path in paths {
            self.remove_file(&path)?;
        }

        Ok(())
    }

    /// Records a caller-asserted fixity digest for a logical path. The file must have
    /// been added in this block, or the algorithm must equal the inventory's content
    /// digest algorithm. The assertion is verified; a mismatch is a fixity-check error.
    pub fn add_file_fixity(
        &mut self,
        logical_path: &LogicalPath,
        algorithm: DigestAlgorithm,
        expected_digest: HexDigest,
    ) -> Result<()> {
        if let Some(staged) = self.staged_files.get(logical_path) {
            let mut file = File::open(&staged.source)?;
            let actual = algorithm.hash_hex(&mut file)?;

            if actual != expected_digest {
                return Err(OcflError::FixityCheck {
                    expected: algorithm.to_string(),
                    expected_digest: expected_digest.to_string(),
                    actual: actual.to_string(),
                });
            }

            if algorithm != self.inventory.digest_algorithm {
                let content_path = staged.content_path.clone();
                self.inventory
                    .add_fixity_entry(algorithm, &expected_digest, &content_path);
            }

            return Ok(());
        }

        // Not added in this block: the assertion can only be checked against the
        // content digest recorded in the state
        if algorithm != self.inventory.digest_algorithm {
            return Err(OcflError::IllegalState(format!(
                "Fixity for {} cannot be asserted with {} because the file was not \
                 written in this update",
                logical_path, algorithm
            )));
        }

        match self.inventory.head_version().lookup_digest(logical_path) {
            Some(known) => {
                if known.as_ref() != &expected_digest {
                    return Err(OcflError::FixityCheck {
                        expected: algorithm.to_string(),
                        expected_digest: expected_digest.to_string(),
                        actual: known.to_string(),
                    });
                }
                Ok(())
            }
            None => Err(not_found_path(
                &self.inventory.id,
                self.inventory.head,
                logical_path,
            )),
        }
    }

    /// Takes the content paths whose staged files became unreferenced, so the caller
    /// can remove the physical copies
    pub fn take_orphaned_paths(&mut self) -> Vec<Arc<ContentPath>> {
        std::mem::take(&mut self.orphaned)
    }

    /// Produces the immutable new inventory with the planned version in place at
    /// `head`. Consuming the updater makes further mutation impossible.
    pub fn finalize_update(mut self, meta: CommitMeta) -> Result<Inventory> {
        self.inventory.head_version_mut().update_meta(meta);
        self.inventory.validate_shallow()?;
        Ok(self.inventory)
    }

    /// Drops the digest's staging-area manifest entry when nothing references it
    fn drop_unreferenced_staged_content(&mut self, digest: &HexDigest) {
        if self.inventory.head_version().contains_digest(digest) {
            return;
        }

        let staged_path = match self.inventory.manifest().paths_for(digest) {
            Some(paths) => paths
                .iter()
                .find(|path| self.in_staging_area(path))
                .cloned(),
            None => None,
        };

        if let Some(path) = staged_path {
            self.inventory.manifest_mut().unbind(&path);
            self.inventory.remove_fixity_references(&path);
            self.orphaned.push(path);
        }
    }

    /// True when the content path was written by the version currently being planned:
    /// either under the mutable HEAD extension or under the new head version directory
    fn in_staging_area(&self, path: &ContentPath) -> bool {
        match path.version {
            ContentPathVersion::MutableHead => self.inventory.mutable_head,
            ContentPathVersion::VersionNum(num) => {
                !self.inventory.mutable_head && num == self.inventory.head
            }
        }
    }

    fn record_fixity_digests(
        &mut self,
        source_path: &Path,
        content_path: &ContentPath,
    ) -> Result<()> {
        if self.fixity_algorithms.is_empty() {
            return Ok(());
        }

        let mut writer = MultiDigestWriter::new(&self.fixity_algorithms, io::sink());
        let mut file = File::open(source_path)?;
        io::copy(&mut file, &mut writer)?;

        for (algorithm, digest) in writer.finalize_hex() {
            if algorithm != self.inventory.digest_algorithm {
                self.inventory
                    .add_fixity_entry(algorithm, &digest, content_path);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;
    use std::fs;
    use std::path::PathBuf;

    use assert_fs::TempDir;

    use crate::digest::DigestAlgorithm;
    use crate::error::OcflError;
    use crate::types::{CommitMeta, LogicalPath};
    use crate::updater::InventoryUpdater;

    fn temp_file(temp: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = temp.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn logical(path: &str) -> LogicalPath {
        path.try_into().unwrap()
    }

    fn new_updater() -> InventoryUpdater {
        InventoryUpdater::new_object("o1", DigestAlgorithm::Sha512, "content", 0, Vec::new())
            .unwrap()
    }

    fn digest_of(content: &str) -> crate::digest::HexDigest {
        DigestAlgorithm::Sha512
            .hash_hex(&mut content.as_bytes())
            .unwrap()
    }

    #[test]
    fn add_file_creates_manifest_entry_for_new_digest() {
        let temp = TempDir::new().unwrap();
        let source = temp_file(&temp, "f1", "content 1");
        let mut updater = new_updater();

        let new = updater
            .add_file(digest_of("content 1"), &source, logical("file1"), false)
            .unwrap();

        assert!(new);
        assert!(updater.inventory().contains_digest(&digest_of("content 1")));
    }

    #[test]
    fn add_file_dedups_known_digest() {
        let temp = TempDir::new().unwrap();
        let source = temp_file(&temp, "f1", "content 1");
        let mut updater = new_updater();

        assert!(updater
            .add_file(digest_of("content 1"), &source, logical("file1"), false)
            .unwrap());
        assert!(!updater
            .add_file(digest_of("content 1"), &source, logical("copy"), false)
            .unwrap());

        let paths = updater
            .inventory()
            .manifest()
            .paths_for(&digest_of("content 1"))
            .unwrap();
        assert_eq!(1, paths.len());
    }

    #[test]
    fn add_file_rejects_existing_path_without_overwrite() {
        let temp = TempDir::new().unwrap();
        let source = temp_file(&temp, "f1", "content 1");
        let mut updater = new_updater();

        updater
            .add_file(digest_of("content 1"), &source, logical("file1"), false)
            .unwrap();

        let source2 = temp_file(&temp, "f2", "content 2");
        let result = updater.add_file(digest_of("content 2"), &source2, logical("file1"), false);

        assert!(matches!(result, Err(OcflError::Overwrite(_))));
    }

    #[test]
    fn add_file_rejects_conflicting_path() {
        let temp = TempDir::new().unwrap();
        let source = temp_file(&temp, "f1", "file1");
        let mut updater = new_updater();

        updater
            .add_file(digest_of("file1"), &source, logical("file1"), false)
            .unwrap();

        let source2 = temp_file(&temp, "f2", "file2");
        let err = updater
            .add_file(digest_of("file2"), &source2, logical("file1/file2"), false)
            .unwrap_err();

        assert!(err
            .to_string()
            .contains("file1/file2 conflicts with the existing path file1"));
    }

    #[test]
    fn remove_file_drops_staged_manifest_entry() {
        let temp = TempDir::new().unwrap();
        let source = temp_file(&temp, "f1", "content 1");
        let mut updater = new_updater();

        updater
            .add_file(digest_of("content 1"), &source, logical("file1"), false)
            .unwrap();
        updater.remove_file(&logical("file1")).unwrap();

        assert!(!updater.inventory().contains_digest(&digest_of("content 1")));
        assert_eq!(1, updater.take_orphaned_paths().len());
    }

    #[test]
    fn rename_moves_state_entry() {
        let temp = TempDir::new().unwrap();
        let source = temp_file(&temp, "f1", "content 1");
        let mut updater = new_updater();

        updater
            .add_file(digest_of("content 1"), &source, logical("file1"), false)
            .unwrap();
        updater
            .rename_file(&logical("file1"), logical("dir/file2"), false)
            .unwrap();

        let head = updater.inventory().head_version();
        assert!(!head.is_file(&logical("file1")));
        assert!(head.is_file(&logical("dir/file2")));
    }

    #[test]
    fn reinstate_missing_path_fails() {
        let mut updater = new_updater();
        let result = updater.reinstate_file(
            crate::types::VersionNum::new(1),
            &logical("nope"),
            logical("dst"),
            false,
        );

        assert!(matches!(result, Err(OcflError::NotFound(_))));
    }

    #[test]
    fn fixity_assertion_verified_against_staged_bytes() {
        let temp = TempDir::new().unwrap();
        let source = temp_file(&temp, "f1", "content 1");
        let mut updater = new_updater();

        updater
            .add_file(digest_of("content 1"), &source, logical("file1"), false)
            .unwrap();

        let md5 = DigestAlgorithm::Md5
            .hash_hex(&mut "content 1".as_bytes())
            .unwrap();

        updater
            .add_file_fixity(&logical("file1"), DigestAlgorithm::Md5, md5)
            .unwrap();

        let result =
            updater.add_file_fixity(&logical("file1"), DigestAlgorithm::Md5, "bogus".into());
        assert!(matches!(result, Err(OcflError::FixityCheck { .. })));

        let fixity = updater.inventory().fixity.as_ref().unwrap();
        assert!(fixity.contains_key("md5"));
    }

    #[test]
    fn finalized_updater_cannot_be_reused() {
        let temp = TempDir::new().unwrap();
        let source = temp_file(&temp, "f1", "content 1");
        let mut updater = new_updater();

        updater
            .add_file(digest_of("content 1"), &source, logical("file1"), false)
            .unwrap();

        let inventory = updater.finalize_update(CommitMeta::new()).unwrap();
        assert_eq!(1, inventory.head_version().state_len());
        // `updater` has been moved; the borrow checker enforces single use
    }

    #[test]
    fn clear_version_state_empties_state() {
        let temp = TempDir::new().unwrap();
        let source = temp_file(&temp, "f1", "content 1");
        let mut updater = new_updater();

        updater
            .add_file(digest_of("content 1"), &source, logical("a/file1"), false)
            .unwrap();
        updater.clear_version_state().unwrap();

        assert_eq!(0, updater.inventory().head_version().state_len());
        assert!(!updater.inventory().contains_digest(&digest_of("content 1")));
    }
}
