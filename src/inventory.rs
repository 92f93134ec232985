use std::collections::{BTreeMap, HashMap, HashSet};
use std::convert::TryInto;
use std::fmt::Display;
use std::hash::Hash;
use std::mem;
use std::sync::Arc;

use chrono::{DateTime, Local};
use once_cell::sync::OnceCell;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::consts::{DEFAULT_CONTENT_DIR, INVENTORY_TYPE};
use crate::digest::{DigestAlgorithm, HexDigest};
use crate::error::{not_found, not_found_path, OcflError, Result};
use crate::types::{
    CommitMeta, ContentPath, ContentPathVersion, Diff, FileDetails, InventoryPath, LogicalPath,
    RevisionNum, VersionDetails, VersionNum,
};
use crate::{paths, validate};

/// In-memory representation of `inventory.json`
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: String,
    #[serde(rename = "type")]
    pub type_declaration: String,
    pub digest_algorithm: DigestAlgorithm,
    pub head: VersionNum,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_directory: Option<String>,
    manifest: DigestIndex<ContentPath>,
    pub versions: BTreeMap<VersionNum, Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixity: Option<HashMap<String, HashMap<String, Vec<String>>>>,

    /// Path to the object's root relative the repository root, `/`-delimited
    #[serde(skip)]
    pub object_root: String,
    /// Indicates if the head version is an uncommitted mutable HEAD
    #[serde(skip)]
    pub mutable_head: bool,
    /// The current mutable HEAD revision, when one is active
    #[serde(skip)]
    pub revision_num: Option<RevisionNum>,
    /// The digest of the root inventory that was persisted when this inventory was
    /// loaded. Used to detect concurrent modifications at commit time.
    #[serde(skip)]
    pub previous_digest: Option<HexDigest>,
}

impl Inventory {
    /// Returns a new inventory builder for a brand new object
    pub fn builder(object_id: &str) -> InventoryBuilder {
        InventoryBuilder::new(object_id)
    }

    /// Returns true if the HEAD version is equal to 1
    pub fn is_new(&self) -> bool {
        self.head.number == 1
    }

    /// Returns a reference to the HEAD version
    pub fn head_version(&self) -> &Version {
        // The head version is known to exist because it is validated on load
        self.versions.get(&self.head).unwrap()
    }

    /// Returns a mutable reference to the HEAD version
    pub fn head_version_mut(&mut self) -> &mut Version {
        self.versions.get_mut(&self.head).unwrap()
    }

    /// Returns a reference to the specified version or an error if it does not exist.
    pub fn get_version(&self, version_num: VersionNum) -> Result<&Version> {
        match self.versions.get(&version_num) {
            Some(v) => Ok(v),
            None => Err(not_found(&self.id, Some(version_num))),
        }
    }

    /// Removes and returns the specified version from the inventory, or an error if it
    /// does not exist.
    pub fn remove_version(&mut self, version_num: VersionNum) -> Result<Version> {
        match self.versions.remove(&version_num) {
            Some(v) => Ok(v),
            None => Err(not_found(&self.id, Some(version_num))),
        }
    }

    pub fn defaulted_content_dir(&self) -> &str {
        match &self.content_directory {
            Some(dir) => dir.as_str(),
            None => DEFAULT_CONTENT_DIR,
        }
    }

    pub(crate) fn manifest(&self) -> &DigestIndex<ContentPath> {
        &self.manifest
    }

    pub(crate) fn manifest_mut(&mut self) -> &mut DigestIndex<ContentPath> {
        &mut self.manifest
    }

    pub(crate) fn set_manifest(&mut self, manifest: DigestIndex<ContentPath>) {
        self.manifest = manifest;
    }

    /// Returns true if the path exists in the manifest
    pub fn contains_content_path(&self, content_path: &ContentPath) -> bool {
        self.manifest.binds_path(content_path)
    }

    /// Returns true if the digest exists in the manifest
    pub fn contains_digest(&self, digest: &HexDigest) -> bool {
        self.manifest.binds_digest(digest)
    }

    /// Returns the version a content path belongs to. Mutable HEAD paths resolve to the
    /// head version.
    pub fn content_path_version(&self, content_path: &ContentPath) -> VersionNum {
        match content_path.version {
            ContentPathVersion::VersionNum(num) => num,
            ContentPathVersion::MutableHead => self.head,
        }
    }

    /// Returns the first content path associated with the specified digest, or an error
    /// if it does not exist.
    ///
    /// The content path must exist in `version_num` or earlier. If `logical_path` is
    /// provided and multiple content paths are found, the path that maps directly to the
    /// logical path is preferred.
    pub fn content_path_for_digest(
        &self,
        digest: &HexDigest,
        version_num: Option<VersionNum>,
        logical_path: Option<&LogicalPath>,
    ) -> Result<&Arc<ContentPath>> {
        let version_num = version_num.unwrap_or(self.head);

        match self.manifest.paths_for(digest) {
            Some(paths) => {
                let mut matches = Vec::new();

                for path in paths {
                    if self.content_path_version(path) <= version_num {
                        matches.push(path);
                    }
                }

                if matches.is_empty() {
                    return Err(OcflError::CorruptObject {
                        object_id: self.id.clone(),
                        message: format!("Digest {} is not mapped to any content paths", digest),
                    });
                } else if matches.len() > 1 {
                    if let Some(logical_path) = logical_path {
                        let suffix =
                            format!("/{}/{}", self.defaulted_content_dir(), logical_path);
                        for path in matches.iter() {
                            if path.as_str().ends_with(&suffix) {
                                return Ok(path);
                            }
                        }
                    }
                }

                Ok(matches.first().unwrap())
            }
            None => Err(OcflError::CorruptObject {
                object_id: self.id.clone(),
                message: format!("Digest {} not found in manifest", digest),
            }),
        }
    }

    /// Returns the content path for the logical path, or a `NotFound` error if the path
    /// is not found in the specified version.
    pub fn content_path_for_logical_path(
        &self,
        logical_path: &LogicalPath,
        version_num: Option<VersionNum>,
    ) -> Result<&Arc<ContentPath>> {
        let version_num = version_num.unwrap_or(self.head);
        let version = self.get_version(version_num)?;

        let digest = match version.lookup_digest(logical_path) {
            Some(digest) => digest,
            None => return Err(not_found_path(&self.id, version_num, logical_path)),
        };

        self.content_path_for_digest(digest, Some(version_num), Some(logical_path))
    }

    /// Returns the storage key of a content path, relative the repository root
    pub fn storage_path(&self, content_path: &ContentPath) -> String {
        paths::join(&self.object_root, content_path.as_str())
    }

    /// Builds the `FileDetails` for a logical path resolved in a version
    pub(crate) fn file_details(
        &self,
        digest: &Arc<HexDigest>,
        version_num: VersionNum,
        logical_path: &Arc<LogicalPath>,
        version_details: Arc<VersionDetails>,
    ) -> Result<FileDetails> {
        let content_path =
            self.content_path_for_digest(digest, Some(version_num), Some(logical_path))?;

        Ok(FileDetails {
            digest: digest.clone(),
            digest_algorithm: self.digest_algorithm,
            content_path: content_path.clone(),
            storage_path: self.storage_path(content_path),
            last_update: version_details,
        })
    }

    /// Returns a new content path for the specified logical path within the specified
    /// version, assuming a direct one-to-one mapping of logical path to content path.
    pub fn new_content_path(
        &self,
        version_num: VersionNum,
        logical_path: &LogicalPath,
    ) -> Result<ContentPath> {
        format!(
            "{}/{}/{}",
            version_num,
            self.defaulted_content_dir(),
            logical_path
        )
        .try_into()
    }

    /// Returns a new content path within the specified mutable HEAD revision
    pub fn new_revision_content_path(
        &self,
        revision_num: RevisionNum,
        logical_path: &LogicalPath,
    ) -> Result<ContentPath> {
        format!(
            "{}/{}/{}/{}",
            crate::consts::MUTABLE_HEAD_DIR,
            self.defaulted_content_dir(),
            revision_num,
            logical_path
        )
        .try_into()
    }

    /// Records an additional fixity digest for a content path
    pub(crate) fn add_fixity_entry(
        &mut self,
        algorithm: DigestAlgorithm,
        digest: &HexDigest,
        content_path: &ContentPath,
    ) {
        let fixity = self.fixity.get_or_insert_with(HashMap::new);
        let paths = fixity
            .entry(algorithm.to_string())
            .or_insert_with(HashMap::new)
            .entry(digest.to_string())
            .or_insert_with(Vec::new);

        let content_path = content_path.as_str();
        if !paths.iter().any(|p| p == content_path) {
            paths.push(content_path.to_string());
        }
    }

    /// Removes every fixity reference to a content path
    pub(crate) fn remove_fixity_references(&mut self, content_path: &ContentPath) {
        if let Some(fixity) = &mut self.fixity {
            for digests in fixity.values_mut() {
                digests.retain(|_, paths| {
                    paths.retain(|p| p != content_path.as_str());
                    !paths.is_empty()
                });
            }
            fixity.retain(|_, digests| !digests.is_empty());
            if fixity.is_empty() {
                self.fixity = None;
            }
        }
    }

    /// Returns the diffs of two versions. An error is returned if either of the
    /// specified versions does not exist. If only one version is specified, then the
    /// diff is between the specified version and the version before it.
    pub fn diff_versions(&self, left: Option<VersionNum>, right: VersionNum) -> Result<Vec<Diff>> {
        if let Some(left) = left {
            if left == right {
                return Ok(Vec::new());
            }
        }

        let left = match left {
            Some(left) => Some(self.get_version(left)?),
            None => {
                if right.number > 1 {
                    Some(self.get_version(right.previous()?)?)
                } else {
                    None
                }
            }
        };

        Ok(self.get_version(right)?.diff(left))
    }

    /// Performs the consistency checks that are run against every inventory before it
    /// is committed. Structural problems are surfaced as `CorruptObject` errors.
    pub fn validate_shallow(&self) -> Result<()> {
        validate::shallow_validate(self)
    }
}

/// Used to construct the inventory for a brand new object
pub struct InventoryBuilder {
    id: String,
    type_declaration: String,
    digest_algorithm: DigestAlgorithm,
    head: VersionNum,
    content_directory: String,
    object_root: String,
}

impl InventoryBuilder {
    pub fn new(object_id: &str) -> Self {
        Self {
            id: object_id.to_string(),
            type_declaration: INVENTORY_TYPE.to_string(),
            digest_algorithm: DigestAlgorithm::Sha512,
            head: VersionNum::with_width(1, 0),
            content_directory: DEFAULT_CONTENT_DIR.to_string(),
            object_root: "".to_string(),
        }
    }

    pub fn with_digest_algorithm(mut self, digest_algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = digest_algorithm;
        self
    }

    pub fn with_head(mut self, head: VersionNum) -> Self {
        self.head = head;
        self
    }

    pub fn with_content_directory(mut self, content_directory: &str) -> Self {
        self.content_directory = content_directory.to_string();
        self
    }

    pub fn with_object_root(mut self, object_root: String) -> Self {
        self.object_root = object_root;
        self
    }

    pub fn build(self) -> Result<Inventory> {
        if self.id.trim().is_empty() {
            return Err(OcflError::InvalidValue(
                "Object IDs may not be blank".to_string(),
            ));
        }

        if !self.digest_algorithm.is_content_algorithm() {
            return Err(OcflError::InvalidValue(format!(
                "The inventory digest algorithm must be sha512 or sha256. Found: {}",
                self.digest_algorithm
            )));
        }

        validate_content_dir(&self.content_directory)?;

        let mut versions = BTreeMap::new();
        versions.insert(self.head, Version::new_staged());

        Ok(Inventory {
            id: self.id,
            type_declaration: self.type_declaration,
            digest_algorithm: self.digest_algorithm,
            head: self.head,
            content_directory: Some(self.content_directory),
            manifest: DigestIndex::new(),
            versions,
            fixity: None,
            object_root: self.object_root,
            mutable_head: false,
            revision_num: None,
            previous_digest: None,
        })
    }
}

/// Validates the rules for the `contentDirectory` inventory field
pub fn validate_content_dir(content_dir: &str) -> Result<()> {
    if content_dir.eq(".") || content_dir.eq("..") || content_dir.contains('/') {
        return Err(OcflError::InvalidValue(format!(
            "The content directory cannot equal '.' or '..' and cannot contain a '/'. Found: {}",
            content_dir
        )));
    }
    Ok(())
}

/// A single version within an inventory
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Version {
    pub created: DateTime<Local>,
    state: DigestIndex<LogicalPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    /// All of the logical path parts that should be treated as directories
    #[serde(skip)]
    logical_dirs: OnceCell<HashSet<LogicalPath>>,
}

/// The user that authored a version
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct User {
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl User {
    pub fn new(name: String, address: Option<String>) -> Self {
        Self {
            name: Some(name),
            address,
        }
    }
}

impl Version {
    /// Create a new Version with an empty state
    pub fn new_staged() -> Self {
        Self::staged_version(DigestIndex::new())
    }

    /// Creates a new Version with this version's state cloned
    pub fn clone_staged(&self) -> Self {
        Self::staged_version(self.state.clone())
    }

    fn staged_version(state: DigestIndex<LogicalPath>) -> Self {
        Self {
            created: Local::now(),
            message: None,
            user: None,
            state,
            logical_dirs: OnceCell::default(),
        }
    }

    /// Applies commit meta to the version. A missing created timestamp defaults to now.
    pub fn update_meta(&mut self, meta: CommitMeta) {
        self.message = meta.message;
        self.user = meta.user_name.map(|name| User::new(name, meta.user_address));
        self.created = meta.created.unwrap_or_else(Local::now);
    }

    /// Returns a non-consuming iterator over the version's state
    pub fn state_iter(&self) -> impl Iterator<Item = (&Arc<LogicalPath>, &Arc<HexDigest>)> {
        self.state.paths()
    }

    /// Moves the state map out, leaving an empty state behind
    pub(crate) fn remove_state(&mut self) -> DigestIndex<LogicalPath> {
        if self.logical_dirs.get().is_some() {
            self.logical_dirs = OnceCell::default();
        }
        mem::take(&mut self.state)
    }

    /// Returns the number of logical paths in the version
    pub fn state_len(&self) -> usize {
        self.state.len()
    }

    /// Returns a reference to the digest associated to a logical path, or None if the
    /// logical path does not exist in the version's state.
    pub fn lookup_digest(&self, logical_path: &LogicalPath) -> Option<&Arc<HexDigest>> {
        self.state.digest_for(logical_path)
    }

    /// Returns true if the specified path exists as either a logical file or directory
    pub fn exists(&self, path: &LogicalPath) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    /// Returns true if the specified path exists and is a logical file
    pub fn is_file(&self, path: &LogicalPath) -> bool {
        self.state.binds_path(path)
    }

    /// Returns true if the specified path exists and is a logical directory
    pub fn is_dir(&self, path: &LogicalPath) -> bool {
        self.logical_dirs().contains(path)
    }

    /// Returns true if the version's state contains an entry for the digest
    pub fn contains_digest(&self, digest: &HexDigest) -> bool {
        self.state.binds_digest(digest)
    }

    /// Returns an error if the specified path conflicts with the existing state. A path
    /// conflicts when a portion of it is interpreted as both a directory and a file.
    pub fn validate_non_conflicting(&self, path: &LogicalPath) -> Result<()> {
        if self.is_dir(path) {
            let conflict = self
                .state
                .paths()
                .map(|(existing, _)| existing)
                .find(|existing| {
                    existing
                        .as_str()
                        .starts_with(&format!("{}/", path.as_str()))
                })
                .map(|existing| existing.as_str().to_string())
                .unwrap_or_else(|| path.as_str().to_string());

            return Err(OcflError::PathConstraint(format!(
                "{} conflicts with the existing path {}",
                path, conflict
            )));
        }

        for dir in logical_dirs_of(path) {
            if self.is_file(&dir) {
                return Err(OcflError::PathConstraint(format!(
                    "{} conflicts with the existing path {}",
                    path, dir
                )));
            }
        }

        Ok(())
    }

    /// Computes a diff between the versions. This version is the right-hand version and
    /// the other version is the left hand version. If the other version is None, then
    /// all of this version's paths are returned as Adds.
    pub fn diff(&self, other: Option<&Version>) -> Vec<Diff> {
        let mut diffs = Vec::new();
        let mut deletes: HashMap<Arc<HexDigest>, Vec<Arc<LogicalPath>>> = HashMap::new();

        if let Some(left) = other {
            let mut seen = HashSet::with_capacity(left.state.len());

            for (path, left_digest) in left.state_iter() {
                match self.lookup_digest(path) {
                    None => {
                        deletes
                            .entry(left_digest.clone())
                            .or_insert_with(Vec::new)
                            .push(path.clone());
                    }
                    Some(right_digest) => {
                        seen.insert(path.clone());
                        if left_digest != right_digest {
                            diffs.push(Diff::Modified(path.clone()))
                        }
                    }
                }
            }

            let mut renames: HashMap<Arc<HexDigest>, Diff> = HashMap::new();

            for (path, digest) in self.state_iter() {
                if seen.contains(path) {
                    continue;
                }

                if let Some(original) = deletes.remove(digest) {
                    let renamed = vec![path.clone()];
                    renames.insert(digest.clone(), Diff::Renamed { original, renamed });
                } else if let Some(Diff::Renamed {
                    original: _,
                    renamed,
                }) = renames.get_mut(digest)
                {
                    renamed.push(path.clone());
                } else {
                    diffs.push(Diff::Added(path.clone()));
                }
            }

            for (_digest, deletes) in deletes {
                for delete in deletes {
                    diffs.push(Diff::Deleted(delete));
                }
            }

            for (_digest, mut rename) in renames {
                if let Diff::Renamed { original, renamed } = &mut rename {
                    original.sort_unstable();
                    renamed.sort_unstable();
                }
                diffs.push(rename);
            }
        } else {
            for (path, _digest) in self.state_iter() {
                diffs.push(Diff::Added(path.clone()));
            }
        }

        diffs
    }

    /// Adds a new logical path to the version, and updates the logical directory set,
    /// if needed. The corresponding manifest entry MUST be added separately for the
    /// inventory to remain valid.
    pub(crate) fn add_file(
        &mut self,
        digest: Arc<HexDigest>,
        logical_path: Arc<LogicalPath>,
    ) -> Result<()> {
        self.validate_non_conflicting(&logical_path)?;
        if let Some(dirs) = self.logical_dirs.get_mut() {
            dirs.extend(logical_dirs_of(&logical_path));
        }
        self.state.bind(digest, logical_path);

        Ok(())
    }

    /// Removes a logical path from the version's state
    pub(crate) fn remove_file(
        &mut self,
        path: &LogicalPath,
    ) -> Option<(Arc<LogicalPath>, Arc<HexDigest>)> {
        // must invalidate the logical dirs
        if self.logical_dirs.get().is_some() {
            self.logical_dirs = OnceCell::default();
        }
        self.state.unbind(path)
    }

    /// Initializes a HashSet containing all of the logical directories within a version.
    fn logical_dirs(&self) -> &HashSet<LogicalPath> {
        self.logical_dirs.get_or_init(|| {
            let mut dirs: HashSet<LogicalPath> = HashSet::with_capacity(self.state.len());
            // Add the root path
            dirs.insert("/".try_into().unwrap());

            for (path, _) in self.state.paths() {
                dirs.extend(logical_dirs_of(path));
            }

            dirs
        })
    }
}

fn logical_dirs_of(path: &LogicalPath) -> HashSet<LogicalPath> {
    let mut dirs = HashSet::new();

    let mut parent = path.parent();
    while !parent.as_str().is_empty() {
        let next = parent.parent();
        dirs.insert(parent);
        parent = next;
    }

    dirs
}

/// Index binding file digests to the ordered list of paths holding those bytes, with a
/// reverse lookup from path to digest. Backs both the manifest (content paths) and
/// version states (logical paths).
///
/// Two inventory rules are enforced here rather than left to callers: the order paths
/// appear in the serialized arrays is preserved, so "the first content path" of a
/// digest is stable; and a path is bound to at most one digest, so an inventory that
/// maps the same path under two digests fails to parse.
#[derive(Debug, Clone)]
pub(crate) struct DigestIndex<P>
where
    P: Eq + Hash,
{
    forward: HashMap<Arc<HexDigest>, Vec<Arc<P>>>,
    reverse: HashMap<Arc<P>, Arc<HexDigest>>,
}

impl<P> DigestIndex<P>
where
    P: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            forward: HashMap::new(),
            reverse: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            forward: HashMap::with_capacity(capacity),
            reverse: HashMap::with_capacity(capacity),
        }
    }

    /// Binds a path to a digest, appending the path to the digest's ordered path list.
    /// A path that is already bound is rebound: its old binding is dropped first.
    pub fn bind(&mut self, digest: Arc<HexDigest>, path: Arc<P>) {
        self.unbind(&path);

        // reuse the stored digest allocation when one exists
        let digest = match self.forward.get_key_value(&digest) {
            Some((shared, _)) => shared.clone(),
            None => digest,
        };

        self.forward
            .entry(digest.clone())
            .or_default()
            .push(path.clone());
        self.reverse.insert(path, digest);
    }

    /// Drops a path's binding. The digest disappears from the index with its last path.
    pub fn unbind(&mut self, path: &P) -> Option<(Arc<P>, Arc<HexDigest>)> {
        let (path, digest) = self.reverse.remove_entry(path)?;

        if let Some(paths) = self.forward.get_mut(&digest) {
            paths.retain(|bound| bound != &path);
            if paths.is_empty() {
                self.forward.remove(&digest);
            }
        }

        Some((path, digest))
    }

    /// The digest a path is bound to
    pub fn digest_for(&self, path: &P) -> Option<&Arc<HexDigest>> {
        self.reverse.get(path)
    }

    /// The paths bound to a digest, in binding order
    pub fn paths_for(&self, digest: &HexDigest) -> Option<&[Arc<P>]> {
        self.forward.get(digest).map(Vec::as_slice)
    }

    /// The stored allocation of a digest, so equal digests share one `Arc`
    pub fn shared_digest(&self, digest: &HexDigest) -> Option<Arc<HexDigest>> {
        self.forward
            .get_key_value(digest)
            .map(|(digest, _)| digest.clone())
    }

    pub fn binds_path(&self, path: &P) -> bool {
        self.reverse.contains_key(path)
    }

    pub fn binds_digest(&self, digest: &HexDigest) -> bool {
        self.forward.contains_key(digest)
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// Iterates over every path-digest binding
    pub fn paths(&self) -> impl Iterator<Item = (&Arc<P>, &Arc<HexDigest>)> {
        self.reverse.iter()
    }

    /// Iterates over every digest and its ordered paths
    pub fn digests(&self) -> impl Iterator<Item = (&Arc<HexDigest>, &[Arc<P>])> {
        self.forward
            .iter()
            .map(|(digest, paths)| (digest, paths.as_slice()))
    }
}

impl<P> Default for DigestIndex<P>
where
    P: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P> IntoIterator for DigestIndex<P>
where
    P: Eq + Hash,
{
    type Item = (Arc<P>, Arc<HexDigest>);
    type IntoIter = std::collections::hash_map::IntoIter<Arc<P>, Arc<HexDigest>>;

    fn into_iter(self) -> Self::IntoIter {
        self.reverse.into_iter()
    }
}

impl<'de, P> Deserialize<'de> for DigestIndex<P>
where
    P: Eq + Hash + Display + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: HashMap<HexDigest, Vec<P>> = HashMap::deserialize(deserializer)?;

        let mut index = DigestIndex::with_capacity(raw.len());

        for (digest, paths) in raw {
            let digest = Arc::new(digest);
            for path in paths {
                if index.binds_path(&path) {
                    return Err(D::Error::custom(format!(
                        "the path {} is mapped to more than one digest",
                        path
                    )));
                }
                index.bind(digest.clone(), Arc::new(path));
            }
        }

        Ok(index)
    }
}

impl<P> Serialize for DigestIndex<P>
where
    P: Eq + Hash + Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.forward.iter())
    }
}
