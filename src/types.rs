use core::fmt;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::convert::{TryFrom, TryInto};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::{FromStr, Split};
use std::sync::Arc;

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::consts::MUTABLE_HEAD_EXT_DIR;
use crate::digest::{DigestAlgorithm, HexDigest};
use crate::error::{OcflError, Result};
use crate::inventory::{Inventory, Version};

static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^v\d+$").unwrap());
static REVISION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^r\d+$").unwrap());

/// Represents an [OCFL object version](https://ocfl.io/1.0/spec/#version-directories).
#[derive(Deserialize, Serialize, Debug, Copy, Clone)]
#[serde(try_from = "&str")]
#[serde(into = "String")]
pub struct VersionNum {
    pub number: u32,
    pub width: u32,
}

impl VersionNum {
    /// Creates a new VersionNum with width 0
    pub fn new(number: u32) -> Self {
        Self { number, width: 0 }
    }

    /// Creates a new VersionNum with the specified zero-padding width
    pub fn with_width(number: u32, width: u32) -> Self {
        Self { number, width }
    }

    /// Returns the previous version, or an Error if the previous version is invalid (less than 1).
    pub fn previous(&self) -> Result<VersionNum> {
        if self.number - 1 < 1 {
            return Err(OcflError::IllegalState(
                "Versions cannot be less than 1".to_string(),
            ));
        }

        Ok(Self {
            number: self.number - 1,
            width: self.width,
        })
    }

    /// Returns the next version, or an Error if the next version is invalid. Version
    /// numbers only have an upper bound when they are zero-padded.
    pub fn next(&self) -> Result<VersionNum> {
        let max = match self.width {
            0 => u32::MAX,
            _ => 10u32.pow(self.width - 1) - 1,
        };

        if self.number + 1 > max {
            return Err(OcflError::IllegalState(format!(
                "Version cannot be greater than {}",
                max
            )));
        }

        Ok(Self {
            number: self.number + 1,
            width: self.width,
        })
    }
}

impl TryFrom<&str> for VersionNum {
    type Error = OcflError;

    /// Parses a string in the format of `v1` or `v0002` into a `VersionNum`. An error is
    /// returned if the version string is invalid.
    fn try_from(version: &str) -> Result<Self, Self::Error> {
        if !VERSION_REGEX.is_match(version) {
            return Err(OcflError::InvalidValue(format!(
                "Invalid version {}",
                version
            )));
        }

        match version[1..].parse::<u32>() {
            Ok(num) => {
                if num < 1 {
                    return Err(OcflError::InvalidValue(format!(
                        "Invalid version {}",
                        version
                    )));
                }

                let width = match version.starts_with("v0") {
                    true => version.len() - 1,
                    false => 0,
                };

                Ok(Self {
                    number: num,
                    width: width as u32,
                })
            }
            Err(_) => Err(OcflError::InvalidValue(format!(
                "Invalid version {}",
                version
            ))),
        }
    }
}

impl TryFrom<u32> for VersionNum {
    type Error = OcflError;

    fn try_from(version: u32) -> Result<Self, Self::Error> {
        if version < 1 {
            return Err(OcflError::InvalidValue(format!(
                "Invalid version number {}",
                version
            )));
        }

        Ok(Self {
            number: version,
            width: 0,
        })
    }
}

impl FromStr for VersionNum {
    type Err = OcflError;

    /// Attempts to interpret a string as a version, eg `v3`, `v00009`, or `8`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match VersionNum::try_from(s) {
            Ok(v) => Ok(v),
            Err(_) => match u32::from_str(s) {
                Ok(parsed) => Ok(VersionNum::try_from(parsed)?),
                Err(_) => Err(OcflError::InvalidValue(format!(
                    "Invalid version number {}",
                    s
                ))),
            },
        }
    }
}

impl fmt::Display for VersionNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{:0width$}", self.number, width = self.width as usize)
    }
}

impl From<VersionNum> for String {
    fn from(version_num: VersionNum) -> Self {
        format!("{}", version_num)
    }
}

impl PartialEq for VersionNum {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
    }
}

impl Eq for VersionNum {}

impl Hash for VersionNum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.number.hash(state)
    }
}

impl PartialOrd for VersionNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionNum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number.cmp(&other.number)
    }
}

/// Represents a revision of a mutable HEAD version. Revisions are rendered as `r1`,
/// `r2`, etc and are never zero-padded.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RevisionNum {
    pub number: u32,
}

impl RevisionNum {
    pub fn new(number: u32) -> Self {
        Self { number }
    }

    pub fn next(&self) -> RevisionNum {
        Self {
            number: self.number + 1,
        }
    }
}

impl TryFrom<&str> for RevisionNum {
    type Error = OcflError;

    fn try_from(revision: &str) -> Result<Self, Self::Error> {
        if !REVISION_REGEX.is_match(revision) {
            return Err(OcflError::InvalidValue(format!(
                "Invalid revision {}",
                revision
            )));
        }

        match revision[1..].parse::<u32>() {
            Ok(num) if num >= 1 => Ok(Self { number: num }),
            _ => Err(OcflError::InvalidValue(format!(
                "Invalid revision {}",
                revision
            ))),
        }
    }
}

impl fmt::Display for RevisionNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.number)
    }
}

impl PartialOrd for RevisionNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RevisionNum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number.cmp(&other.number)
    }
}

/// Represents either a specific version number or whatever the current head version is
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VersionRef {
    Number(VersionNum),
    Head,
}

impl VersionRef {
    pub fn resolve(&self, head_num: VersionNum) -> VersionNum {
        match self {
            VersionRef::Number(num) => *num,
            VersionRef::Head => head_num,
        }
    }
}

impl From<VersionNum> for VersionRef {
    fn from(num: VersionNum) -> Self {
        Self::Number(num)
    }
}

impl From<Option<VersionNum>> for VersionRef {
    fn from(num: Option<VersionNum>) -> Self {
        num.map_or(VersionRef::Head, VersionRef::Number)
    }
}

/// Shared behavior of logical and content paths
pub trait InventoryPath {
    /// Returns an iterable containing each segment of the path split on the `/` separator
    fn parts(&self) -> Split<char>;

    /// Returns the parent path of this path
    fn parent(&self) -> Self;

    /// Returns the part of the path that's after the final `/`, or the entire path if
    /// there is no `/`
    fn filename(&self) -> &str;

    /// Creates a new path by joining this path with another
    fn resolve(&self, other: &Self) -> Self;

    /// Returns a reference to the path represented as a `str`
    fn as_str(&self) -> &str;

    /// Returns true if the path is empty
    fn is_empty(&self) -> bool;
}

#[derive(Deserialize, Serialize, Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Clone)]
struct PathInner(String);

impl TryFrom<&str> for PathInner {
    type Error = OcflError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim_start_matches('/').trim_end_matches('/');

        if !trimmed.is_empty() {
            let has_illegal_part = trimmed
                .split('/')
                .any(|part| part == "." || part == ".." || part.is_empty());

            if has_illegal_part {
                return Err(OcflError::PathConstraint(format!(
                    "Paths may not contain '.', '..', or '' parts. Found: {}",
                    value
                )));
            }
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl InventoryPath for PathInner {
    fn parts(&self) -> Split<char> {
        self.0.split('/')
    }

    fn parent(&self) -> Self {
        match self.0.rfind('/') {
            Some(last_slash) => Self(self.0.as_str()[0..last_slash].into()),
            None => Self("".to_string()),
        }
    }

    fn filename(&self) -> &str {
        match self.0.rfind('/') {
            Some(last_slash) => &self.0.as_str()[last_slash + 1..],
            None => self.0.as_str(),
        }
    }

    fn resolve(&self, other: &Self) -> Self {
        if self.0.is_empty() {
            other.clone()
        } else {
            Self(format!("{}/{}", self.0, other.0))
        }
    }

    fn as_str(&self) -> &str {
        &self.0
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Represents the logical path to a file within an object version
#[derive(Deserialize, Serialize, Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Clone)]
#[serde(transparent)]
pub struct LogicalPath {
    inner: PathInner,
}

/// Represents a path to a physical file relative the object root
#[derive(Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Clone)]
pub struct ContentPath {
    inner: PathInner,
    /// The version the content path belongs to. Mutable HEAD content paths do not map
    /// to a version number.
    pub version: ContentPathVersion,
}

#[derive(Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Copy, Clone)]
pub enum ContentPathVersion {
    VersionNum(VersionNum),
    MutableHead,
}

impl InventoryPath for LogicalPath {
    fn parts(&self) -> Split<char> {
        self.inner.parts()
    }

    fn parent(&self) -> Self {
        Self {
            inner: self.inner.parent(),
        }
    }

    fn filename(&self) -> &str {
        self.inner.filename()
    }

    fn resolve(&self, other: &Self) -> Self {
        Self {
            inner: self.inner.resolve(&other.inner),
        }
    }

    fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl InventoryPath for ContentPath {
    fn parts(&self) -> Split<char> {
        self.inner.parts()
    }

    fn parent(&self) -> Self {
        Self {
            inner: self.inner.parent(),
            version: self.version,
        }
    }

    fn filename(&self) -> &str {
        self.inner.filename()
    }

    fn resolve(&self, other: &Self) -> Self {
        Self {
            inner: self.inner.resolve(&other.inner),
            version: self.version,
        }
    }

    fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl TryFrom<&str> for LogicalPath {
    type Error = OcflError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(Self {
            inner: PathInner::try_from(value)?,
        })
    }
}

impl TryFrom<String> for LogicalPath {
    type Error = OcflError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.as_str().try_into()
    }
}

impl TryFrom<&String> for LogicalPath {
    type Error = OcflError;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        value.as_str().try_into()
    }
}

impl TryFrom<Cow<'_, str>> for LogicalPath {
    type Error = OcflError;

    fn try_from(value: Cow<'_, str>) -> Result<Self, Self::Error> {
        value.as_ref().try_into()
    }
}

impl TryFrom<&str> for ContentPath {
    type Error = OcflError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let inner = PathInner::try_from(value)?;

        // Mutable HEAD paths do not begin with a version number
        let version = if inner.as_str().starts_with(MUTABLE_HEAD_EXT_DIR) {
            ContentPathVersion::MutableHead
        } else {
            match inner.as_str().find('/') {
                Some(index) => {
                    ContentPathVersion::VersionNum(inner.as_str()[0..index].try_into()?)
                }
                None => {
                    return Err(OcflError::PathConstraint(format!(
                        "Content paths must begin with a valid version number. Found: {}",
                        value
                    )));
                }
            }
        };

        Ok(Self { inner, version })
    }
}

impl TryFrom<String> for ContentPath {
    type Error = OcflError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl TryFrom<&String> for ContentPath {
    type Error = OcflError;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<LogicalPath> for String {
    fn from(path: LogicalPath) -> Self {
        path.inner.0
    }
}

impl From<ContentPath> for String {
    fn from(path: ContentPath) -> Self {
        path.inner.0
    }
}

impl AsRef<str> for LogicalPath {
    fn as_ref(&self) -> &str {
        self.inner.as_str()
    }
}

impl AsRef<str> for ContentPath {
    fn as_ref(&self) -> &str {
        self.inner.as_str()
    }
}

impl Display for LogicalPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.0)
    }
}

impl Display for ContentPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.0)
    }
}

impl Serialize for ContentPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentPath {
    fn deserialize<D>(deserializer: D) -> Result<ContentPath, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(ContentPathVisitor)
    }
}

struct ContentPathVisitor;

impl<'de> Visitor<'de> for ContentPathVisitor {
    type Value = ContentPath;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a string that is a valid OCFL content path")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.try_into()
            .map_err(|e: OcflError| E::custom(e.to_string()))
    }
}

/// Optional meta that may be associated with a commit
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct CommitMeta {
    pub(crate) user_name: Option<String>,
    pub(crate) user_address: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) created: Option<DateTime<Local>>,
}

impl CommitMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the commit user. `name` must be provided if `address` is provided.
    pub fn with_user(mut self, name: Option<String>, address: Option<String>) -> Result<Self> {
        if address.is_some() && name.is_none() {
            return Err(OcflError::InvalidValue(
                "User name must be set when user address is set.".to_string(),
            ));
        }
        self.user_name = name;
        self.user_address = address;
        Ok(self)
    }

    /// Sets the commit message
    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    /// Sets the commit created timestamp
    pub fn with_created(mut self, created: Option<DateTime<Local>>) -> Self {
        self.created = created;
        self
    }
}

/// Metadata about a version
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct VersionDetails {
    pub version_num: VersionNum,
    pub created: DateTime<Local>,
    pub user_name: Option<String>,
    pub user_address: Option<String>,
    pub message: Option<String>,
}

impl VersionDetails {
    /// Creates `VersionDetails` by cloning the input
    pub fn new(version_num: VersionNum, version: &Version) -> Self {
        let (user, address) = match &version.user {
            Some(user) => (user.name.clone(), user.address.clone()),
            None => (None, None),
        };

        Self {
            version_num,
            created: version.created,
            user_name: user,
            user_address: address,
            message: version.message.clone(),
        }
    }

    /// Creates `VersionDetails` by consuming the input
    pub fn from_version(version_num: VersionNum, version: Version) -> Self {
        let (user, address) = match version.user {
            Some(user) => (user.name, user.address),
            None => (None, None),
        };

        Self {
            version_num,
            created: version.created,
            user_name: user,
            user_address: address,
            message: version.message,
        }
    }
}

/// High-level details about an object: all of its version metadata, but no state
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ObjectDetails {
    pub id: String,
    /// The path from the repository root to the object root
    pub object_root: String,
    pub digest_algorithm: DigestAlgorithm,
    pub head_version_num: VersionNum,
    pub versions: BTreeMap<VersionNum, VersionDetails>,
}

impl ObjectDetails {
    /// Creates `ObjectDetails` by consuming the `Inventory`
    pub fn from_inventory(inventory: Inventory) -> Self {
        let mut versions = BTreeMap::new();

        let id = inventory.id;
        let object_root = inventory.object_root;
        let digest_algorithm = inventory.digest_algorithm;
        let head_version_num = inventory.head;

        for (num, version) in inventory.versions {
            versions.insert(num, VersionDetails::from_version(num, version));
        }

        Self {
            id,
            object_root,
            digest_algorithm,
            head_version_num,
            versions,
        }
    }

    /// Returns the details of the head version
    pub fn head_version(&self) -> &VersionDetails {
        // the head version is validated to exist when the inventory is loaded
        self.versions.get(&self.head_version_num).unwrap()
    }
}

/// Details about a file in an OCFL object
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct FileDetails {
    /// The file's digest
    pub digest: Arc<HexDigest>,
    /// The digest algorithm
    pub digest_algorithm: DigestAlgorithm,
    /// The path to the file relative the object root
    pub content_path: Arc<ContentPath>,
    /// The storage key of the file relative the repository root
    pub storage_path: String,
    /// The version metadata for when the file was last updated
    pub last_update: Arc<VersionDetails>,
}

/// Represents a version of an OCFL object with its full file state
#[derive(Debug, Clone)]
pub struct ObjectVersion {
    pub id: String,
    /// The path from the repository root to the object root
    pub object_root: String,
    pub digest_algorithm: DigestAlgorithm,
    pub version_details: VersionDetails,
    /// Map of logical paths to details about the files in the version
    pub state: HashMap<Arc<LogicalPath>, FileDetails>,
}

impl ObjectVersion {
    /// Creates an `ObjectVersion` by consuming the supplied `Inventory`.
    pub fn from_inventory(mut inventory: Inventory, version_num: VersionRef) -> Result<Self> {
        let version_num = version_num.resolve(inventory.head);

        let version = inventory.get_version(version_num)?;
        let version_details = VersionDetails::new(version_num, version);

        let state = ObjectVersion::construct_state(version_num, &mut inventory)?;

        Ok(Self {
            id: inventory.id,
            object_root: inventory.object_root,
            digest_algorithm: inventory.digest_algorithm,
            version_details,
            state,
        })
    }

    /// Walks versions backwards from the target version to determine, for every logical
    /// path, the version in which the file was last changed.
    fn construct_state(
        target: VersionNum,
        inventory: &mut Inventory,
    ) -> Result<HashMap<Arc<LogicalPath>, FileDetails>> {
        let mut state = HashMap::new();

        let mut current_version_num = target;
        let mut current_version = inventory.remove_version(target)?;
        let mut target_path_map = current_version.remove_state();

        while !target_path_map.is_empty() {
            let mut not_found = crate::inventory::DigestIndex::new();
            let version_details = Arc::new(VersionDetails::from_version(
                current_version_num,
                current_version,
            ));

            // No versions left to compare to; any remaining files were last updated here
            if version_details.version_num.number == 1 {
                for (target_path, target_digest) in target_path_map {
                    let file_details = inventory.file_details(
                        &target_digest,
                        current_version_num,
                        &target_path,
                        version_details.clone(),
                    )?;
                    state.insert(target_path, file_details);
                }

                break;
            }

            let previous_version_num = version_details.version_num.previous()?;
            let mut previous_version = inventory.remove_version(previous_version_num)?;
            let mut previous_path_map = previous_version.remove_state();

            for (target_path, target_digest) in target_path_map {
                let entry = previous_path_map.unbind(&target_path);

                if entry.is_none() || entry.unwrap().1 != target_digest {
                    let file_details = inventory.file_details(
                        &target_digest,
                        current_version_num,
                        &target_path,
                        version_details.clone(),
                    )?;
                    state.insert(target_path, file_details);
                } else {
                    not_found.bind(target_digest, target_path);
                }
            }

            current_version_num = previous_version_num;
            current_version = previous_version;

            target_path_map = not_found;
        }

        Ok(state)
    }
}

/// The kind of change that happened to a file in a version
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum FileChangeType {
    Update,
    Remove,
}

/// A change to a single logical path in a single version
#[derive(Debug, Clone)]
pub struct FileChange {
    pub change_type: FileChangeType,
    pub path: Arc<LogicalPath>,
    /// The content path the logical path resolved to; None for removes
    pub content_path: Option<Arc<ContentPath>>,
    /// The digest of the file; None for removes
    pub digest: Option<Arc<HexDigest>>,
    pub version_details: VersionDetails,
}

/// Represents a change to a file between two versions
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Diff {
    Added(Arc<LogicalPath>),
    Modified(Arc<LogicalPath>),
    Deleted(Arc<LogicalPath>),
    Renamed {
        original: Vec<Arc<LogicalPath>>,
        renamed: Vec<Arc<LogicalPath>>,
    },
}

impl Diff {
    /// This method returns the path associated with the diff. If there are multiple
    /// paths, it is the first path on the left hand side.
    pub fn path(&self) -> &Arc<LogicalPath> {
        match self {
            Diff::Added(path) => path,
            Diff::Modified(path) => path,
            Diff::Deleted(path) => path,
            Diff::Renamed { original, .. } => original
                .first()
                .expect("At least one renamed path should have existed"),
        }
    }
}
