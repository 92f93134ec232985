//! OCFL storage layout extension implementations

use std::borrow::Cow;

use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as EnumDisplay, EnumString};

use crate::consts::{
    EXTENSIONS_DIR, FLAT_LAYOUT_EXTENSION, FLAT_OMIT_PREFIX_LAYOUT_EXTENSION,
    HASHED_NTUPLE_LAYOUT_EXTENSION, NTUPLE_OMIT_PREFIX_LAYOUT_EXTENSION,
};
use crate::digest::DigestAlgorithm;
use crate::error::{OcflError, Result};

/// The storage layout maps object IDs to locations within the storage root
#[derive(Debug)]
pub struct StorageLayout {
    extension: LayoutExtension,
}

/// Enum of known storage layout extensions
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumDisplay)]
pub enum LayoutExtensionName {
    #[strum(serialize = "0006-flat-layout")]
    #[serde(rename = "0006-flat-layout")]
    FlatLayout,
    #[strum(serialize = "0006-flat-omit-prefix-storage-layout")]
    #[serde(rename = "0006-flat-omit-prefix-storage-layout")]
    FlatOmitPrefixLayout,
    #[strum(serialize = "0003-hashed-n-tuple-trees")]
    #[serde(rename = "0003-hashed-n-tuple-trees")]
    HashedNTupleLayout,
    #[strum(serialize = "0007-n-tuple-omit-prefix-storage-layout")]
    #[serde(rename = "0007-n-tuple-omit-prefix-storage-layout")]
    NTupleOmitPrefixLayout,
}

impl LayoutExtensionName {
    pub fn as_extension_str(&self) -> &'static str {
        match self {
            LayoutExtensionName::FlatLayout => FLAT_LAYOUT_EXTENSION,
            LayoutExtensionName::FlatOmitPrefixLayout => FLAT_OMIT_PREFIX_LAYOUT_EXTENSION,
            LayoutExtensionName::HashedNTupleLayout => HASHED_NTUPLE_LAYOUT_EXTENSION,
            LayoutExtensionName::NTupleOmitPrefixLayout => NTUPLE_OMIT_PREFIX_LAYOUT_EXTENSION,
        }
    }
}

impl StorageLayout {
    /// Creates a layout from its extension name and optional serialized configuration.
    /// Configuration is validated once here and immutable afterwards.
    pub fn new(name: LayoutExtensionName, config_bytes: Option<&[u8]>) -> Result<Self> {
        let attempt = || -> Result<LayoutExtension> {
            match name {
                LayoutExtensionName::FlatLayout => {
                    Ok(FlatLayoutExtension::new(config_bytes)?.into())
                }
                LayoutExtensionName::FlatOmitPrefixLayout => {
                    Ok(FlatOmitPrefixLayoutExtension::new(config_bytes)?.into())
                }
                LayoutExtensionName::HashedNTupleLayout => {
                    Ok(HashedNTupleLayoutExtension::new(config_bytes)?.into())
                }
                LayoutExtensionName::NTupleOmitPrefixLayout => {
                    Ok(NTupleOmitPrefixLayoutExtension::new(config_bytes)?.into())
                }
            }
        };

        match attempt() {
            Ok(extension) => Ok(StorageLayout { extension }),
            Err(e) => Err(OcflError::InvalidConfiguration(format!(
                "Failed to parse layout config: {}",
                e
            ))),
        }
    }

    /// Maps an object ID to an object root directory. The mapping is pure and
    /// deterministic; ids the layout cannot express are rejected with `InvalidValue`.
    pub fn map_object_id(&self, object_id: &str) -> Result<String> {
        self.extension.map_object_id(object_id)
    }

    /// Returns the extension name of the layout extension in use
    pub fn extension_name(&self) -> LayoutExtensionName {
        match &self.extension {
            LayoutExtension::Flat(ext) => ext.config.extension_name,
            LayoutExtension::FlatOmitPrefix(ext) => ext.config.extension_name,
            LayoutExtension::HashedNTuple(ext) => ext.config.extension_name,
            LayoutExtension::NTupleOmitPrefix(ext) => ext.config.extension_name,
        }
    }

    /// Serializes the layout's configuration to JSON
    pub fn serialize(&self) -> Result<Vec<u8>> {
        match &self.extension {
            LayoutExtension::Flat(ext) => Ok(serde_json::to_vec_pretty(&ext.config)?),
            LayoutExtension::FlatOmitPrefix(ext) => Ok(serde_json::to_vec_pretty(&ext.config)?),
            LayoutExtension::HashedNTuple(ext) => Ok(serde_json::to_vec_pretty(&ext.config)?),
            LayoutExtension::NTupleOmitPrefix(ext) => Ok(serde_json::to_vec_pretty(&ext.config)?),
        }
    }
}

impl PartialEq for StorageLayout {
    fn eq(&self, other: &Self) -> bool {
        self.extension_name() == other.extension_name()
            && match (self.serialize(), other.serialize()) {
                (Ok(left), Ok(right)) => left == right,
                _ => false,
            }
    }
}

#[enum_dispatch]
trait MapObjectId {
    fn map_object_id(&self, object_id: &str) -> Result<String>;
}

#[enum_dispatch(MapObjectId)]
#[derive(Debug)]
enum LayoutExtension {
    Flat(FlatLayoutExtension),
    FlatOmitPrefix(FlatOmitPrefixLayoutExtension),
    HashedNTuple(HashedNTupleLayoutExtension),
    NTupleOmitPrefix(NTupleOmitPrefixLayoutExtension),
}

/// Flat layout: object ids map directly to object root directories
#[derive(Debug)]
struct FlatLayoutExtension {
    config: FlatLayoutConfig,
}

/// Flat omit prefix layout: the id's prefix is dropped and the remainder maps directly
/// to the object root directory
#[derive(Debug)]
struct FlatOmitPrefixLayoutExtension {
    config: FlatOmitPrefixLayoutConfig,
    case_matters: bool,
    normalized_delimiter: String,
}

/// Hashed n-tuple layout: object ids are hashed and divided into tuples to create a
/// pair-tree like structure
#[derive(Debug)]
struct HashedNTupleLayoutExtension {
    config: HashedNTupleLayoutConfig,
}

/// N-tuple omit prefix layout: the id's prefix is dropped and the remainder is divided
/// into tuples, ending with the remainder as the encapsulation directory
#[derive(Debug)]
struct NTupleOmitPrefixLayoutExtension {
    config: NTupleOmitPrefixLayoutConfig,
    case_matters: bool,
    normalized_delimiter: String,
    width: usize,
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase", default)]
struct FlatLayoutConfig {
    extension_name: LayoutExtensionName,
}

impl Default for FlatLayoutConfig {
    fn default() -> Self {
        Self {
            extension_name: LayoutExtensionName::FlatLayout,
        }
    }
}

impl FlatLayoutConfig {
    fn validate(&self) -> Result<()> {
        validate_extension_name(LayoutExtensionName::FlatLayout, self.extension_name)
    }
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FlatOmitPrefixLayoutConfig {
    extension_name: LayoutExtensionName,
    delimiter: String,
}

impl FlatOmitPrefixLayoutConfig {
    fn validate(&self) -> Result<()> {
        validate_extension_name(
            LayoutExtensionName::FlatOmitPrefixLayout,
            self.extension_name,
        )?;

        if self.delimiter.is_empty() {
            return Err(OcflError::InvalidConfiguration(
                "delimiter was empty but it must be non-empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase", default)]
struct HashedNTupleLayoutConfig {
    extension_name: LayoutExtensionName,

    #[serde(default = "default_algorithm")]
    digest_algorithm: DigestAlgorithm,

    #[serde(default = "default_tuple")]
    tuple_size: usize,

    #[serde(default = "default_tuple")]
    number_of_tuples: usize,

    #[serde(default = "default_short_root")]
    short_object_root: bool,
}

impl Default for HashedNTupleLayoutConfig {
    fn default() -> Self {
        Self {
            extension_name: LayoutExtensionName::HashedNTupleLayout,
            digest_algorithm: DigestAlgorithm::Sha256,
            tuple_size: 3,
            number_of_tuples: 3,
            short_object_root: false,
        }
    }
}

impl HashedNTupleLayoutConfig {
    fn validate(&self) -> Result<()> {
        validate_extension_name(LayoutExtensionName::HashedNTupleLayout, self.extension_name)?;
        validate_tuple_config(self.tuple_size, self.number_of_tuples)?;

        let digest_len = self.digest_algorithm.hex_len();
        let total_tuples_length = self.tuple_size * self.number_of_tuples;

        if digest_len < total_tuples_length {
            return Err(OcflError::InvalidConfiguration(format!(
                "tupleSize={} and numberOfTuples={} requires a minimum of {} characters. \
                 The digest algorithm {} only produces {}.",
                self.tuple_size,
                self.number_of_tuples,
                total_tuples_length,
                self.digest_algorithm,
                digest_len
            )));
        }

        if self.short_object_root && digest_len == total_tuples_length {
            return Err(OcflError::InvalidConfiguration(format!(
                "shortObjectRoot cannot be true when tupleSize={} and numberOfTuples={} \
                 consume the entire {} character digest.",
                self.tuple_size, self.number_of_tuples, digest_len
            )));
        }

        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumDisplay)]
enum Padding {
    #[strum(serialize = "left")]
    #[serde(rename = "left")]
    Left,
    #[strum(serialize = "right")]
    #[serde(rename = "right")]
    Right,
    #[strum(serialize = "none")]
    #[serde(rename = "none")]
    None,
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct NTupleOmitPrefixLayoutConfig {
    extension_name: LayoutExtensionName,
    delimiter: String,

    #[serde(default = "default_tuple")]
    tuple_size: usize,

    #[serde(default = "default_tuple")]
    number_of_tuples: usize,

    #[serde(default = "default_padding")]
    zero_padding: Padding,

    #[serde(default = "default_reverse")]
    reverse_object_root: bool,
}

impl NTupleOmitPrefixLayoutConfig {
    fn validate(&self) -> Result<()> {
        validate_extension_name(
            LayoutExtensionName::NTupleOmitPrefixLayout,
            self.extension_name,
        )?;

        if self.delimiter.is_empty() {
            return Err(OcflError::InvalidConfiguration(
                "delimiter was empty but it must be non-empty".to_string(),
            ));
        }

        if self.tuple_size < 1 || self.tuple_size > 32 {
            return Err(OcflError::InvalidConfiguration(format!(
                "tupleSize must be between 1 and 32, inclusive, but was {}.",
                self.tuple_size
            )));
        }

        if self.number_of_tuples < 1 || self.number_of_tuples > 32 {
            return Err(OcflError::InvalidConfiguration(format!(
                "numberOfTuples must be between 1 and 32, inclusive, but was {}.",
                self.number_of_tuples
            )));
        }

        Ok(())
    }
}

impl FlatLayoutExtension {
    fn new(config_bytes: Option<&[u8]>) -> Result<Self> {
        let config = match config_bytes {
            Some(config_bytes) => {
                let config: FlatLayoutConfig = serde_json::from_slice(config_bytes)?;
                config.validate()?;
                config
            }
            None => FlatLayoutConfig::default(),
        };

        Ok(Self { config })
    }
}

/// One-to-one mapping from object ID to object root path
impl MapObjectId for FlatLayoutExtension {
    fn map_object_id(&self, object_id: &str) -> Result<String> {
        if object_id.contains('/') {
            return Err(OcflError::InvalidValue(format!(
                "The id '{}' cannot be mapped to a storage path by layout {} because it \
                 contains the path separator '/'",
                object_id, self.config.extension_name
            )));
        }

        Ok(object_id.to_string())
    }
}

impl FlatOmitPrefixLayoutExtension {
    fn new(config_bytes: Option<&[u8]>) -> Result<Self> {
        let config = match config_bytes {
            Some(config_bytes) => {
                let config: FlatOmitPrefixLayoutConfig = serde_json::from_slice(config_bytes)?;
                config.validate()?;
                config
            }
            None => {
                return Err(OcflError::InvalidConfiguration(
                    "Storage layout extension configuration must be specified".to_string(),
                ))
            }
        };

        let case_matters = config.delimiter.to_lowercase() != config.delimiter.to_uppercase();

        let normalized_delimiter = if case_matters {
            config.delimiter.to_lowercase()
        } else {
            config.delimiter.clone()
        };

        Ok(Self {
            config,
            case_matters,
            normalized_delimiter,
        })
    }
}

/// Object IDs have a prefix removed and the remaining part is returned
impl MapObjectId for FlatOmitPrefixLayoutExtension {
    fn map_object_id(&self, object_id: &str) -> Result<String> {
        let test_id = if self.case_matters {
            Cow::Owned(object_id.to_lowercase())
        } else {
            Cow::Borrowed(object_id)
        };

        let mapped = match test_id.rfind(&self.normalized_delimiter) {
            None => object_id.to_string(),
            Some(index) => object_id[index + self.normalized_delimiter.len()..].to_string(),
        };

        if mapped.is_empty() {
            return Err(OcflError::InvalidValue(format!(
                "The id '{}' cannot be mapped to a storage path by layout {} because \
                 nothing remains after removing the prefix ending with '{}'",
                object_id, self.config.extension_name, self.config.delimiter
            )));
        }

        if mapped == EXTENSIONS_DIR {
            return Err(OcflError::InvalidValue(format!(
                "The id '{}' cannot be mapped to a storage path by layout {} because it \
                 maps to the reserved directory '{}'",
                object_id, self.config.extension_name, EXTENSIONS_DIR
            )));
        }

        Ok(mapped)
    }
}

impl HashedNTupleLayoutExtension {
    fn new(config_bytes: Option<&[u8]>) -> Result<Self> {
        let config = match config_bytes {
            Some(config_bytes) => {
                let config: HashedNTupleLayoutConfig = serde_json::from_slice(config_bytes)?;
                config.validate()?;
                config
            }
            None => HashedNTupleLayoutConfig::default(),
        };

        Ok(Self { config })
    }
}

/// Object IDs are hashed and then divided into tuples to create a pair-tree like layout
impl MapObjectId for HashedNTupleLayoutExtension {
    fn map_object_id(&self, object_id: &str) -> Result<String> {
        let digest: String = self
            .config
            .digest_algorithm
            .hash_hex(&mut object_id.as_bytes())?
            .into();

        if self.config.tuple_size == 0 {
            return Ok(digest);
        }

        let mut path = to_tuples(
            &digest,
            self.config.tuple_size,
            self.config.number_of_tuples,
        );

        if self.config.short_object_root {
            let start = self.config.tuple_size * self.config.number_of_tuples;
            path.push_str(&digest[start..]);
        } else {
            path.push_str(&digest);
        }

        Ok(path)
    }
}

impl NTupleOmitPrefixLayoutExtension {
    fn new(config_bytes: Option<&[u8]>) -> Result<Self> {
        let config = match config_bytes {
            Some(config_bytes) => {
                let config: NTupleOmitPrefixLayoutConfig = serde_json::from_slice(config_bytes)?;
                config.validate()?;
                config
            }
            None => {
                return Err(OcflError::InvalidConfiguration(
                    "Storage layout extension configuration must be specified".to_string(),
                ))
            }
        };

        let case_matters = config.delimiter.to_lowercase() != config.delimiter.to_uppercase();

        let normalized_delimiter = if case_matters {
            config.delimiter.to_lowercase()
        } else {
            config.delimiter.clone()
        };

        Ok(Self {
            width: config.tuple_size * config.number_of_tuples,
            config,
            case_matters,
            normalized_delimiter,
        })
    }
}

/// Object IDs have a prefix removed and the remaining part turned into an n-tuple tree
/// ending with the remainder as the encapsulation directory
impl MapObjectId for NTupleOmitPrefixLayoutExtension {
    fn map_object_id(&self, object_id: &str) -> Result<String> {
        if !object_id.is_ascii() {
            return Err(OcflError::InvalidValue(format!(
                "The id '{}' cannot be mapped to a storage path by layout {} because it \
                 contains non-ASCII characters",
                object_id, self.config.extension_name
            )));
        }

        let test_id = if self.case_matters {
            Cow::Owned(object_id.to_lowercase())
        } else {
            Cow::Borrowed(object_id)
        };

        let id_part = match test_id.rfind(&self.normalized_delimiter) {
            None => object_id,
            Some(index) => &object_id[index + self.normalized_delimiter.len()..],
        };

        if id_part.is_empty() {
            return Err(OcflError::InvalidValue(format!(
                "The id '{}' cannot be mapped to a storage path by layout {} because \
                 nothing remains after removing the prefix ending with '{}'",
                object_id, self.config.extension_name, self.config.delimiter
            )));
        }

        let mut padded_part = match self.config.zero_padding {
            Padding::Left => format!("{:0>width$}", id_part, width = self.width),
            Padding::Right => format!("{:0<width$}", id_part, width = self.width),
            Padding::None => {
                if id_part.len() < self.width {
                    return Err(OcflError::InvalidValue(format!(
                        "The id '{}' cannot be mapped to a storage path by layout {} \
                         because it is shorter than {} characters and zero padding is \
                         disabled",
                        object_id, self.config.extension_name, self.width
                    )));
                }
                id_part.to_string()
            }
        };

        if self.config.reverse_object_root {
            padded_part = padded_part.chars().rev().collect::<String>()
        }

        let mut path = to_tuples(
            &padded_part,
            self.config.tuple_size,
            self.config.number_of_tuples,
        );

        path.push_str(id_part);
        Ok(path)
    }
}

/// Splits the value into N tuples of M size, joined with a `/`, ending with a trailing `/`
fn to_tuples(value: &str, tuple_size: usize, number_of_tuples: usize) -> String {
    let mut path = String::new();

    for i in 0..number_of_tuples {
        let start = i * tuple_size;
        let end = start + tuple_size;
        path.push_str(&value[start..end]);
        path.push('/');
    }

    path
}

fn validate_extension_name(
    expected: LayoutExtensionName,
    actual: LayoutExtensionName,
) -> Result<()> {
    if actual != expected {
        Err(OcflError::InvalidConfiguration(format!(
            "Expected layout extension name {}; Found: {}",
            expected, actual
        )))
    } else {
        Ok(())
    }
}

fn validate_tuple_config(tuple_size: usize, number_of_tuples: usize) -> Result<()> {
    if (tuple_size == 0 || number_of_tuples == 0) && (tuple_size != 0 || number_of_tuples != 0) {
        Err(OcflError::InvalidConfiguration(format!(
            "If tupleSize (={}) or numberOfTuples (={}) is set to 0, then both must be 0.",
            tuple_size, number_of_tuples
        )))
    } else {
        Ok(())
    }
}

// These functions are needed for serde default values

fn default_tuple() -> usize {
    3
}

fn default_short_root() -> bool {
    false
}

fn default_reverse() -> bool {
    false
}

fn default_algorithm() -> DigestAlgorithm {
    DigestAlgorithm::Sha256
}

fn default_padding() -> Padding {
    Padding::Left
}
