//! Structural and content validation of stored objects, catalogued by OCFL error and
//! warning codes.

use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;
use std::io;

use log::info;
use strum_macros::Display as EnumDisplay;

use crate::consts::{
    INVENTORY_FILE, INVENTORY_TYPE, MUTABLE_HEAD_EXTENSION, OBJECT_NAMASTE_CONTENT,
    SUPPORTED_EXTENSIONS,
};
use crate::digest::{DigestAlgorithm, HexDigest, MultiDigestWriter};
use crate::error::{OcflError, Result};
use crate::inventory::{validate_content_dir, Inventory};
use crate::paths;
use crate::store::StorageDriver;
use crate::types::InventoryPath;

/// OCFL validation error codes
#[allow(dead_code)]
#[derive(Debug, EnumDisplay, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    E001,
    E002,
    E003,
    E004,
    E005,
    E006,
    E007,
    E008,
    E009,
    E010,
    E011,
    E012,
    E013,
    E014,
    E015,
    E016,
    E017,
    E018,
    E019,
    E020,
    E021,
    E022,
    E023,
    E024,
    E025,
    E026,
    E027,
    E028,
    E029,
    E030,
    E031,
    E032,
    E033,
    E034,
    E035,
    E036,
    E037,
    E038,
    E039,
    E040,
    E041,
    E042,
    E043,
    E044,
    E045,
    E046,
    E047,
    E048,
    E049,
    E050,
    E051,
    E052,
    E053,
    E054,
    E055,
    E056,
    E057,
    E058,
    E059,
    E060,
    E061,
    E062,
    E063,
    E064,
    E066,
    E067,
    E068,
    E069,
    E070,
    E071,
    E072,
    E073,
    E074,
    E075,
    E076,
    E077,
    E078,
    E079,
    E080,
    E081,
    E082,
    E083,
    E084,
    E085,
    E086,
    E087,
    E088,
    E089,
    E090,
    E091,
    E092,
    E093,
    E094,
    E095,
    E096,
    E097,
    E098,
    E099,
    E100,
    E101,
}

/// OCFL validation warning codes
#[allow(dead_code)]
#[derive(Debug, EnumDisplay, Copy, Clone, PartialEq, Eq)]
pub enum WarnCode {
    W001,
    W002,
    W003,
    W004,
    W005,
    W006,
    W007,
    W008,
    W009,
    W010,
    W011,
    W012,
    W013,
    W014,
    W015,
}

#[derive(Debug)]
pub struct ValidationError {
    /// The version the problem was found in; `root` for the object root
    pub location: Option<String>,
    pub code: ErrorCode,
    pub text: String,
}

#[derive(Debug)]
pub struct ValidationWarning {
    pub location: Option<String>,
    pub code: WarnCode,
    pub text: String,
}

/// The outcome of deep validation: problems are enumerated rather than raised. Only
/// catastrophic I/O failures surface as errors.
#[derive(Debug, Default)]
pub struct ObjectValidationResult {
    pub object_id: Option<String>,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ObjectValidationResult {
    pub fn new(object_id: Option<&str>) -> Self {
        Self {
            object_id: object_id.map(|id| id.to_string()),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, location: Option<&str>, code: ErrorCode, text: String) {
        self.errors.push(ValidationError {
            location: location.map(|l| l.to_string()),
            code,
            text,
        });
    }

    pub fn warn(&mut self, location: Option<&str>, code: WarnCode, text: String) {
        self.warnings.push(ValidationWarning {
            location: location.map(|l| l.to_string()),
            code,
            text,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Spot checks an inventory before it is committed. The checks mirror the schema
/// portion of deep validation; the first problem found is surfaced as a
/// `CorruptObject` error.
pub fn shallow_validate(inventory: &Inventory) -> Result<()> {
    let mut result = ObjectValidationResult::new(Some(&inventory.id));
    check_inventory(inventory, None, &mut result);

    if let Some(error) = result.errors.first() {
        return Err(OcflError::CorruptObject {
            object_id: inventory.id.clone(),
            message: format!("{}: {}", error.code, error.text),
        });
    }

    Ok(())
}

/// Schema-level checks against a parsed inventory. Problems are recorded at the given
/// location.
pub fn check_inventory(
    inventory: &Inventory,
    location: Option<&str>,
    result: &mut ObjectValidationResult,
) {
    if inventory.id.trim().is_empty() {
        result.error(
            location,
            ErrorCode::E036,
            "Inventory field 'id' must not be blank".to_string(),
        );
    } else if uriparse::URI::try_from(inventory.id.as_str()).is_err() {
        result.warn(
            location,
            WarnCode::W005,
            format!("Inventory field 'id' should be a URI. Found: {}", inventory.id),
        );
    }

    if inventory.type_declaration != INVENTORY_TYPE {
        result.error(
            location,
            ErrorCode::E038,
            format!(
                "Inventory field 'type' must equal '{}'. Found: {}",
                INVENTORY_TYPE, inventory.type_declaration
            ),
        );
    }

    if !inventory.digest_algorithm.is_content_algorithm() {
        result.error(
            location,
            ErrorCode::E025,
            format!(
                "Inventory field 'digestAlgorithm' must be sha512 or sha256. Found: {}",
                inventory.digest_algorithm
            ),
        );
    } else if inventory.digest_algorithm == DigestAlgorithm::Sha256 {
        result.warn(
            location,
            WarnCode::W004,
            "Inventory field 'digestAlgorithm' should be sha512".to_string(),
        );
    }

    if let Some(content_dir) = &inventory.content_directory {
        if validate_content_dir(content_dir).is_err() {
            result.error(
                location,
                ErrorCode::E017,
                format!(
                    "Inventory field 'contentDirectory' cannot equal '.' or '..' and \
                     cannot contain a '/'. Found: {}",
                    content_dir
                ),
            );
        }
    }

    check_versions(inventory, location, result);
    check_manifest(inventory, location, result);
    check_fixity(inventory, location, result);
}

fn check_versions(
    inventory: &Inventory,
    location: Option<&str>,
    result: &mut ObjectValidationResult,
) {
    if inventory.versions.is_empty() {
        result.error(
            location,
            ErrorCode::E008,
            "Inventory must contain at least one version".to_string(),
        );
        return;
    }

    if !inventory.versions.contains_key(&inventory.head) {
        result.error(
            location,
            ErrorCode::E040,
            format!(
                "Inventory field 'head' references version {} but it does not exist",
                inventory.head
            ),
        );
    }

    let highest = *inventory.versions.keys().next_back().unwrap();
    if highest != inventory.head {
        result.error(
            location,
            ErrorCode::E040,
            format!(
                "Inventory field 'head' must reference the highest version. \
                 Expected: {}; Found: {}",
                highest, inventory.head
            ),
        );
    }

    let width = inventory.head.width;
    let mut expected = 1;

    for num in inventory.versions.keys() {
        if num.number != expected {
            result.error(
                location,
                ErrorCode::E010,
                format!(
                    "Inventory versions must be a dense sequence starting at v1. \
                     Missing: version {}",
                    expected
                ),
            );
        }
        if num.width != width {
            result.error(
                location,
                ErrorCode::E012,
                format!(
                    "Inventory version numbers must be consistently padded. \
                     Found: {}",
                    num
                ),
            );
        }
        expected = num.number + 1;
    }

    if width > 0 {
        result.warn(
            location,
            WarnCode::W001,
            "Inventory version numbers should not be zero-padded".to_string(),
        );
    }

    for (num, version) in &inventory.versions {
        for (_, digest) in version.state_iter() {
            if !inventory.contains_digest(digest) {
                result.error(
                    location,
                    ErrorCode::E050,
                    format!(
                        "Version {} state contains digest {} that is not present in \
                         the manifest",
                        num, digest
                    ),
                );
            }
        }

        if let Some(user) = &version.user {
            match &user.name {
                Some(_) => (),
                None => result.error(
                    location,
                    ErrorCode::E054,
                    format!("Version {} user is missing a name", num),
                ),
            }

            match &user.address {
                Some(address) => {
                    if uriparse::URI::try_from(address.as_str()).is_err() {
                        result.warn(
                            location,
                            WarnCode::W009,
                            format!(
                                "Version {} user address should be a URI. Found: {}",
                                num, address
                            ),
                        );
                    }
                }
                None => result.warn(
                    location,
                    WarnCode::W008,
                    format!("Version {} user is missing an address", num),
                ),
            }
        }

        if version.message.is_none() {
            result.warn(
                location,
                WarnCode::W007,
                format!("Version {} is missing a message", num),
            );
        }
    }
}

fn check_manifest(
    inventory: &Inventory,
    location: Option<&str>,
    result: &mut ObjectValidationResult,
) {
    let expected_len = inventory.digest_algorithm.hex_len();
    let mut paths: Vec<&str> = Vec::new();

    for (digest, digest_paths) in inventory.manifest().digests() {
        if !digest.is_valid_hex() || digest.len() != expected_len {
            result.error(
                location,
                ErrorCode::E096,
                format!(
                    "Manifest digest {} is not a valid {} digest",
                    digest, inventory.digest_algorithm
                ),
            );
        }

        for path in digest_paths {
            paths.push(path.as_str());
        }
    }

    check_non_conflicting(&paths, location, ErrorCode::E101, "Manifest", result);
}

fn check_fixity(
    inventory: &Inventory,
    location: Option<&str>,
    result: &mut ObjectValidationResult,
) {
    let fixity = match &inventory.fixity {
        Some(fixity) => fixity,
        None => return,
    };

    for (algorithm, digests) in fixity {
        for paths in digests.values() {
            for path in paths {
                let content_path = match crate::types::ContentPath::try_from(path.as_str()) {
                    Ok(content_path) => content_path,
                    Err(_) => {
                        result.error(
                            location,
                            ErrorCode::E100,
                            format!("Fixity block contains an invalid content path: {}", path),
                        );
                        continue;
                    }
                };

                if !inventory.contains_content_path(&content_path) {
                    result.error(
                        location,
                        ErrorCode::E057,
                        format!(
                            "Fixity block ({}) references content path {} that is not \
                             present in the manifest",
                            algorithm, path
                        ),
                    );
                }
            }
        }
    }
}

/// Paths conflict when one path is used as both a file and a directory prefix of
/// another
fn check_non_conflicting(
    paths: &[&str],
    location: Option<&str>,
    code: ErrorCode,
    context: &str,
    result: &mut ObjectValidationResult,
) {
    let mut dirs: HashSet<String> = HashSet::new();

    for path in paths {
        let mut remaining = *path;
        while let Some(index) = remaining.rfind('/') {
            remaining = &remaining[..index];
            dirs.insert(remaining.to_string());
        }
    }

    for path in paths {
        if dirs.contains(*path) {
            result.error(
                location,
                code,
                format!(
                    "{} path {} conflicts with another path that treats it as a \
                     directory",
                    context, path
                ),
            );
        }
    }
}

/// Deep validation of a stored object
pub struct Validator<'a> {
    driver: &'a dyn StorageDriver,
}

impl<'a> Validator<'a> {
    pub fn new(driver: &'a dyn StorageDriver) -> Self {
        Self { driver }
    }

    /// Validates the object rooted at `object_root`. When `object_id` is known, the
    /// inventory's id must match it. When `fixity_check` is set, the digest of every
    /// content file is recomputed.
    pub fn validate_object(
        &self,
        object_id: Option<&str>,
        object_root: &str,
        fixity_check: bool,
    ) -> Result<ObjectValidationResult> {
        let mut result = ObjectValidationResult::new(object_id);

        let root_listing = self.driver.list_directory(object_root)?;

        if root_listing.is_empty() {
            return match object_id {
                Some(object_id) => Err(crate::error::not_found(object_id, None)),
                None => Err(OcflError::NotFound(format!(
                    "No object found at {}",
                    object_root
                ))),
            };
        }

        info!("Validating object at {}", object_root);

        self.check_namaste(object_root, &root_listing.objects, &mut result);

        let inventory = self.check_root_inventory(
            object_id,
            object_root,
            &root_listing.objects,
            &mut result,
        )?;

        if let Some(inventory) = &inventory {
            self.check_version_dirs(object_root, inventory, fixity_check, &mut result)?;
            self.check_content_files(object_root, inventory, fixity_check, &mut result)?;
        }

        self.check_extensions(object_root, &mut result)?;

        Ok(result)
    }

    fn check_namaste(
        &self,
        object_root: &str,
        root_objects: &[String],
        result: &mut ObjectValidationResult,
    ) {
        let namaste_key = paths::object_namaste_key(object_root);

        if !root_objects.contains(&namaste_key) {
            result.error(
                Some("root"),
                ErrorCode::E003,
                "Object version declaration does not exist".to_string(),
            );
            return;
        }

        match self.driver.download_string(&namaste_key) {
            Ok(contents) => {
                if contents != OBJECT_NAMASTE_CONTENT {
                    result.error(
                        Some("root"),
                        ErrorCode::E007,
                        format!(
                            "Object version declaration is invalid. Expected: {:?}; Found: {:?}",
                            OBJECT_NAMASTE_CONTENT, contents
                        ),
                    );
                }
            }
            Err(_) => {
                result.error(
                    Some("root"),
                    ErrorCode::E003,
                    "Object version declaration could not be read".to_string(),
                );
            }
        }
    }

    /// Parses and validates the root inventory, its sidecar, and the root/head
    /// inventory identity
    fn check_root_inventory(
        &self,
        object_id: Option<&str>,
        object_root: &str,
        root_objects: &[String],
        result: &mut ObjectValidationResult,
    ) -> Result<Option<Inventory>> {
        let inventory_key = paths::inventory_key(object_root);

        if !root_objects.contains(&inventory_key) {
            result.error(
                Some("root"),
                ErrorCode::E063,
                "Inventory does not exist".to_string(),
            );
            return Ok(None);
        }

        let sidecar_algorithms = sidecar_algorithms(object_root, root_objects);

        let (inventory, digests) =
            self.parse_inventory(&inventory_key, &sidecar_algorithms, Some("root"), result)?;

        let inventory = match inventory {
            Some(inventory) => inventory,
            None => return Ok(None),
        };

        check_inventory(&inventory, Some("root"), result);

        if let Some(object_id) = object_id {
            if inventory.id != object_id {
                result.error(
                    Some("root"),
                    ErrorCode::E083,
                    format!(
                        "Inventory field 'id' should be '{}'. Found: {}",
                        object_id, inventory.id
                    ),
                );
            }
        }

        let algorithm = inventory.digest_algorithm;
        let sidecar_key = paths::sidecar_key(object_root, algorithm);

        if root_objects.contains(&sidecar_key) {
            if let Some(digest) = digests.get(&algorithm) {
                self.check_sidecar(&sidecar_key, digest, Some("root"), result)?;
            }
        } else {
            result.error(
                Some("root"),
                ErrorCode::E058,
                format!(
                    "Inventory sidecar {} does not exist",
                    paths::sidecar_name(algorithm)
                ),
            );
        }

        let mut inventory = inventory;
        inventory.object_root = object_root.to_string();

        Ok(Some(inventory))
    }

    /// Validates each version directory: its inventory agrees with the root
    /// inventory's view of every version it covers, and the head version inventory is
    /// byte-identical to the root inventory.
    fn check_version_dirs(
        &self,
        object_root: &str,
        root_inventory: &Inventory,
        _fixity_check: bool,
        result: &mut ObjectValidationResult,
    ) -> Result<()> {
        let root_digest = self.inventory_digest(
            &paths::inventory_key(object_root),
            root_inventory.digest_algorithm,
        )?;

        for version_num in root_inventory.versions.keys() {
            let version_num = *version_num;
            let location = version_num.to_string();
            let version_key = paths::version_key(object_root, version_num);

            let listing = self.driver.list_directory(&version_key)?;
            if listing.is_empty() {
                result.error(
                    Some(&location),
                    ErrorCode::E010,
                    format!("Version directory {} does not exist", version_num),
                );
                continue;
            }

            let inventory_key = paths::inventory_key(&version_key);
            if !listing.objects.contains(&inventory_key) {
                result.warn(
                    Some(&location),
                    WarnCode::W010,
                    format!("Version {} has no inventory", version_num),
                );
                continue;
            }

            let sidecar_algorithms = sidecar_algorithms(&version_key, &listing.objects);
            let (version_inventory, digests) = self.parse_inventory(
                &inventory_key,
                &sidecar_algorithms,
                Some(&location),
                result,
            )?;

            let version_inventory = match version_inventory {
                Some(inventory) => inventory,
                None => continue,
            };

            check_inventory(&version_inventory, Some(&location), result);

            if version_inventory.head != version_num {
                result.error(
                    Some(&location),
                    ErrorCode::E040,
                    format!(
                        "The inventory in {} must have head {}. Found: {}",
                        version_num, version_num, version_inventory.head
                    ),
                );
            }

            let algorithm = version_inventory.digest_algorithm;
            let sidecar_key = paths::sidecar_key(&version_key, algorithm);
            if listing.objects.contains(&sidecar_key) {
                if let Some(digest) = digests.get(&algorithm) {
                    self.check_sidecar(&sidecar_key, digest, Some(&location), result)?;
                }
            } else {
                result.error(
                    Some(&location),
                    ErrorCode::E058,
                    format!(
                        "Inventory sidecar {} does not exist",
                        paths::sidecar_name(algorithm)
                    ),
                );
            }

            if version_num == root_inventory.head {
                if let Some(digest) = digests.get(&root_inventory.digest_algorithm) {
                    if *digest != root_digest {
                        result.error(
                            Some(&location),
                            ErrorCode::E064,
                            "The root inventory must be identical to the head version's \
                             inventory"
                                .to_string(),
                        );
                    }
                }
            }

            cross_check_states(root_inventory, &version_inventory, &location, result);
        }

        Ok(())
    }

    /// Walks every content file and matches the set against the manifest, optionally
    /// recomputing digests
    fn check_content_files(
        &self,
        object_root: &str,
        inventory: &Inventory,
        fixity_check: bool,
        result: &mut ObjectValidationResult,
    ) -> Result<()> {
        let mut found: HashSet<String> = HashSet::new();

        for version_num in inventory.versions.keys() {
            let version_key = paths::version_key(object_root, *version_num);
            let listing = self.driver.list_directory(&version_key)?;

            for dir in &listing.directories {
                let content_keys = self.driver.list(dir)?;
                let prefix = format!("{}/", object_root);

                for key in content_keys {
                    let content_path = match key.strip_prefix(&prefix) {
                        Some(path) => path.to_string(),
                        None => key.clone(),
                    };
                    found.insert(content_path);
                }
            }
        }

        let content_prefixes: Vec<String> = inventory
            .versions
            .keys()
            .map(|num| format!("{}/{}/", num, inventory.defaulted_content_dir()))
            .collect();

        // Every file on disk must be accounted for in the manifest
        for content_path in &found {
            let in_content_dir = content_prefixes
                .iter()
                .any(|prefix| content_path.starts_with(prefix));

            if !in_content_dir {
                // Files outside the content directory, eg version inventories, are not
                // subject to manifest accounting
                continue;
            }

            match crate::types::ContentPath::try_from(content_path.as_str()) {
                Ok(path) => {
                    if !inventory.contains_content_path(&path) {
                        result.error(
                            None,
                            ErrorCode::E023,
                            format!(
                                "Content file {} is not referenced in the manifest",
                                content_path
                            ),
                        );
                    }
                }
                Err(_) => {
                    result.error(
                        None,
                        ErrorCode::E100,
                        format!("Content file {} is not a valid content path", content_path),
                    );
                }
            }
        }

        // Every manifest entry must exist on disk
        for (digest, manifest_paths) in inventory.manifest().digests() {
            for path in manifest_paths {
                if !found.contains(path.as_str()) {
                    result.error(
                        None,
                        ErrorCode::E092,
                        format!(
                            "Manifest references content path {} that does not exist",
                            path
                        ),
                    );
                    continue;
                }

                if fixity_check {
                    let key = paths::join(object_root, path.as_str());
                    let actual = self.compute_digest(&key, inventory.digest_algorithm)?;

                    if actual != **digest {
                        result.error(
                            None,
                            ErrorCode::E093,
                            format!(
                                "Content file {} does not match its expected digest. \
                                 Expected: {}; Found: {}",
                                path, digest, actual
                            ),
                        );
                    }
                }
            }
        }

        Ok(())
    }

    fn check_extensions(
        &self,
        object_root: &str,
        result: &mut ObjectValidationResult,
    ) -> Result<()> {
        let extensions_key = paths::extensions_key(object_root);
        let listing = self.driver.list_directory(&extensions_key)?;

        for dir in listing.directories {
            let name = dir.rsplit('/').next().unwrap_or(&dir).to_string();
            if !SUPPORTED_EXTENSIONS.contains(&name.as_str()) {
                result.warn(
                    Some("root"),
                    WarnCode::W013,
                    format!("Object extension {} is not registered", name),
                );
            } else if name == MUTABLE_HEAD_EXTENSION {
                result.warn(
                    Some("root"),
                    WarnCode::W013,
                    "Object has an uncommitted mutable HEAD".to_string(),
                );
            }
        }

        Ok(())
    }

    /// Parses an inventory while computing its digest with every candidate algorithm
    fn parse_inventory(
        &self,
        inventory_key: &str,
        algorithms: &[DigestAlgorithm],
        location: Option<&str>,
        result: &mut ObjectValidationResult,
    ) -> Result<(Option<Inventory>, HashMap<DigestAlgorithm, HexDigest>)> {
        let mut writer = MultiDigestWriter::new(algorithms, Vec::new());

        let mut reader = self.driver.download(inventory_key)?;
        io::copy(&mut reader, &mut writer)?;

        let inventory = match serde_json::from_slice::<Inventory>(writer.inner()) {
            Ok(inventory) => Some(inventory),
            Err(e) => {
                result.error(
                    location,
                    ErrorCode::E033,
                    format!("Inventory could not be parsed: {}", e),
                );
                None
            }
        };

        Ok((inventory, writer.finalize_hex()))
    }

    fn check_sidecar(
        &self,
        sidecar_key: &str,
        digest: &HexDigest,
        location: Option<&str>,
        result: &mut ObjectValidationResult,
    ) -> Result<()> {
        let contents = self.driver.download_string(sidecar_key)?;

        let mut parts = contents.split_whitespace();
        let expected = parts.next();
        let filename = parts.next();

        match (expected, filename) {
            (Some(expected), Some(filename)) if filename == INVENTORY_FILE => {
                let expected = HexDigest::from(expected);
                if expected != *digest {
                    result.error(
                        location,
                        ErrorCode::E060,
                        format!(
                            "Inventory does not match its sidecar digest. Expected: {}; \
                             Found: {}",
                            expected, digest
                        ),
                    );
                }
            }
            _ => result.error(
                location,
                ErrorCode::E061,
                "Inventory sidecar is invalid".to_string(),
            ),
        }

        Ok(())
    }

    fn inventory_digest(&self, key: &str, algorithm: DigestAlgorithm) -> Result<HexDigest> {
        self.compute_digest(key, algorithm)
    }

    fn compute_digest(&self, key: &str, algorithm: DigestAlgorithm) -> Result<HexDigest> {
        let mut reader = algorithm.reader(self.driver.download(key)?);
        io::copy(&mut reader, &mut io::sink())?;
        Ok(reader.finalize_hex())
    }
}

/// Extracts the algorithms of every sidecar file present in a directory listing
fn sidecar_algorithms(dir: &str, objects: &[String]) -> Vec<DigestAlgorithm> {
    let prefix = format!("{}.", paths::inventory_key(dir));
    let mut algorithms = Vec::new();

    for key in objects {
        if let Some(algorithm) = key.strip_prefix(&prefix) {
            if let Ok(algorithm) = algorithm.parse::<DigestAlgorithm>() {
                algorithms.push(algorithm);
            }
        }
    }

    algorithms
}

/// The version-N inventory must define states identical to the root inventory's view
/// for every version it covers. When digest algorithms differ between the inventories,
/// states are compared by content path instead of by digest.
fn cross_check_states(
    root_inventory: &Inventory,
    version_inventory: &Inventory,
    location: &str,
    result: &mut ObjectValidationResult,
) {
    let same_algorithm = root_inventory.digest_algorithm == version_inventory.digest_algorithm;

    for (num, version) in &version_inventory.versions {
        let root_version = match root_inventory.versions.get(num) {
            Some(root_version) => root_version,
            None => {
                result.error(
                    Some(location),
                    ErrorCode::E066,
                    format!(
                        "Version inventory defines version {} that the root inventory \
                         does not",
                        num
                    ),
                );
                continue;
            }
        };

        if version.state_len() != root_version.state_len() {
            result.error(
                Some(location),
                ErrorCode::E066,
                format!(
                    "Version {} state does not match the root inventory's state",
                    num
                ),
            );
            continue;
        }

        for (path, digest) in version.state_iter() {
            let consistent = match root_version.lookup_digest(path) {
                None => false,
                Some(root_digest) => {
                    if same_algorithm {
                        root_digest == digest
                    } else {
                        let left = version_inventory.content_path_for_digest(
                            digest,
                            Some(*num),
                            Some(path),
                        );
                        let right = root_inventory.content_path_for_digest(
                            root_digest,
                            Some(*num),
                            Some(path),
                        );

                        match (left, right) {
                            (Ok(left), Ok(right)) => left.as_str() == right.as_str(),
                            _ => false,
                        }
                    }
                }
            };

            if !consistent {
                result.error(
                    Some(location),
                    ErrorCode::E066,
                    format!(
                        "Version {} state for path {} does not match the root \
                         inventory's state",
                        num, path
                    ),
                );
            }
        }
    }
}
