//! Storage key construction. All keys are `/`-delimited and relative the repository
//! root, regardless of platform.

use crate::consts::*;
use crate::digest::DigestAlgorithm;
use crate::types::{RevisionNum, VersionNum};

/// Joins two string path parts, inserting a `/` if needed
pub fn join(part1: &str, part2: &str) -> String {
    let mut joined = match part1.ends_with('/') {
        true => part1[..part1.len() - 1].to_string(),
        false => part1.to_string(),
    };

    if !part2.is_empty() {
        if (!joined.is_empty() || part1 == "/") && !part2.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(part2);
    }

    joined
}

/// Joins two string path parts, inserting a `/` if needed, and appends a trailing `/`
/// if there is not already one
pub fn join_with_trailing_slash(part1: &str, part2: &str) -> String {
    let mut joined = join(part1, part2);

    if !joined.is_empty() && !joined.ends_with('/') {
        joined.push('/');
    }

    joined
}

/// The key of `inventory.json` within the specified directory
pub fn inventory_key(dir: &str) -> String {
    join(dir, INVENTORY_FILE)
}

/// The name of an inventory sidecar file for the specified algorithm
pub fn sidecar_name(algorithm: DigestAlgorithm) -> String {
    format!("{}.{}", INVENTORY_FILE, algorithm)
}

/// The key of `inventory.json.ALGORITHM` within the specified directory
pub fn sidecar_key(dir: &str, algorithm: DigestAlgorithm) -> String {
    join(dir, &sidecar_name(algorithm))
}

/// The key of an object's NAMASTE file
pub fn object_namaste_key(object_root: &str) -> String {
    join(object_root, OBJECT_NAMASTE_FILE)
}

/// The key of a version directory within an object root
pub fn version_key(object_root: &str, version_num: VersionNum) -> String {
    join(object_root, &version_num.to_string())
}

/// The key of a version's content directory
pub fn content_key(object_root: &str, version_num: VersionNum, content_dir: &str) -> String {
    join(&version_key(object_root, version_num), content_dir)
}

/// The key of an object's `extensions` directory
pub fn extensions_key(object_root: &str) -> String {
    join(object_root, EXTENSIONS_DIR)
}

/// The key of an object's mutable HEAD extension directory
pub fn mutable_head_ext_key(object_root: &str) -> String {
    join(object_root, MUTABLE_HEAD_EXT_DIR)
}

/// The key of the directory a mutable HEAD version is staged in
pub fn mutable_head_key(object_root: &str) -> String {
    join(object_root, MUTABLE_HEAD_DIR)
}

/// The key of a mutable HEAD inventory
pub fn mutable_head_inventory_key(object_root: &str) -> String {
    join(object_root, MUTABLE_HEAD_INVENTORY_FILE)
}

/// The key of the directory containing mutable HEAD revision markers
pub fn mutable_head_revisions_key(object_root: &str) -> String {
    join(object_root, MUTABLE_HEAD_REVISIONS_DIR)
}

/// The key of a mutable HEAD revision marker
pub fn revision_marker_key(object_root: &str, revision_num: RevisionNum) -> String {
    join(
        &mutable_head_revisions_key(object_root),
        &revision_num.to_string(),
    )
}

/// The key of the root sidecar snapshot taken when a mutable HEAD is created
pub fn root_sidecar_snapshot_key(object_root: &str, algorithm: DigestAlgorithm) -> String {
    join(
        &mutable_head_ext_key(object_root),
        &format!("{}{}", ROOT_SIDECAR_SNAPSHOT_PREFIX, sidecar_name(algorithm)),
    )
}

/// The key of the repository's `ocfl_layout.json` file
pub fn ocfl_layout_key() -> String {
    OCFL_LAYOUT_FILE.to_string()
}

/// The key of a repository layout extension's config file
pub fn layout_config_key(extension_name: &str) -> String {
    join(&join(EXTENSIONS_DIR, extension_name), EXTENSIONS_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::{join, join_with_trailing_slash};

    #[test]
    fn join_path_when_both_empty() {
        assert_eq!(join("", ""), "");
        assert_eq!(join_with_trailing_slash("", ""), "");
    }

    #[test]
    fn join_path_when_first_empty() {
        assert_eq!(join("", "foo"), "foo");
        assert_eq!(join_with_trailing_slash("", "foo"), "foo/");
    }

    #[test]
    fn join_path_when_second_empty() {
        assert_eq!(join("foo", ""), "foo");
        assert_eq!(join_with_trailing_slash("foo", ""), "foo/");
    }

    #[test]
    fn join_path_when_first_is_only_slash() {
        assert_eq!(join("/", "foo"), "/foo");
        assert_eq!(join_with_trailing_slash("/", "foo"), "/foo/");
    }

    #[test]
    fn join_path_when_first_has_slash() {
        assert_eq!(join("foo/", "bar"), "foo/bar");
        assert_eq!(join_with_trailing_slash("foo/", "bar"), "foo/bar/");
    }

    #[test]
    fn join_path_when_both_no_slashes() {
        assert_eq!(join("foo", "bar"), "foo/bar");
        assert_eq!(join_with_trailing_slash("foo", "bar"), "foo/bar/");
    }
}
