//! Rewrites a mutable HEAD inventory into the inventory of a regular, immutable
//! version.

use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::Arc;

use crate::consts::MUTABLE_HEAD_DIR;
use crate::error::{OcflError, Result};
use crate::inventory::{DigestIndex, Inventory};
use crate::types::{CommitMeta, ContentPath, InventoryPath};

/// Pure function over an inventory: returns a new inventory whose HEAD version has an
/// identical state, but whose manifest and fixity entries that referenced the mutable
/// HEAD staging area now reference the head version directory. Version meta is replaced
/// with the commit meta.
pub fn rewrite_mutable_head(inventory: &Inventory, meta: CommitMeta) -> Result<Inventory> {
    if !inventory.mutable_head {
        return Err(OcflError::IllegalState(format!(
            "Object {} does not have a mutable HEAD to commit",
            inventory.id
        )));
    }

    let mut rewritten = inventory.clone();
    let version_prefix = inventory.head.to_string();

    let mut remapped: HashMap<String, String> = HashMap::new();
    let mut manifest = DigestIndex::with_capacity(inventory.manifest().len());

    for (digest, paths) in inventory.manifest().digests() {
        for path in paths {
            let rewritten_path = match rebase_content_path(path, &version_prefix)? {
                Some(new_path) => {
                    remapped.insert(path.as_str().to_string(), new_path.as_str().to_string());
                    Arc::new(new_path)
                }
                None => path.clone(),
            };
            manifest.bind(digest.clone(), rewritten_path);
        }
    }

    rewritten.set_manifest(manifest);

    if let Some(fixity) = &mut rewritten.fixity {
        for digests in fixity.values_mut() {
            for paths in digests.values_mut() {
                for path in paths.iter_mut() {
                    if let Some(new_path) = remapped.get(path) {
                        *path = new_path.clone();
                    }
                }
            }
        }
    }

    rewritten.mutable_head = false;
    rewritten.revision_num = None;
    rewritten.head_version_mut().update_meta(meta);

    rewritten.validate_shallow()?;

    Ok(rewritten)
}

/// Maps `extensions/0005-mutable-head/head/...` to `vN/...`. Paths outside the mutable
/// HEAD area are returned unchanged as None.
fn rebase_content_path(path: &ContentPath, version_prefix: &str) -> Result<Option<ContentPath>> {
    match path.as_str().strip_prefix(MUTABLE_HEAD_DIR) {
        Some(remainder) => {
            let rebased = format!("{}{}", version_prefix, remainder);
            Ok(Some(ContentPath::try_from(rebased.as_str())?))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use crate::types::{ContentPath, InventoryPath};

    use super::rebase_content_path;

    #[test]
    fn rebases_mutable_head_paths() {
        let path =
            ContentPath::try_from("extensions/0005-mutable-head/head/content/r2/a/b.txt").unwrap();

        let rebased = rebase_content_path(&path, "v4").unwrap().unwrap();

        assert_eq!("v4/content/r2/a/b.txt", rebased.as_str());
    }

    #[test]
    fn leaves_regular_paths_untouched() {
        let path = ContentPath::try_from("v1/content/a.txt").unwrap();

        assert!(rebase_content_path(&path, "v4").unwrap().is_none());
    }
}
