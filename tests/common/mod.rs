#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use assert_fs::TempDir;
use ocflkit::{CommitMeta, LayoutExtensionName, OcflRepo, StorageLayout};
use walkdir::WalkDir;

/// Installs a logger so test failures come with the engine's log output
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn default_layout() -> StorageLayout {
    StorageLayout::new(LayoutExtensionName::HashedNTupleLayout, None).unwrap()
}

pub fn flat_layout() -> StorageLayout {
    StorageLayout::new(LayoutExtensionName::FlatLayout, None).unwrap()
}

pub fn init_repo(temp: &TempDir) -> OcflRepo {
    init_logging();
    OcflRepo::init_fs_repo(repo_root(temp), default_layout()).unwrap()
}

pub fn open_repo(temp: &TempDir) -> OcflRepo {
    OcflRepo::fs_repo(repo_root(temp), None).unwrap()
}

pub fn repo_root(temp: &TempDir) -> PathBuf {
    temp.child("repo").path().to_path_buf()
}

pub fn commit_meta() -> CommitMeta {
    CommitMeta::new()
        .with_user(
            Some("Peter".to_string()),
            Some("mailto:peter@example.com".to_string()),
        )
        .unwrap()
        .with_message(Some("commit message".to_string()))
}

/// Creates a directory tree under the temp dir containing the specified files
pub fn source_tree(temp: &TempDir, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = temp.child(name);
    dir.create_dir_all().unwrap();
    for (path, content) in files {
        dir.child(path).write_str(content).unwrap();
    }
    dir.path().to_path_buf()
}

/// Reads a directory tree into a map of relative forward-slash paths to contents
pub fn read_tree(dir: &Path) -> BTreeMap<String, String> {
    let mut tree = BTreeMap::new();

    for entry in WalkDir::new(dir) {
        let entry = entry.unwrap();
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = pathdiff::diff_paths(entry.path(), dir)
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/");
        let content = fs::read_to_string(entry.path()).unwrap();
        tree.insert(relative, content);
    }

    tree
}

pub fn tree_of(files: &[(&str, &str)]) -> BTreeMap<String, String> {
    files
        .iter()
        .map(|(path, content)| (path.to_string(), content.to_string()))
        .collect()
}

/// The storage path of object `o1` under the default hashed n-tuple layout
pub const O1_OBJECT_ROOT: &str =
    "235/2da/728/2352da7280f1decc3acf1ba84eb945c9fc2b7b541094e1d0992dbffd1b6664cc";
