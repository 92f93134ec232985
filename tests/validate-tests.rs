use std::fs;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use ocflkit::{ErrorCode, OcflError, WarnCode};

mod common;

use common::*;

fn object_root(temp: &TempDir) -> std::path::PathBuf {
    repo_root(temp).join(O1_OBJECT_ROOT)
}

fn setup(temp: &TempDir) -> ocflkit::OcflRepo {
    let repo = init_repo(temp);
    let v1 = source_tree(temp, "v1", &[("f1", "one"), ("d/f2", "two")]);
    let v2 = source_tree(temp, "v2", &[("f1", "changed"), ("d/f2", "two")]);
    repo.put_object("o1", &v1, commit_meta()).unwrap();
    repo.put_object("o1", &v2, commit_meta()).unwrap();
    repo
}

#[test]
fn valid_object_has_no_errors() {
    let temp = TempDir::new().unwrap();
    let repo = setup(&temp);

    let result = repo.validate_object("o1", true).unwrap();

    assert!(!result.has_errors(), "{:?}", result.errors);
    // o1 is not a URI
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.code == WarnCode::W005));
}

#[test]
fn validating_missing_object_is_not_found() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    assert!(matches!(
        repo.validate_object("nope", false),
        Err(OcflError::NotFound(_))
    ));
}

#[test]
fn missing_namaste_detected() {
    let temp = TempDir::new().unwrap();
    let repo = setup(&temp);

    fs::remove_file(object_root(&temp).join("0=ocfl_object_1.0")).unwrap();

    let result = repo.validate_object("o1", false).unwrap();

    assert!(result
        .errors
        .iter()
        .any(|error| error.code == ErrorCode::E003));
}

#[test]
fn corrupt_content_file_detected_by_fixity_check() {
    let temp = TempDir::new().unwrap();
    let repo = setup(&temp);

    fs::write(object_root(&temp).join("v1/content/f1"), "tampered").unwrap();

    let clean = repo.validate_object("o1", false).unwrap();
    assert!(!clean.has_errors(), "{:?}", clean.errors);

    let result = repo.validate_object("o1", true).unwrap();
    assert!(result
        .errors
        .iter()
        .any(|error| error.code == ErrorCode::E093));
}

#[test]
fn extra_content_file_detected() {
    let temp = TempDir::new().unwrap();
    let repo = setup(&temp);

    fs::write(object_root(&temp).join("v1/content/sneaky"), "extra").unwrap();

    let result = repo.validate_object("o1", false).unwrap();

    assert!(result
        .errors
        .iter()
        .any(|error| error.code == ErrorCode::E023));
}

#[test]
fn missing_content_file_detected() {
    let temp = TempDir::new().unwrap();
    let repo = setup(&temp);

    fs::remove_file(object_root(&temp).join("v2/content/f1")).unwrap();

    let result = repo.validate_object("o1", false).unwrap();

    assert!(result
        .errors
        .iter()
        .any(|error| error.code == ErrorCode::E092));
}

#[test]
fn tampered_root_inventory_detected() {
    let temp = TempDir::new().unwrap();
    let repo = setup(&temp);

    let inventory_path = object_root(&temp).join("inventory.json");
    let mut contents = fs::read_to_string(&inventory_path).unwrap();
    contents.push(' ');
    fs::write(&inventory_path, contents).unwrap();

    let result = repo.validate_object("o1", false).unwrap();

    // the sidecar no longer matches, and the root copy differs from the head copy
    assert!(result
        .errors
        .iter()
        .any(|error| error.code == ErrorCode::E060 || error.code == ErrorCode::E064));
}

#[test]
fn missing_sidecar_detected() {
    let temp = TempDir::new().unwrap();
    let repo = setup(&temp);

    fs::remove_file(object_root(&temp).join("inventory.json.sha512")).unwrap();

    let result = repo.validate_object("o1", false).unwrap();

    assert!(result
        .errors
        .iter()
        .any(|error| error.code == ErrorCode::E058));
}

#[test]
fn missing_version_directory_detected() {
    let temp = TempDir::new().unwrap();
    let repo = setup(&temp);

    fs::remove_dir_all(object_root(&temp).join("v1")).unwrap();

    let result = repo.validate_object("o1", false).unwrap();

    assert!(result.has_errors());
}

#[test]
fn unknown_extension_warns() {
    let temp = TempDir::new().unwrap();
    let repo = setup(&temp);

    fs::create_dir_all(object_root(&temp).join("extensions/9999-imaginary")).unwrap();

    let result = repo.validate_object("o1", false).unwrap();

    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.code == WarnCode::W013));
}

#[test]
fn version_inventory_disagreement_detected() {
    let temp = TempDir::new().unwrap();
    let repo = setup(&temp);

    // replace v1's inventory with v2's; its v1 state no longer matches nothing, but
    // the inventory now claims a v2 that disagrees structurally with its directory
    let root = object_root(&temp);
    fs::copy(root.join("v2/inventory.json"), root.join("v1/inventory.json")).unwrap();
    fs::copy(
        root.join("v2/inventory.json.sha512"),
        root.join("v1/inventory.json.sha512"),
    )
    .unwrap();

    let result = repo.validate_object("o1", false).unwrap();

    // v1's inventory now declares a different head than its directory implies; at
    // minimum the state cross-check must notice the f1 digest change
    assert!(result.has_errors());
}
