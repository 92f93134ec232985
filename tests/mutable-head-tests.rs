use std::fs;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use ocflkit::{InventoryPath, OcflError, VersionNum};

mod common;

use common::*;

#[test]
fn staged_changes_promote_to_a_single_version() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("file1", "v1 content")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    let s1 = temp.child("s1");
    s1.write_str("staged one").unwrap();
    let s2 = temp.child("s2");
    s2.write_str("staged two").unwrap();

    repo.stage_changes("o1", commit_meta(), |updater| {
        updater.write_file(s1.path(), "s1.txt", false)?;
        Ok(())
    })
    .unwrap();

    assert!(repo.has_staged_changes("o1").unwrap());

    repo.stage_changes("o1", commit_meta(), |updater| {
        updater.write_file(s2.path(), "s2.txt", false)?;
        Ok(())
    })
    .unwrap();

    let object_root = repo_root(&temp).join(O1_OBJECT_ROOT);
    assert!(object_root
        .join("extensions/0005-mutable-head/head/inventory.json")
        .exists());
    assert!(object_root
        .join("extensions/0005-mutable-head/revisions/r1")
        .exists());
    assert!(object_root
        .join("extensions/0005-mutable-head/revisions/r2")
        .exists());

    repo.commit_staged_changes("o1", commit_meta()).unwrap();

    assert!(!repo.has_staged_changes("o1").unwrap());
    assert!(!object_root.join("extensions").exists());

    // exactly one new version was created
    let details = repo.describe_object("o1").unwrap();
    assert_eq!(VersionNum::new(2), details.head_version_num);

    // no content path references the mutable HEAD area
    let version = repo.describe_version("o1", None).unwrap();
    assert_eq!(3, version.state.len());
    for details in version.state.values() {
        assert!(
            !details.content_path.as_str().starts_with("extensions/"),
            "content path {} is inside the extension area",
            details.content_path
        );
    }

    let out = temp.child("out").path().to_path_buf();
    repo.get_object("o1", None, &out).unwrap();
    assert_eq!(
        tree_of(&[
            ("file1", "v1 content"),
            ("s1.txt", "staged one"),
            ("s2.txt", "staged two"),
        ]),
        read_tree(&out)
    );

    let validation = repo.validate_object("o1", true).unwrap();
    assert!(!validation.has_errors(), "{:?}", validation.errors);
}

#[test]
fn staged_changes_visible_before_commit() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("file1", "v1")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    let staged = temp.child("staged");
    staged.write_str("staged content").unwrap();

    repo.stage_changes("o1", commit_meta(), |updater| {
        updater.write_file(staged.path(), "staged.txt", false)?;
        Ok(())
    })
    .unwrap();

    // the staged version is what loads now
    let version = repo.describe_version("o1", None).unwrap();
    assert_eq!(VersionNum::new(2), version.version_details.version_num);
    assert_eq!(2, version.state.len());

    let staged_details = version
        .state
        .iter()
        .find(|(path, _)| path.as_str() == "staged.txt")
        .map(|(_, details)| details)
        .unwrap();
    assert!(staged_details
        .content_path
        .as_str()
        .starts_with("extensions/0005-mutable-head/head/content/r1/"));
}

#[test]
fn purge_staged_changes_discards_the_mutable_head() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("file1", "v1")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    let staged = temp.child("staged");
    staged.write_str("staged").unwrap();

    repo.stage_changes("o1", commit_meta(), |updater| {
        updater.write_file(staged.path(), "staged.txt", false)?;
        Ok(())
    })
    .unwrap();

    assert!(repo.has_staged_changes("o1").unwrap());

    repo.purge_staged_changes("o1").unwrap();

    assert!(!repo.has_staged_changes("o1").unwrap());

    let details = repo.describe_object("o1").unwrap();
    assert_eq!(VersionNum::new(1), details.head_version_num);

    let validation = repo.validate_object("o1", true).unwrap();
    assert!(!validation.has_errors(), "{:?}", validation.errors);
}

#[test]
fn regular_updates_blocked_while_head_is_staged() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("file1", "v1")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    let staged = temp.child("staged");
    staged.write_str("staged").unwrap();

    repo.stage_changes("o1", commit_meta(), |updater| {
        updater.write_file(staged.path(), "staged.txt", false)?;
        Ok(())
    })
    .unwrap();

    let result = repo.update_object("o1", commit_meta(), |updater| {
        updater.write_file(staged.path(), "other.txt", false)?;
        Ok(())
    });

    assert!(matches!(result, Err(OcflError::IllegalState(_))));

    let result = repo.put_object("o1", &source, commit_meta());
    assert!(matches!(result, Err(OcflError::IllegalState(_))));
}

#[test]
fn new_object_can_be_staged_entirely_in_the_mutable_head() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let staged = temp.child("staged");
    staged.write_str("first bytes").unwrap();

    repo.stage_changes("o1", commit_meta(), |updater| {
        updater.write_file(staged.path(), "f1.txt", false)?;
        Ok(())
    })
    .unwrap();

    assert!(repo.has_staged_changes("o1").unwrap());
    assert!(repo.contains_object("o1").unwrap());

    // no regular version exists yet
    let object_root = repo_root(&temp).join(O1_OBJECT_ROOT);
    assert!(!object_root.join("v1").exists());
    assert!(!object_root.join("inventory.json").exists());

    repo.commit_staged_changes("o1", commit_meta()).unwrap();

    let details = repo.describe_object("o1").unwrap();
    assert_eq!(VersionNum::new(1), details.head_version_num);

    let out = temp.child("out").path().to_path_buf();
    repo.get_object("o1", None, &out).unwrap();
    assert_eq!(tree_of(&[("f1.txt", "first bytes")]), read_tree(&out));

    let validation = repo.validate_object("o1", true).unwrap();
    assert!(!validation.has_errors(), "{:?}", validation.errors);
}

#[test]
fn staged_file_removed_in_later_revision_drops_out_of_state() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("file1", "v1")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    let staged = temp.child("staged");
    staged.write_str("short lived").unwrap();

    repo.stage_changes("o1", commit_meta(), |updater| {
        updater.write_file(staged.path(), "tmp.txt", false)?;
        Ok(())
    })
    .unwrap();

    repo.stage_changes("o1", commit_meta(), |updater| {
        updater.remove_file("tmp.txt")?;
        Ok(())
    })
    .unwrap();

    repo.commit_staged_changes("o1", commit_meta()).unwrap();

    let out = temp.child("out").path().to_path_buf();
    repo.get_object("o1", None, &out).unwrap();
    assert_eq!(tree_of(&[("file1", "v1")]), read_tree(&out));

    let validation = repo.validate_object("o1", true).unwrap();
    assert!(!validation.has_errors(), "{:?}", validation.errors);
}

#[test]
fn concurrent_version_commit_invalidates_the_mutable_head() {
    let temp = TempDir::new().unwrap();
    let repo1 = init_repo(&temp);
    let repo2 = open_repo(&temp);

    let source = source_tree(&temp, "src", &[("file1", "v1")]);
    repo1.put_object("o1", &source, commit_meta()).unwrap();

    let staged = temp.child("staged");
    staged.write_str("staged").unwrap();

    repo1
        .stage_changes("o1", commit_meta(), |updater| {
            updater.write_file(staged.path(), "staged.txt", false)?;
            Ok(())
        })
        .unwrap();

    // an out-of-band writer purges the staged changes and commits a regular version
    repo2.purge_staged_changes("o1").unwrap();
    let other = source_tree(&temp, "other", &[("file1", "v2")]);
    repo2.put_object("o1", &other, commit_meta()).unwrap();

    // committing the stale mutable HEAD must fail
    let result = repo1.commit_staged_changes("o1", commit_meta());

    match result {
        Err(OcflError::ObjectOutOfSync { .. }) | Err(OcflError::IllegalState(_)) => (),
        other => panic!("expected the stale commit to fail, got {:?}", other),
    }
}

#[test]
fn revision_markers_allocate_sequentially() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("file1", "v1")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    let staged = temp.child("staged");
    staged.write_str("staged").unwrap();

    for n in 1..=3 {
        repo.stage_changes("o1", commit_meta(), |updater| {
            updater.write_file(staged.path(), format!("f{}.txt", n).as_str(), false)?;
            Ok(())
        })
        .unwrap();

        let marker = repo_root(&temp)
            .join(O1_OBJECT_ROOT)
            .join("extensions/0005-mutable-head/revisions")
            .join(format!("r{}", n));
        assert!(marker.exists());
    }

    // a marker claimed out-of-band makes the next revision fail
    let marker = repo_root(&temp)
        .join(O1_OBJECT_ROOT)
        .join("extensions/0005-mutable-head/revisions/r4");
    fs::write(&marker, "\n").unwrap();

    let result = repo.stage_changes("o1", commit_meta(), |updater| {
        updater.write_file(staged.path(), "f5.txt", false)?;
        Ok(())
    });

    assert!(matches!(result, Err(OcflError::ObjectOutOfSync { .. })));
}
