use std::fs;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use ocflkit::{
    DigestAlgorithm, FileChangeType, InventoryPath, OcflError, OcflRepo, VersionNum,
};

mod common;

use common::*;

#[test]
fn put_and_get_round_trip() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let files = [
        ("file1", "Test file 1"),
        ("dir1/dir2/file2", "Test file 2"),
    ];
    let source = source_tree(&temp, "src", &files);

    repo.put_object("o1", &source, commit_meta()).unwrap();

    let out = temp.child("out").path().to_path_buf();
    repo.get_object("o1", None, &out).unwrap();

    assert_eq!(tree_of(&files), read_tree(&out));

    let details = repo.describe_object("o1").unwrap();
    assert_eq!(VersionNum::new(1), details.head_version_num);
}

#[test]
fn sequential_puts_create_versions() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let v1_files = [("file1", "one"), ("file2", "two")];
    let v2_files = [("file1", "one"), ("file2", "two changed"), ("file3", "three")];
    let v3_files = [("file2", "two changed again")];

    let v1 = source_tree(&temp, "v1", &v1_files);
    let v2 = source_tree(&temp, "v2", &v2_files);
    let v3 = source_tree(&temp, "v3", &v3_files);

    repo.put_object("o1", &v1, commit_meta()).unwrap();
    repo.put_object("o1", &v2, commit_meta()).unwrap();
    repo.put_object("o1", &v3, commit_meta()).unwrap();

    let details = repo.describe_object("o1").unwrap();
    assert_eq!(VersionNum::new(3), details.head_version_num);
    assert_eq!(3, details.versions.len());

    let out = temp.child("out-v2").path().to_path_buf();
    repo.get_object("o1", Some(VersionNum::new(2)), &out).unwrap();
    assert_eq!(tree_of(&v2_files), read_tree(&out));

    let out = temp.child("out-head").path().to_path_buf();
    repo.get_object("o1", None, &out).unwrap();
    assert_eq!(tree_of(&v3_files), read_tree(&out));
}

#[test]
fn objects_land_at_layout_mapped_paths() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("file1", "content")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    let object_root = repo_root(&temp).join(O1_OBJECT_ROOT);
    assert!(object_root.join("0=ocfl_object_1.0").exists());
    assert!(object_root.join("inventory.json").exists());
    assert!(object_root.join("v1/content/file1").exists());
}

#[test]
fn conflicting_logical_paths_rejected() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("seed", "seed")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    let file1 = temp.child("file1");
    file1.write_str("file1").unwrap();
    let file2 = temp.child("file2");
    file2.write_str("file2").unwrap();

    let result = repo.update_object("o1", commit_meta(), |updater| {
        updater.write_file(file1.path(), "file1", false)?;
        updater.write_file(file2.path(), "file1/file2", false)?;
        Ok(())
    });

    let err = result.unwrap_err();
    assert!(matches!(err, OcflError::PathConstraint(_)));
    assert!(err
        .to_string()
        .contains("file1/file2 conflicts with the existing path file1"));
}

#[test]
fn overwrite_requires_flag() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("file1", "original")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    let replacement = temp.child("replacement");
    replacement.write_str("replaced").unwrap();

    let result = repo.update_object("o1", commit_meta(), |updater| {
        updater.write_file(replacement.path(), "file1", false)?;
        Ok(())
    });

    assert!(matches!(result, Err(OcflError::Overwrite(_))));

    repo.update_object("o1", commit_meta(), |updater| {
        updater.write_file(replacement.path(), "file1", true)?;
        Ok(())
    })
    .unwrap();

    let out = temp.child("out").path().to_path_buf();
    repo.get_object("o1", None, &out).unwrap();
    assert_eq!(tree_of(&[("file1", "replaced")]), read_tree(&out));
}

#[test]
fn bad_fixity_assertion_leaves_repository_unchanged() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("file1", "v1")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    let new_file = temp.child("new-file");
    new_file.write_str("new content").unwrap();

    let result = repo.update_object("o1", commit_meta(), |updater| {
        updater.write_file(new_file.path(), "new", false)?;
        updater.add_file_fixity("new", DigestAlgorithm::Md5, "bogus")?;
        Ok(())
    });

    assert!(matches!(result, Err(OcflError::FixityCheck { .. })));

    let details = repo.describe_object("o1").unwrap();
    assert_eq!(VersionNum::new(1), details.head_version_num);

    let validation = repo.validate_object("o1", true).unwrap();
    assert!(!validation.has_errors(), "{:?}", validation.errors);
}

#[test]
fn stale_writer_detects_concurrent_commit() {
    let temp = TempDir::new().unwrap();
    let repo1 = init_repo(&temp);
    let repo2 = open_repo(&temp);

    let source = source_tree(&temp, "src", &[("file1", "v1")]);
    repo1.put_object("o1", &source, commit_meta()).unwrap();

    let slow = temp.child("slow");
    slow.write_str("slow").unwrap();
    let fast = temp.child("fast");
    fast.write_str("fast").unwrap();

    // repo2 commits while repo1's update is still in flight
    let result = repo1.update_object("o1", commit_meta(), |updater| {
        updater.write_file(slow.path(), "slow.txt", false)?;

        repo2
            .update_object("o1", commit_meta(), |updater2| {
                updater2.write_file(fast.path(), "fast.txt", false)?;
                Ok(())
            })
            .unwrap();

        Ok(())
    });

    match result {
        Err(OcflError::ObjectOutOfSync { .. }) => (),
        other => panic!("expected ObjectOutOfSync, got {:?}", other),
    }

    // only the fast writer's version exists
    let details = repo2.describe_object("o1").unwrap();
    assert_eq!(VersionNum::new(2), details.head_version_num);

    let out = temp.child("out").path().to_path_buf();
    repo2.get_object("o1", None, &out).unwrap();
    assert_eq!(
        tree_of(&[("file1", "v1"), ("fast.txt", "fast")]),
        read_tree(&out)
    );

    let validation = repo2.validate_object("o1", true).unwrap();
    assert!(!validation.has_errors(), "{:?}", validation.errors);
}

#[test]
fn stale_writer_detects_rollback_digest_mismatch() {
    let temp = TempDir::new().unwrap();
    let repo1 = init_repo(&temp);
    let repo2 = open_repo(&temp);

    let v1 = source_tree(&temp, "v1", &[("file1", "one")]);
    let v2 = source_tree(&temp, "v2", &[("file1", "two")]);
    repo1.put_object("o1", &v1, commit_meta()).unwrap();
    repo1.put_object("o1", &v2, commit_meta()).unwrap();

    let mine = temp.child("mine");
    mine.write_str("mine").unwrap();
    let theirs = temp.child("theirs");
    theirs.write_str("theirs").unwrap();

    // While repo1 plans v3, repo2 rewinds the object to v1 and writes a new v2. The
    // v3 directory is free, so the stale writer is caught by the digest check.
    let result = repo1.update_object("o1", commit_meta(), |updater| {
        updater.write_file(mine.path(), "mine.txt", false)?;

        repo2.rollback_to_version("o1", VersionNum::new(1)).unwrap();
        repo2
            .update_object("o1", commit_meta(), |updater2| {
                updater2.write_file(theirs.path(), "theirs.txt", false)?;
                Ok(())
            })
            .unwrap();

        Ok(())
    });

    match result {
        Err(OcflError::ObjectOutOfSync { message, .. }) => {
            assert!(message.contains("digest"), "message: {}", message);
        }
        other => panic!("expected ObjectOutOfSync, got {:?}", other),
    }

    let details = repo2.describe_object("o1").unwrap();
    assert_eq!(VersionNum::new(2), details.head_version_num);

    let out = temp.child("out").path().to_path_buf();
    repo2.get_object("o1", None, &out).unwrap();
    assert_eq!(
        tree_of(&[("file1", "one"), ("theirs.txt", "theirs")]),
        read_tree(&out)
    );
}

#[test]
fn file_change_history_tracks_update_remove_reinstate() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let v1 = source_tree(&temp, "v1", &[("f1", "content A")]);
    repo.put_object("o1", &v1, commit_meta()).unwrap();

    repo.update_object("o1", commit_meta(), |updater| updater.remove_file("f1"))
        .unwrap();

    repo.update_object("o1", commit_meta(), |updater| {
        updater.reinstate_file(VersionNum::new(1), "f1", "f1", false)
    })
    .unwrap();

    let history = repo.file_change_history("o1", "f1").unwrap();

    assert_eq!(3, history.len());

    assert_eq!(FileChangeType::Update, history[0].change_type);
    assert_eq!(
        VersionNum::new(1),
        history[0].version_details.version_num
    );
    assert_eq!(
        "v1/content/f1",
        history[0].content_path.as_ref().unwrap().as_str()
    );

    assert_eq!(FileChangeType::Remove, history[1].change_type);
    assert_eq!(
        VersionNum::new(2),
        history[1].version_details.version_num
    );
    assert!(history[1].content_path.is_none());

    assert_eq!(FileChangeType::Update, history[2].change_type);
    assert_eq!(
        VersionNum::new(3),
        history[2].version_details.version_num
    );
    // the reinstated file points back at the original v1 content
    assert_eq!(
        "v1/content/f1",
        history[2].content_path.as_ref().unwrap().as_str()
    );
}

#[test]
fn file_change_history_unknown_path_not_found() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("f1", "content")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    assert!(matches!(
        repo.file_change_history("o1", "nope"),
        Err(OcflError::NotFound(_))
    ));
}

#[test]
fn root_inventory_identical_to_head_inventory() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let v1 = source_tree(&temp, "v1", &[("f1", "one")]);
    let v2 = source_tree(&temp, "v2", &[("f1", "two")]);
    repo.put_object("o1", &v1, commit_meta()).unwrap();
    repo.put_object("o1", &v2, commit_meta()).unwrap();

    let object_root = repo_root(&temp).join(O1_OBJECT_ROOT);

    let root_inv = fs::read(object_root.join("inventory.json")).unwrap();
    let head_inv = fs::read(object_root.join("v2/inventory.json")).unwrap();
    assert_eq!(root_inv, head_inv);

    let root_sidecar = fs::read_to_string(object_root.join("inventory.json.sha512")).unwrap();
    let head_sidecar =
        fs::read_to_string(object_root.join("v2/inventory.json.sha512")).unwrap();
    assert_eq!(root_sidecar, head_sidecar);

    // sidecar law: the sidecar digest matches the recomputed inventory digest
    let computed = DigestAlgorithm::Sha512
        .hash_hex(&mut root_inv.as_slice())
        .unwrap();
    assert_eq!(
        computed.to_string(),
        root_sidecar.split_whitespace().next().unwrap()
    );
}

#[test]
fn deduplicated_content_stored_once() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(
        &temp,
        "src",
        &[("a.txt", "same bytes"), ("b/copy.txt", "same bytes")],
    );
    repo.put_object("o1", &source, commit_meta()).unwrap();

    let object_root = repo_root(&temp).join(O1_OBJECT_ROOT);
    let mut content_files = Vec::new();
    for entry in walkdir::WalkDir::new(object_root.join("v1/content")) {
        let entry = entry.unwrap();
        if entry.file_type().is_file() {
            content_files.push(entry.path().to_path_buf());
        }
    }

    assert_eq!(1, content_files.len());

    let out = temp.child("out").path().to_path_buf();
    repo.get_object("o1", None, &out).unwrap();
    assert_eq!(
        tree_of(&[("a.txt", "same bytes"), ("b/copy.txt", "same bytes")]),
        read_tree(&out)
    );
}

#[test]
fn describe_version_returns_stable_states() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let v1 = source_tree(&temp, "v1", &[("f1", "one")]);
    let v2 = source_tree(&temp, "v2", &[("f1", "one"), ("f2", "two")]);
    repo.put_object("o1", &v1, commit_meta()).unwrap();
    repo.put_object("o1", &v2, commit_meta()).unwrap();

    let version1 = repo.describe_version("o1", Some(VersionNum::new(1))).unwrap();
    assert_eq!(1, version1.state.len());
    assert_eq!(VersionNum::new(1), version1.version_details.version_num);

    let head = repo.describe_version("o1", None).unwrap();
    assert_eq!(2, head.state.len());
    assert_eq!(VersionNum::new(2), head.version_details.version_num);

    // the carried-forward file was last updated in v1
    let f1 = head
        .state
        .iter()
        .find(|(path, _)| path.as_str() == "f1")
        .map(|(_, details)| details)
        .unwrap();
    assert_eq!(VersionNum::new(1), f1.last_update.version_num);
    assert_eq!("v1/content/f1", f1.content_path.as_str());
}

#[test]
fn object_streams_verify_fixity() {
    use std::io::Read;

    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("f1", "stream me")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    let streams = repo.get_object_streams("o1", None).unwrap();
    assert_eq!(1, streams.logical_paths().len());

    let mut content = String::new();
    streams
        .stream("f1")
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!("stream me", content);

    // corrupt the stored file; the stream must fail at the end of the read
    let object_root = repo_root(&temp).join(O1_OBJECT_ROOT);
    fs::write(object_root.join("v1/content/f1"), "tampered!").unwrap();
    repo.invalidate_cache("o1").unwrap();

    let streams = repo.get_object_streams("o1", None).unwrap();
    let mut content = String::new();
    let result = streams.stream("f1").unwrap().read_to_string(&mut content);
    assert!(result.is_err());
}

#[test]
fn list_object_ids_skips_extensions_and_filters() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("f1", "x")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();
    repo.put_object("o2", &source, commit_meta()).unwrap();
    repo.put_object("other", &source, commit_meta()).unwrap();

    let mut ids: Vec<String> = repo
        .list_object_ids(None)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    ids.sort();
    assert_eq!(vec!["o1", "o2", "other"], ids);

    let mut ids: Vec<String> = repo
        .list_object_ids(Some("o?"))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    ids.sort();
    assert_eq!(vec!["o1", "o2"], ids);
}

#[test]
fn contains_and_purge_object() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("f1", "x")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    assert!(repo.contains_object("o1").unwrap());
    assert!(!repo.contains_object("o2").unwrap());

    repo.purge_object("o1").unwrap();

    assert!(!repo.contains_object("o1").unwrap());
    assert!(matches!(
        repo.describe_object("o1"),
        Err(OcflError::NotFound(_))
    ));

    // purging a nonexistent object is a no-op
    repo.purge_object("o1").unwrap();
}

#[test]
fn rollback_rewinds_head() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let v1 = source_tree(&temp, "v1", &[("f1", "one")]);
    let v2 = source_tree(&temp, "v2", &[("f1", "two")]);
    let v3 = source_tree(&temp, "v3", &[("f1", "three")]);
    repo.put_object("o1", &v1, commit_meta()).unwrap();
    repo.put_object("o1", &v2, commit_meta()).unwrap();
    repo.put_object("o1", &v3, commit_meta()).unwrap();

    repo.rollback_to_version("o1", VersionNum::new(1)).unwrap();

    let details = repo.describe_object("o1").unwrap();
    assert_eq!(VersionNum::new(1), details.head_version_num);

    let object_root = repo_root(&temp).join(O1_OBJECT_ROOT);
    assert!(!object_root.join("v2").exists());
    assert!(!object_root.join("v3").exists());

    let out = temp.child("out").path().to_path_buf();
    repo.get_object("o1", None, &out).unwrap();
    assert_eq!(tree_of(&[("f1", "one")]), read_tree(&out));

    let validation = repo.validate_object("o1", true).unwrap();
    assert!(!validation.has_errors(), "{:?}", validation.errors);
}

#[test]
fn replicate_version_as_head_restores_old_state() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let v1 = source_tree(&temp, "v1", &[("f1", "one"), ("f2", "two")]);
    let v2 = source_tree(&temp, "v2", &[("f1", "changed")]);
    repo.put_object("o1", &v1, commit_meta()).unwrap();
    repo.put_object("o1", &v2, commit_meta()).unwrap();

    repo.replicate_version_as_head("o1", VersionNum::new(1), commit_meta())
        .unwrap();

    let details = repo.describe_object("o1").unwrap();
    assert_eq!(VersionNum::new(3), details.head_version_num);

    let out = temp.child("out").path().to_path_buf();
    repo.get_object("o1", None, &out).unwrap();
    assert_eq!(
        tree_of(&[("f1", "one"), ("f2", "two")]),
        read_tree(&out)
    );

    let validation = repo.validate_object("o1", true).unwrap();
    assert!(!validation.has_errors(), "{:?}", validation.errors);
}

#[test]
fn export_and_import_object() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let v1 = source_tree(&temp, "v1", &[("f1", "one"), ("d/f2", "two")]);
    let v2 = source_tree(&temp, "v2", &[("f1", "changed"), ("d/f2", "two")]);
    repo.put_object("o1", &v1, commit_meta()).unwrap();
    repo.put_object("o1", &v2, commit_meta()).unwrap();

    let export = temp.child("export").path().to_path_buf();
    repo.export_object("o1", &export).unwrap();

    // the export is the object's raw storage tree
    assert!(export.join("0=ocfl_object_1.0").exists());
    assert!(export.join("v1/inventory.json").exists());
    assert!(export.join("v2/inventory.json").exists());

    // import into a second repository
    let temp2 = TempDir::new().unwrap();
    let repo2 = init_repo(&temp2);
    repo2.import_object(&export).unwrap();

    let out = temp2.child("out").path().to_path_buf();
    repo2.get_object("o1", None, &out).unwrap();
    assert_eq!(
        tree_of(&[("f1", "changed"), ("d/f2", "two")]),
        read_tree(&out)
    );

    let validation = repo2.validate_object("o1", true).unwrap();
    assert!(!validation.has_errors(), "{:?}", validation.errors);
}

#[test]
fn import_rejects_duplicate_object() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let v1 = source_tree(&temp, "v1", &[("f1", "one")]);
    repo.put_object("o1", &v1, commit_meta()).unwrap();

    let export = temp.child("export").path().to_path_buf();
    repo.export_object("o1", &export).unwrap();

    assert!(matches!(
        repo.import_object(&export),
        Err(OcflError::IllegalState(_))
    ));
}

#[test]
fn import_version_extends_head() {
    let temp = TempDir::new().unwrap();
    let repo1 = init_repo(&temp);

    let temp2 = TempDir::new().unwrap();
    let repo2 = init_repo(&temp2);

    let v1 = source_tree(&temp, "v1", &[("f1", "one")]);
    repo1.put_object("o1", &v1, commit_meta()).unwrap();
    repo2.put_object("o1", &v1, commit_meta()).unwrap();

    let v2 = source_tree(&temp, "v2", &[("f1", "one"), ("f2", "two")]);
    repo1.put_object("o1", &v2, commit_meta()).unwrap();

    // hand repo1's v2 version directory to repo2
    let version_dir = repo_root(&temp).join(O1_OBJECT_ROOT).join("v2");
    repo2.import_version(&version_dir).unwrap();

    let details = repo2.describe_object("o1").unwrap();
    assert_eq!(VersionNum::new(2), details.head_version_num);

    let out = temp2.child("out").path().to_path_buf();
    repo2.get_object("o1", None, &out).unwrap();
    assert_eq!(
        tree_of(&[("f1", "one"), ("f2", "two")]),
        read_tree(&out)
    );
}

#[test]
fn export_version_materializes_logical_state() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let v1 = source_tree(&temp, "v1", &[("f1", "one")]);
    let v2 = source_tree(&temp, "v2", &[("f1", "two")]);
    repo.put_object("o1", &v1, commit_meta()).unwrap();
    repo.put_object("o1", &v2, commit_meta()).unwrap();

    let out = temp.child("out").path().to_path_buf();
    repo.export_version("o1", VersionNum::new(1), &out).unwrap();
    assert_eq!(tree_of(&[("f1", "one")]), read_tree(&out));
}

#[test]
fn diff_reports_changes_between_versions() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let v1 = source_tree(&temp, "v1", &[("keep", "same"), ("gone", "bye")]);
    let v2 = source_tree(&temp, "v2", &[("keep", "same"), ("new", "hi")]);
    repo.put_object("o1", &v1, commit_meta()).unwrap();
    repo.put_object("o1", &v2, commit_meta()).unwrap();

    let diffs = repo.diff("o1", None, VersionNum::new(2)).unwrap();

    assert_eq!(2, diffs.len());
    for diff in diffs {
        match diff {
            ocflkit::Diff::Added(path) => assert_eq!("new", path.as_str()),
            ocflkit::Diff::Deleted(path) => assert_eq!("gone", path.as_str()),
            other => panic!("unexpected diff: {:?}", other),
        }
    }
}

#[test]
fn closed_repo_rejects_operations() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("f1", "x")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    repo.close();

    assert!(matches!(
        repo.describe_object("o1"),
        Err(OcflError::Closed)
    ));
    assert!(matches!(
        repo.put_object("o2", &source, commit_meta()),
        Err(OcflError::Closed)
    ));
}

#[test]
fn opening_repo_with_mismatched_layout_fails() {
    let temp = TempDir::new().unwrap();
    init_repo(&temp);

    let result = OcflRepo::fs_repo(repo_root(&temp), Some(flat_layout()));

    assert!(matches!(
        result,
        Err(OcflError::InvalidConfiguration(_))
    ));

    // the matching layout opens fine
    OcflRepo::fs_repo(repo_root(&temp), Some(default_layout())).unwrap();
}

#[test]
fn update_object_on_missing_object_fails() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let result = repo.update_object("nope", commit_meta(), |_| Ok(()));

    assert!(matches!(result, Err(OcflError::NotFound(_))));
}

#[test]
fn rename_within_update() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(&temp);

    let source = source_tree(&temp, "src", &[("old-name", "content")]);
    repo.put_object("o1", &source, commit_meta()).unwrap();

    repo.update_object("o1", commit_meta(), |updater| {
        updater.rename_file("old-name", "dir/new-name", false)
    })
    .unwrap();

    let out = temp.child("out").path().to_path_buf();
    repo.get_object("o1", None, &out).unwrap();
    assert_eq!(tree_of(&[("dir/new-name", "content")]), read_tree(&out));
}
