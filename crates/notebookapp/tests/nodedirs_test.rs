use std::collections::HashSet;

use notebookapp::error::NotebookError;
use notebookapp::nodedirs::NodeDirs;
use tempfile::TempDir;

fn setup() -> (TempDir, NodeDirs) {
    let dir = TempDir::new().unwrap();
    let dirs = NodeDirs::open(dir.path().join("nodes")).unwrap();
    (dir, dirs)
}

fn awkward_ids() -> Vec<String> {
    vec![
        "abcdefg".to_string(),
        "ab".to_string(),
        ".".to_string(),
        "abc/aaa".to_string(),
        "x".repeat(256),
        "..x".to_string(),
        "..yz".to_string(),
    ]
}

#[test]
fn test_awkward_ids_round_trip() {
    let (_dir, dirs) = setup();
    for id in awkward_ids() {
        let path = dirs.create_nodedir(&id).unwrap();
        assert!(path.is_dir());
        assert!(path.starts_with(dirs.root()));
        assert_eq!(dirs.nodeid_for_path(&path).unwrap().as_deref(), Some(id.as_str()));
    }

    let listed: HashSet<String> = dirs.iter_nodeids().unwrap().into_iter().collect();
    let expected: HashSet<String> = awkward_ids().into_iter().collect();
    assert_eq!(listed, expected);
}

#[test]
fn test_delete_removes_dir_and_alt_id() {
    let (_dir, dirs) = setup();
    for id in awkward_ids() {
        assert!(!dirs.has_nodedir(&id).unwrap());
        let path = dirs.create_nodedir(&id).unwrap();
        assert!(dirs.has_nodedir(&id).unwrap());
        dirs.delete_nodedir(&id).unwrap();
        assert!(!dirs.has_nodedir(&id).unwrap());
        assert!(!path.exists());
    }
    assert!(dirs.iter_nodeids().unwrap().is_empty());
}

#[test]
fn test_alt_ids_survive_reopen() {
    let (dir, dirs) = setup();
    let path = dirs.create_nodedir("Mixed/Case").unwrap();
    drop(dirs);

    let dirs = NodeDirs::open(dir.path().join("nodes")).unwrap();
    assert_eq!(dirs.get_nodedir("Mixed/Case").unwrap(), path);
    assert_eq!(dirs.iter_nodeids().unwrap(), vec!["Mixed/Case"]);
}

#[test]
fn test_empty_id_rejected() {
    let (_dir, dirs) = setup();
    assert!(matches!(
        dirs.create_nodedir(""),
        Err(NotebookError::InvalidNodeId(_))
    ));
}
