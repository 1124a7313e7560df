use std::io::Write;

use notebookapp::attr::NodeAttr;
use notebookapp::connection::{FileMode, FsConnection, MemConnection, NotebookConnection};
use notebookapp::sync::{sync_node, sync_tree, SyncOutcome};
use tempfile::TempDir;

fn setup() -> (TempDir, FsConnection) {
    let dir = TempDir::new().unwrap();
    let mut conn = FsConnection::new();
    conn.connect(&dir.path().to_string_lossy()).unwrap();
    conn.create_node(
        "root",
        &NodeAttr::new()
            .with("parentids", Vec::<String>::new())
            .with("title", "Root")
            .with("modified_time", 100i64),
    )
    .unwrap();
    conn.create_node(
        "n",
        &NodeAttr::new()
            .with("parentids", vec!["root".to_string()])
            .with("title", "x")
            .with("modified_time", 100i64),
    )
    .unwrap();
    (dir, conn)
}

fn edit(conn: &mut dyn NotebookConnection, nodeid: &str, title: &str, time: i64) -> NodeAttr {
    let mut attr = conn.read_node(nodeid).unwrap();
    attr.insert("title", title);
    attr.insert("modified_time", time);
    conn.update_node(nodeid, &attr).unwrap();
    attr
}

#[test]
fn test_conflict_resolves_to_latest_edit() {
    let (_da, mut a) = setup();
    let (_db, mut b) = setup();

    let attr_a = edit(&mut a, "n", "y", 101);
    assert_eq!(sync_node("n", &mut a, &mut b, &attr_a).unwrap(), SyncOutcome::Updated);

    let attr_b = edit(&mut b, "n", "z", 102);
    assert_eq!(sync_node("n", &mut b, &mut a, &attr_b).unwrap(), SyncOutcome::Updated);

    for conn in [&mut a, &mut b] {
        let attr = conn.read_node("n").unwrap();
        assert_eq!(attr.title(), "z");
        assert_eq!(attr.modified_time(), 102);
    }
}

#[test]
fn test_repeated_sync_is_idempotent() {
    let (_da, mut a) = setup();
    let (_db, mut b) = setup();
    let attr = edit(&mut a, "n", "y", 101);

    sync_node("n", &mut a, &mut b, &attr).unwrap();
    let first = b.read_node("n").unwrap();
    assert_eq!(sync_node("n", &mut a, &mut b, &attr).unwrap(), SyncOutcome::Kept);
    assert_eq!(b.read_node("n").unwrap(), first);
}

#[test]
fn test_tree_into_empty_notebook() {
    let (_da, mut a) = setup();
    let mut page = a.open_file("n", "page.html", FileMode::Write).unwrap();
    page.write_all(b"<html><body>synced</body></html>").unwrap();
    page.close().unwrap();

    let dir = TempDir::new().unwrap();
    let mut b = FsConnection::new();
    b.connect(&dir.path().to_string_lossy()).unwrap();

    let stats = sync_tree("root", &mut a, &mut b, None).unwrap();
    assert_eq!(stats.created, 2);
    assert_eq!(b.get_rootid().unwrap(), "root");
    assert_eq!(b.read_node("n").unwrap().parentids(), vec!["root"]);
    let text = b.open_file("n", "page.html", FileMode::Read).unwrap().read_text().unwrap();
    assert!(text.contains("synced"));
}

#[test]
fn test_filesystem_to_memory_and_back() {
    let (_da, mut a) = setup();
    let mut mem = MemConnection::new();
    mem.connect("mem:").unwrap();
    sync_tree("root", &mut a, &mut mem, None).unwrap();

    let attr = edit(&mut mem, "n", "edited in memory", 300);
    assert_eq!(sync_node("n", &mut mem, &mut a, &attr).unwrap(), SyncOutcome::Updated);
    assert_eq!(a.read_node("n").unwrap().title(), "edited in memory");
}
