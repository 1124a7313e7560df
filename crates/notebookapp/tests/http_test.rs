use std::io::Write;

use notebookapp::connection::http::NotebookServer;
use notebookapp::connection::{open_connection, FileMode, NotebookConnection};
use notebookapp::error::NotebookError;
use notebookapp::{Notebook, CONTENT_TYPE_DIR, CONTENT_TYPE_PAGE};
use tempfile::TempDir;

fn setup() -> (TempDir, String, NotebookServer) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nb").to_string_lossy().into_owned();
    Notebook::create(&path, "Served").unwrap().close().unwrap();
    let server = NotebookServer::start(open_connection(&path).unwrap(), "127.0.0.1", 0).unwrap();
    (dir, path, server)
}

#[test]
fn test_facade_over_http() {
    let (_dir, path, server) = setup();
    let mut remote = Notebook::load(&server.url()).unwrap();
    assert_eq!(remote.root().unwrap().title(), "Served");
    assert!(remote.trashid().is_some());

    let root = remote.rootid().to_string();
    let folder = remote.new_child(&root, CONTENT_TYPE_DIR, "Remote folder", None).unwrap();
    let page = remote.new_child(&folder, CONTENT_TYPE_PAGE, "Remote page", None).unwrap();
    remote
        .write_file(&page, "page.html", b"<html><body>over the wire</body></html>")
        .unwrap();
    assert_eq!(remote.page_text(&page).unwrap().trim(), "over the wire");
    assert_eq!(
        remote.search_titles("remote page").unwrap(),
        vec![(page.clone(), "Remote page".to_string())]
    );
    remote.close().unwrap();
    server.shutdown().unwrap();

    // Everything landed in the served directory.
    let mut local = Notebook::load(&path).unwrap();
    assert_eq!(local.get_node(&page).unwrap().parent_id().as_deref(), Some(folder.as_str()));
    assert_eq!(local.page_text(&page).unwrap().trim(), "over the wire");
}

#[test]
fn test_files_and_directories() {
    let (_dir, _path, server) = setup();
    let mut conn = open_connection(&server.url()).unwrap();
    let root = conn.get_rootid().unwrap();

    conn.create_dir(&root, "media/").unwrap();
    let mut out = conn.open_file(&root, "media/log.txt", FileMode::Write).unwrap();
    out.write_all(b"one\n").unwrap();
    out.close().unwrap();
    let mut out = conn.open_file(&root, "media/log.txt", FileMode::Append).unwrap();
    out.write_all(b"two\n").unwrap();
    out.close().unwrap();

    assert!(conn.has_file(&root, "media/").unwrap());
    assert_eq!(conn.list_dir(&root, "media/").unwrap(), vec!["media/log.txt"]);
    let text = conn
        .open_file(&root, "media/log.txt", FileMode::Read)
        .unwrap()
        .read_text()
        .unwrap();
    assert_eq!(text, "one\ntwo\n");

    conn.delete_file(&root, "media/").unwrap();
    assert!(!conn.has_file(&root, "media/log.txt").unwrap());
    assert!(matches!(
        conn.open_file(&root, "missing.txt", FileMode::Read),
        Err(NotebookError::UnknownFile(_))
    ));
}

#[test]
fn test_errors_cross_the_wire() {
    let (_dir, _path, server) = setup();
    let mut conn = open_connection(&server.url()).unwrap();
    assert!(matches!(conn.read_node("nope"), Err(NotebookError::UnknownNode(_))));
    assert!(matches!(conn.delete_node("nope"), Err(NotebookError::UnknownNode(_))));
    assert!(!conn.has_node("nope").unwrap());
}
