use std::collections::HashSet;

use notebookapp::error::NotebookError;
use notebookapp::paths::{node_url, parse_node_url};
use notebookapp::{Notebook, CONTENT_TYPE_DIR, CONTENT_TYPE_PAGE};
use tempfile::TempDir;

fn setup() -> (TempDir, String, Notebook) {
    let dir = TempDir::new().unwrap();
    let url = dir.path().join("nb").to_string_lossy().into_owned();
    let nb = Notebook::create(&url, "Test").unwrap();
    (dir, url, nb)
}

fn page(nb: &mut Notebook, title: &str, body: &str) -> String {
    let rootid = nb.rootid().to_string();
    let id = nb.new_child(&rootid, CONTENT_TYPE_PAGE, title, None).unwrap();
    let html = format!("<html><body>{}</body></html>", body);
    nb.write_file(&id, "page.html", html.as_bytes()).unwrap();
    id
}

fn ids(list: Vec<String>) -> HashSet<String> {
    list.into_iter().collect()
}

#[test]
fn test_fulltext_search() {
    let (_dir, _url, mut nb) = setup();
    let a = page(&mut nb, "One", "hello world");
    let b = page(&mut nb, "Two", "why hello, what is new?");
    let c = page(&mut nb, "Three", "brand new world");
    nb.reindex(None).unwrap();

    assert_eq!(ids(nb.search_fulltext("hello").unwrap()), ids(vec![a.clone(), b.clone()]));
    assert_eq!(ids(nb.search_fulltext("world").unwrap()), ids(vec![a.clone(), c.clone()]));

    // Without the fts table the notebook is scanned instead.
    nb.enable_fulltext(false).unwrap();
    assert_eq!(ids(nb.search_fulltext("hello").unwrap()), ids(vec![a.clone(), b]));
    assert_eq!(ids(nb.search_fulltext("world").unwrap()), ids(vec![a, c]));
}

#[test]
fn test_page_text_strips_markup() {
    let (_dir, _url, mut nb) = setup();
    let id = page(&mut nb, "Text", "<b>bold</b> words");
    assert_eq!(nb.page_text(&id).unwrap().trim(), "bold words");
}

#[test]
fn test_children_consistent_with_parents() {
    let (_dir, url, mut nb) = setup();
    let root = nb.rootid().to_string();
    let dir = nb.new_child(&root, CONTENT_TYPE_DIR, "Folder", None).unwrap();
    for title in ["a", "b", "c"] {
        nb.new_child(&dir, CONTENT_TYPE_PAGE, title, None).unwrap();
    }
    nb.close().unwrap();

    let mut nb = Notebook::load(&url).unwrap();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        for (i, child) in nb.children(&id).unwrap().iter().enumerate() {
            assert_eq!(child.parent_id().as_deref(), Some(id.as_str()));
            assert_eq!(child.order(), i as i64);
            stack.push(child.nodeid().to_string());
        }
    }
}

#[test]
fn test_search_titles_after_rename() {
    let (_dir, _url, mut nb) = setup();
    let root = nb.rootid().to_string();
    let id = nb.new_child(&root, CONTENT_TYPE_PAGE, "Groceries", None).unwrap();
    nb.rename(&id, "Shopping list").unwrap();

    let hits = nb.search_titles("shopping").unwrap();
    assert_eq!(hits, vec![(id.clone(), "Shopping list".to_string())]);
    assert!(nb.search_titles("groceries").unwrap().is_empty());
    assert_eq!(nb.get_node_path(&id).unwrap(), Some(vec![root, id]));
}

#[test]
fn test_newer_notebook_version_rejected() {
    let (_dir, url, nb) = setup();
    nb.close().unwrap();
    let meta = std::path::Path::new(&url).join("node.xml");
    let text = std::fs::read_to_string(&meta).unwrap();
    let text = text.replace("<version>5</version>", "<version>99</version>");
    std::fs::write(&meta, text).unwrap();

    assert!(matches!(
        Notebook::load(&url),
        Err(NotebookError::VersionMismatch { found: 99, .. })
    ));
}

#[test]
fn test_node_urls_address_nodes() {
    let (_dir, _url, mut nb) = setup();
    let root = nb.rootid().to_string();
    let id = nb.new_child(&root, CONTENT_TYPE_PAGE, "Linked", None).unwrap();

    let (host, nodeid) = parse_node_url(&node_url(&id, "")).unwrap();
    assert_eq!(host, "");
    assert_eq!(nb.get_node(&nodeid).unwrap().title(), "Linked");
}
