//! # Notebook Index
//!
//! A sqlite mirror of the node graph used for fast lookups. The filesystem is
//! always the record; anything in here can be rebuilt by walking the tree.
//!
//! ## Schema
//!
//! | Table | Contents |
//! |-------|----------|
//! | `Version` | index format version and when it was written |
//! | `NodeGraph` | `(nodeid, parentid, basename, mtime, symlink)`, one row per node |
//! | `Attr_<name>` | `(nodeid, value)` for each registered [`AttrIndex`] |
//! | `fulltext` | fts3 table of `(nodeid, content)` with the porter tokenizer |
//!
//! The root row has the universal root as parent and an empty basename. The
//! `mtime` column holds the directory mtime seen when the node was last
//! indexed, which lets a connection spot changes made behind its back.
//!
//! ## Failure policy
//!
//! A database error inside a query marks the index corrupt and as needing a
//! reindex, then the query answers an empty result. Callers notice through
//! [`Index::is_corrupt`] and [`Index::index_needed`] rather than an error. A
//! corrupt index file is deleted on close and when it cannot be opened.

mod attr_index;
pub mod text;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::attr::{AttrValue, NodeAttr};
use crate::error::Result;
use crate::UNIVERSAL_ROOT;

pub use attr_index::AttrIndex;
use attr_index::table_exists;

pub const INDEX_FILE: &str = "index.sqlite";
pub const INDEX_VERSION: i64 = 3;

/// A row of `NodeGraph`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedNode {
    pub nodeid: String,
    pub parentid: String,
    pub basename: String,
    pub mtime: f64,
}

pub struct Index {
    path: PathBuf,
    con: Arc<Mutex<Connection>>,
    attrs: BTreeMap<String, AttrIndex>,
    need_index: bool,
    corrupt: bool,
    has_fulltext: bool,
    use_fulltext: bool,
}

impl Index {
    /// Opens the index file at `path`, rebuilding it if it is unreadable or
    /// from another index version.
    pub fn open(path: impl AsRef<Path>) -> Result<Index> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let con = match open_database(&path) {
            Ok(con) => con,
            Err(e) => {
                warn!(index = %path.display(), error = %e, "cannot open index, recreating");
                if path.exists() {
                    fs::remove_file(&path)?;
                }
                open_database(&path)?
            }
        };
        let mut index = Index {
            path,
            con: Arc::new(Mutex::new(con)),
            attrs: BTreeMap::new(),
            need_index: false,
            corrupt: false,
            has_fulltext: false,
            use_fulltext: true,
        };
        if let Err(e) = index.init() {
            warn!(index = %index.path.display(), error = %e, "reinitializing index");
            index.clear()?;
        }
        Ok(index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates missing tables. A stored version other than
    /// [`INDEX_VERSION`] drops every table first and schedules a reindex.
    pub fn init(&mut self) -> Result<()> {
        let con = self.con.lock();
        con.execute_batch("CREATE TABLE IF NOT EXISTS Version (version INTEGER, update_date DATE);")?;
        let version: Option<i64> = con.query_row("SELECT MAX(version) FROM Version", [], |row| row.get(0))?;
        if version != Some(INDEX_VERSION) {
            debug!(?version, "index version changed, dropping tables");
            drop_tables(&con)?;
            con.execute("DELETE FROM Version", [])?;
            con.execute(
                "INSERT INTO Version VALUES (?1, datetime('now'))",
                params![INDEX_VERSION],
            )?;
            self.need_index = true;
        }

        con.execute_batch(
            "CREATE TABLE IF NOT EXISTS NodeGraph
                (nodeid TEXT, parentid TEXT, basename TEXT, mtime FLOAT, symlink BOOLEAN,
                 UNIQUE(nodeid) ON CONFLICT REPLACE);
             CREATE INDEX IF NOT EXISTS IdxNodeGraphNodeid ON NodeGraph (nodeid);
             CREATE INDEX IF NOT EXISTS IdxNodeGraphParentid ON NodeGraph (parentid);",
        )?;

        self.has_fulltext = detect_fts3(&con);
        if self.has_fulltext && !table_exists(&con, "fulltext")? {
            con.execute_batch(
                "CREATE VIRTUAL TABLE fulltext USING fts3(nodeid TEXT, content TEXT, tokenize=porter);",
            )?;
        }

        for attr in self.attrs.values() {
            if attr.init(&con)? {
                self.need_index = true;
            }
        }
        Ok(())
    }

    /// Deletes the database file and starts over with empty tables.
    pub fn clear(&mut self) -> Result<()> {
        {
            let mut con = self.con.lock();
            *con = Connection::open_in_memory()?;
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            *con = open_database(&self.path)?;
        }
        self.corrupt = false;
        self.init()?;
        self.need_index = true;
        Ok(())
    }

    /// Releases the database file, deleting it if the index went corrupt.
    pub fn close(&mut self) -> Result<()> {
        let mut con = self.con.lock();
        *con = Connection::open_in_memory()?;
        if self.corrupt && self.path.exists() {
            info!(index = %self.path.display(), "removing corrupt index");
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Records the time of the last save as the root's mtime.
    pub fn save(&mut self, rootid: &str) {
        let now = mtime_now();
        self.guarded("save", |con| {
            con.execute(
                "UPDATE NodeGraph SET mtime = ?1 WHERE nodeid = ?2",
                params![now, rootid],
            )
            .map(|_| ())
        });
    }

    pub fn compact(&mut self) {
        info!(index = %self.path.display(), "compacting index");
        self.guarded("compact", |con| con.execute_batch("VACUUM;"));
    }

    pub fn index_needed(&self) -> bool {
        self.need_index
    }

    pub fn set_index_needed(&mut self, needed: bool) {
        self.need_index = needed;
    }

    pub fn is_corrupt(&self) -> bool {
        self.corrupt
    }

    /// True if the database supports full-text search.
    pub fn has_fulltext(&self) -> bool {
        self.has_fulltext
    }

    /// True if full-text search is both supported and enabled.
    pub fn fulltext_active(&self) -> bool {
        self.has_fulltext && self.use_fulltext
    }

    pub fn enable_fulltext(&mut self, enabled: bool) {
        self.use_fulltext = enabled;
    }

    /// A handle for read-only queries from another thread.
    pub fn reader(&self) -> IndexReader {
        IndexReader {
            con: Arc::clone(&self.con),
        }
    }

    // Attribute tables

    /// Registers an attribute table. A table that did not exist yet starts
    /// empty, so the index is marked as needing a full pass.
    pub fn add_attr(&mut self, attr: AttrIndex) {
        let created = self.guarded("add_attr", |con| attr.init(con));
        if created {
            self.need_index = true;
        }
        self.attrs.insert(attr.name().to_string(), attr);
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn get_attr(&mut self, nodeid: &str, key: &str) -> Option<AttrValue> {
        let attr = self.attrs.get(key)?.clone();
        self.guarded("get_attr", |con| attr.get(con, nodeid))
    }

    // Nodes

    /// Writes a node's graph row, attribute rows and full text.
    ///
    /// `parentid` is `None` for the root. `body` is the plain text of the
    /// node's page, if any.
    pub fn add_node(
        &mut self,
        nodeid: &str,
        parentid: Option<&str>,
        basename: &str,
        attr: &NodeAttr,
        mtime: f64,
        body: &str,
    ) {
        let (parentid, basename) = match parentid {
            Some(parentid) => (parentid, basename),
            None => (UNIVERSAL_ROOT, ""),
        };
        let attrs: Vec<AttrIndex> = self.attrs.values().cloned().collect();
        let has_fulltext = self.has_fulltext;
        let content = format!("{}\n{}", attr.title(), body);

        self.guarded("add_node", |con| {
            con.execute(
                "INSERT INTO NodeGraph VALUES (?1, ?2, ?3, ?4, 0)",
                params![nodeid, parentid, basename, mtime],
            )?;
            for attr_index in &attrs {
                attr_index.add_node(con, nodeid, attr)?;
            }
            if has_fulltext {
                insert_text(con, nodeid, &content)?;
            }
            Ok(())
        });
    }

    /// Removes a node and every indexed descendant.
    pub fn remove_node(&mut self, nodeid: &str) {
        let attrs: Vec<AttrIndex> = self.attrs.values().cloned().collect();
        let has_fulltext = self.has_fulltext;

        self.guarded("remove_node", |con| {
            let mut stmt = con.prepare(
                "WITH RECURSIVE sub(id) AS (
                    SELECT ?1
                    UNION SELECT NodeGraph.nodeid FROM NodeGraph JOIN sub ON NodeGraph.parentid = sub.id
                 ) SELECT id FROM sub",
            )?;
            let ids = stmt
                .query_map(params![nodeid], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            for id in &ids {
                con.execute("DELETE FROM NodeGraph WHERE nodeid = ?1", params![id])?;
                for attr_index in &attrs {
                    attr_index.remove_node(con, id)?;
                }
                if has_fulltext {
                    con.execute("DELETE FROM fulltext WHERE nodeid = ?1", params![id])?;
                }
            }
            Ok(())
        });
    }

    pub fn get_node(&mut self, nodeid: &str) -> Option<IndexedNode> {
        self.guarded("get_node", |con| get_node(con, nodeid))
    }

    pub fn has_node(&mut self, nodeid: &str) -> bool {
        self.get_node(nodeid).is_some()
    }

    /// The mtime recorded when the node was last indexed, 0 if never.
    pub fn get_node_mtime(&mut self, nodeid: &str) -> f64 {
        self.get_node(nodeid).map(|node| node.mtime).unwrap_or(0.0)
    }

    pub fn set_node_mtime(&mut self, nodeid: &str, mtime: f64) {
        self.guarded("set_node_mtime", |con| {
            con.execute(
                "UPDATE NodeGraph SET mtime = ?1 WHERE nodeid = ?2",
                params![mtime, nodeid],
            )
            .map(|_| ())
        });
    }

    /// Node ids from the root down to `nodeid`.
    ///
    /// `None` if the node is not indexed, or if its parent chain loops, in
    /// which case the index is also marked corrupt.
    pub fn get_node_path(&mut self, nodeid: &str) -> Option<Vec<String>> {
        let walk = self.walk_up(nodeid)?;
        Some(walk.into_iter().rev().map(|node| node.nodeid).collect())
    }

    /// Directory basenames from below the root down to `nodeid`.
    pub fn get_node_filepath(&mut self, nodeid: &str) -> Option<Vec<String>> {
        let walk = self.walk_up(nodeid)?;
        Some(
            walk.into_iter()
                .rev()
                .map(|node| node.basename)
                .filter(|basename| !basename.is_empty())
                .collect(),
        )
    }

    fn walk_up(&mut self, nodeid: &str) -> Option<Vec<IndexedNode>> {
        match self.guarded("node_path", |con| walk_up(con, nodeid)) {
            Walk::Found(nodes) => Some(nodes),
            Walk::Missing => None,
            Walk::Cycle => {
                self.mark_corrupt("node_path", "unexpected parent path loop");
                None
            }
        }
    }

    pub fn list_children(&mut self, nodeid: &str) -> Vec<(String, String)> {
        self.guarded("list_children", |con| list_children(con, nodeid))
    }

    pub fn has_children(&mut self, nodeid: &str) -> bool {
        self.guarded("has_children", |con| {
            con.query_row(
                "SELECT 1 FROM NodeGraph WHERE parentid = ?1",
                params![nodeid],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
        })
    }

    // Search

    /// `(nodeid, title)` of nodes whose title contains `query`, exact
    /// matches first. Empty unless the `title` attribute is indexed.
    pub fn search_titles(&mut self, query: &str) -> Vec<(String, String)> {
        if !self.has_attr("title") {
            return Vec::new();
        }
        self.guarded("search_titles", |con| search_titles(con, query))
    }

    /// Full-text search through the fts table.
    ///
    /// `None` when full text is unavailable or disabled; the caller then
    /// scans the notebook itself. A query the fts syntax rejects matches
    /// nothing.
    pub fn search_fulltext(&mut self, text: &str) -> Option<Vec<String>> {
        if !self.fulltext_active() {
            return None;
        }
        let text = text.replace('"', "");
        let con = self.con.lock();
        let result = con
            .prepare("SELECT nodeid FROM fulltext WHERE content MATCH ?1")
            .and_then(|mut stmt| {
                stmt.query_map(params![text], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()
            });
        match result {
            Ok(ids) => Some(ids),
            Err(e) => {
                debug!(query = %text, error = %e, "full-text query failed");
                Some(Vec::new())
            }
        }
    }

    // Failure handling

    fn guarded<T: Default>(
        &mut self,
        what: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> T {
        let result = {
            let con = self.con.lock();
            f(&con)
        };
        match result {
            Ok(value) => value,
            Err(e) => {
                self.mark_corrupt(what, &e.to_string());
                T::default()
            }
        }
    }

    fn mark_corrupt(&mut self, what: &str, error: &str) {
        warn!(index = %self.path.display(), operation = what, error, "index appears corrupt");
        self.corrupt = true;
        self.need_index = true;
    }
}

/// Read-only index queries usable from any thread.
#[derive(Clone)]
pub struct IndexReader {
    con: Arc<Mutex<Connection>>,
}

impl IndexReader {
    pub fn search_titles(&self, query: &str) -> Result<Vec<(String, String)>> {
        let con = self.con.lock();
        if !table_exists(&con, "Attr_title")? {
            return Ok(Vec::new());
        }
        Ok(search_titles(&con, query)?)
    }

    pub fn get_node_path(&self, nodeid: &str) -> Result<Option<Vec<String>>> {
        let con = self.con.lock();
        match walk_up(&con, nodeid)? {
            Walk::Found(nodes) => Ok(Some(nodes.into_iter().rev().map(|n| n.nodeid).collect())),
            Walk::Missing | Walk::Cycle => Ok(None),
        }
    }

    pub fn list_children(&self, nodeid: &str) -> Result<Vec<(String, String)>> {
        let con = self.con.lock();
        Ok(list_children(&con, nodeid)?)
    }
}

/// Seconds since the Unix epoch of a file's last modification, 0 if unknown.
pub fn path_mtime(path: &Path) -> f64 {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(system_secs)
        .unwrap_or(0.0)
}

fn mtime_now() -> f64 {
    system_secs(SystemTime::now())
}

fn system_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn open_database(path: &Path) -> Result<Connection> {
    let con = Connection::open(path)?;
    // Index data is rebuildable from the notebook tree.
    con.execute_batch("PRAGMA synchronous = OFF;")?;
    Ok(con)
}

fn detect_fts3(con: &Connection) -> bool {
    con.execute_batch(
        "DROP TABLE IF EXISTS fts3test;
         CREATE VIRTUAL TABLE fts3test USING fts3(col TEXT);
         DROP TABLE fts3test;",
    )
    .is_ok()
}

fn drop_tables(con: &Connection) -> rusqlite::Result<()> {
    con.execute_batch(
        "DROP TABLE IF EXISTS NodeGraph;
         DROP INDEX IF EXISTS IdxNodeGraphNodeid;
         DROP INDEX IF EXISTS IdxNodeGraphParentid;
         DROP TABLE IF EXISTS fulltext;",
    )?;
    let mut stmt = con.prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'Attr_%'")?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for table in tables {
        con.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\";", table))?;
    }
    Ok(())
}

fn insert_text(con: &Connection, nodeid: &str, text: &str) -> rusqlite::Result<()> {
    let exists = con
        .query_row("SELECT 1 FROM fulltext WHERE nodeid = ?1", params![nodeid], |_| Ok(()))
        .optional()?
        .is_some();
    if exists {
        con.execute(
            "UPDATE fulltext SET content = ?1 WHERE nodeid = ?2",
            params![text, nodeid],
        )?;
    } else {
        con.execute(
            "INSERT INTO fulltext VALUES (?1, ?2)",
            params![nodeid, text],
        )?;
    }
    Ok(())
}

fn get_node(con: &Connection, nodeid: &str) -> rusqlite::Result<Option<IndexedNode>> {
    con.query_row(
        "SELECT nodeid, parentid, basename, mtime FROM NodeGraph WHERE nodeid = ?1",
        params![nodeid],
        |row| {
            Ok(IndexedNode {
                nodeid: row.get(0)?,
                parentid: row.get(1)?,
                basename: row.get(2)?,
                mtime: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
            })
        },
    )
    .optional()
}

#[derive(Default)]
enum Walk {
    Found(Vec<IndexedNode>),
    #[default]
    Missing,
    Cycle,
}

/// Follows parent links from `nodeid` up to the root.
fn walk_up(con: &Connection, nodeid: &str) -> rusqlite::Result<Walk> {
    let mut visited = std::collections::HashSet::new();
    let mut nodes = Vec::new();
    let mut current = nodeid.to_string();
    loop {
        visited.insert(current.clone());
        let Some(node) = get_node(con, &current)? else {
            return Ok(Walk::Missing);
        };
        let parentid = node.parentid.clone();
        nodes.push(node);
        if parentid == UNIVERSAL_ROOT {
            return Ok(Walk::Found(nodes));
        }
        if visited.contains(&parentid) {
            return Ok(Walk::Cycle);
        }
        current = parentid;
    }
}

fn list_children(con: &Connection, nodeid: &str) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = con.prepare("SELECT nodeid, basename FROM NodeGraph WHERE parentid = ?1")?;
    let rows = stmt.query_map(params![nodeid], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

fn search_titles(con: &Connection, query: &str) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = con.prepare(
        "SELECT nodeid, value FROM Attr_title WHERE value LIKE ?1 ESCAPE '\\' ORDER BY value != ?2, value",
    )?;
    let pattern = format!("%{}%", escape_like(query));
    let rows = stmt.query_map(params![pattern, query], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

/// Makes `%`, `_` and `\` match literally under `ESCAPE '\'`.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttrType;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Index) {
        let dir = TempDir::new().unwrap();
        let mut index = Index::open(dir.path().join(INDEX_FILE)).unwrap();
        index.add_attr(AttrIndex::new("title", AttrType::String, true));
        (dir, index)
    }

    fn add(index: &mut Index, nodeid: &str, parent: Option<&str>, title: &str) {
        let attr = NodeAttr::new().with("title", title);
        index.add_node(nodeid, parent, &title.to_lowercase(), &attr, 1.0, "");
    }

    #[test]
    fn test_fresh_index_needs_indexing() {
        let (_dir, index) = setup();
        assert!(index.index_needed());
        assert!(!index.is_corrupt());
    }

    #[test]
    fn test_node_graph() {
        let (_dir, mut index) = setup();
        add(&mut index, "root", None, "Root");
        add(&mut index, "a", Some("root"), "A");
        add(&mut index, "b", Some("a"), "B");

        assert_eq!(index.get_node_path("b").unwrap(), vec!["root", "a", "b"]);
        assert_eq!(index.get_node_filepath("b").unwrap(), vec!["a", "b"]);
        assert_eq!(index.list_children("root"), vec![("a".to_string(), "a".to_string())]);
        assert!(index.has_children("a"));
        assert!(!index.has_children("b"));
        assert_eq!(index.get_node("root").unwrap().parentid, UNIVERSAL_ROOT);
        assert_eq!(index.get_node_path("missing"), None);
    }

    #[test]
    fn test_remove_subtree() {
        let (_dir, mut index) = setup();
        add(&mut index, "root", None, "Root");
        add(&mut index, "a", Some("root"), "A");
        add(&mut index, "b", Some("a"), "B");
        index.remove_node("a");
        assert!(index.has_node("root"));
        assert!(!index.has_node("a"));
        assert!(!index.has_node("b"));
        assert!(index.search_titles("B").is_empty());
    }

    #[test]
    fn test_cycle_marks_corrupt() {
        let (_dir, mut index) = setup();
        add(&mut index, "a", Some("b"), "A");
        add(&mut index, "b", Some("a"), "B");
        index.set_index_needed(false);
        assert_eq!(index.get_node_path("a"), None);
        assert!(index.is_corrupt());
        assert!(index.index_needed());
    }

    #[test]
    fn test_title_search_order() {
        let (_dir, mut index) = setup();
        add(&mut index, "root", None, "Root");
        add(&mut index, "n1", Some("root"), "abc");
        add(&mut index, "n2", Some("root"), "ab");
        add(&mut index, "n3", Some("root"), "xaby");
        add(&mut index, "n4", Some("root"), "zzz");
        let ids: Vec<String> = index.search_titles("ab").into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["n2", "n1", "n3"]);
    }

    #[test]
    fn test_title_search_wildcards_are_literal() {
        let (_dir, mut index) = setup();
        add(&mut index, "root", None, "Root");
        add(&mut index, "n1", Some("root"), "100% done");
        add(&mut index, "n2", Some("root"), "1000 done");
        add(&mut index, "n3", Some("root"), "snake_case");
        add(&mut index, "n4", Some("root"), "snakeXcase");
        assert_eq!(index.search_titles("0%"), vec![("n1".to_string(), "100% done".to_string())]);
        assert_eq!(index.search_titles("e_c"), vec![("n3".to_string(), "snake_case".to_string())]);
    }

    #[test]
    fn test_fulltext_search() {
        let (_dir, mut index) = setup();
        if !index.has_fulltext() {
            return;
        }
        let attr = NodeAttr::new().with("title", "t");
        index.add_node("n1", None, "", &attr, 1.0, "hello world");
        index.add_node("n2", Some("n1"), "x", &attr, 1.0, "why hello, what is new?");
        index.add_node("n3", Some("n1"), "y", &attr, 1.0, "brand new world");

        let mut hits = index.search_fulltext("hello").unwrap();
        hits.sort();
        assert_eq!(hits, vec!["n1", "n2"]);

        index.enable_fulltext(false);
        assert_eq!(index.search_fulltext("hello"), None);
    }

    #[test]
    fn test_version_change_rebuilds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(INDEX_FILE);
        {
            let mut index = Index::open(&path).unwrap();
            index.add_node("root", None, "", &NodeAttr::new(), 1.0, "");
            index.close().unwrap();
        }
        {
            let con = Connection::open(&path).unwrap();
            con.execute("INSERT INTO Version VALUES (99, datetime('now'))", []).unwrap();
        }
        let mut index = Index::open(&path).unwrap();
        assert!(index.index_needed());
        assert!(!index.has_node("root"));
    }

    #[test]
    fn test_garbage_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(INDEX_FILE);
        fs::write(&path, b"this is not a database at all, not even close........").unwrap();
        let mut index = Index::open(&path).unwrap();
        assert!(index.index_needed());
        index.add_node("root", None, "", &NodeAttr::new(), 1.0, "");
        assert!(index.has_node("root"));
    }

    #[test]
    fn test_reader_from_thread() {
        let (_dir, mut index) = setup();
        add(&mut index, "root", None, "Root");
        add(&mut index, "a", Some("root"), "Alpha");
        let reader = index.reader();
        let hits = std::thread::spawn(move || reader.search_titles("lph").unwrap())
            .join()
            .unwrap();
        assert_eq!(hits, vec![("a".to_string(), "Alpha".to_string())]);
    }

    #[test]
    fn test_save_updates_root_mtime() {
        let (_dir, mut index) = setup();
        add(&mut index, "root", None, "Root");
        index.save("root");
        assert!(index.get_node_mtime("root") > 1.0);
        assert_eq!(index.get_node_mtime("nope"), 0.0);
    }
}
