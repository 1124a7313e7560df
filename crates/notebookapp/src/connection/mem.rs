//! In-memory notebook.
//!
//! Nodes are plain attribute maps; `parentids` and `childrenids` are kept
//! in the maps themselves, so sibling order is explicit and `move_node`
//! honours its index. Files live in a shared table so a [`FileStream`]
//! writer can publish into it on close.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{CommitWrite, FileMode, FileStream, IndexQuery, IndexResult, NotebookConnection};
use crate::attr::{AttrValue, NodeAttr};
use crate::error::{NotebookError, Result};
use crate::paths::{check_filename, path_join};
use crate::timestamp::get_timestamp;
use crate::NOTEBOOK_FORMAT_VERSION;

/// Per-node file tables. Directory keys end in `/` and hold no data.
type SharedFiles = Arc<Mutex<HashMap<String, BTreeMap<String, Option<Vec<u8>>>>>>;

#[derive(Default)]
pub struct MemConnection {
    rootid: Option<String>,
    nodes: HashMap<String, NodeAttr>,
    files: SharedFiles,
}

impl MemConnection {
    pub fn new() -> MemConnection {
        MemConnection::default()
    }

    fn node(&self, nodeid: &str) -> Result<&NodeAttr> {
        self.nodes
            .get(nodeid)
            .ok_or_else(|| NotebookError::UnknownNode(nodeid.to_string()))
    }

    fn check_node(&self, nodeid: &str) -> Result<()> {
        self.node(nodeid).map(|_| ())
    }

    fn set_children(&mut self, nodeid: &str, children: Vec<String>) {
        if let Some(attr) = self.nodes.get_mut(nodeid) {
            attr.insert("childrenids", children);
        }
    }

    fn is_ancestor(&self, ancestor: &str, nodeid: &str) -> bool {
        let mut current = Some(nodeid.to_string());
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            current = self.nodes.get(&id).and_then(NodeAttr::parent_id);
        }
        false
    }

    fn preorder(&self) -> Vec<String> {
        let mut ids = Vec::new();
        let mut stack: Vec<String> = self.rootid.iter().cloned().collect();
        while let Some(id) = stack.pop() {
            if let Some(attr) = self.nodes.get(&id) {
                stack.extend(attr.childrenids().into_iter().rev());
                ids.push(id);
            }
        }
        ids
    }

    fn node_path(&self, nodeid: &str) -> Option<Vec<String>> {
        self.nodes.get(nodeid)?;
        let mut path = Vec::new();
        let mut current = Some(nodeid.to_string());
        while let Some(id) = current {
            if path.contains(&id) {
                return None;
            }
            current = self.nodes.get(&id).and_then(NodeAttr::parent_id);
            path.push(id);
        }
        path.reverse();
        Some(path)
    }

    fn search_titles(&self, query: &str) -> Vec<(String, String)> {
        let needle = query.to_lowercase();
        let mut hits: Vec<(String, String)> = self
            .nodes
            .iter()
            .filter(|(_, attr)| attr.title().to_lowercase().contains(&needle))
            .map(|(nodeid, attr)| (nodeid.clone(), attr.title().to_string()))
            .collect();
        hits.sort_by(|a, b| (a.1 != query, &a.1, &a.0).cmp(&(b.1 != query, &b.1, &b.0)));
        hits
    }
}

/// Normalises a node file path to the table key form (no leading `/`).
fn file_key(filename: &str) -> String {
    filename.trim_start_matches('/').to_string()
}

struct MemWriter {
    files: SharedFiles,
    nodeid: String,
    key: String,
    buf: Vec<u8>,
    append: bool,
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommitWrite for MemWriter {
    fn commit(self: Box<Self>) -> Result<()> {
        let MemWriter {
            files,
            nodeid,
            key,
            buf,
            append,
        } = *self;
        let mut files = files.lock();
        let table = files
            .get_mut(&nodeid)
            .ok_or_else(|| NotebookError::UnknownNode(nodeid.clone()))?;
        let entry = table.entry(key).or_insert(None);
        if append {
            if let Some(data) = entry.as_mut() {
                data.extend_from_slice(&buf);
                return Ok(());
            }
        }
        *entry = Some(buf);
        Ok(())
    }
}

/// Fills keys every stored node carries, preferring the previous values.
fn fill_required(attr: &mut NodeAttr, old: Option<&NodeAttr>) {
    let now = get_timestamp();
    for (key, default) in [
        ("version", AttrValue::from(NOTEBOOK_FORMAT_VERSION)),
        ("created_time", now.into()),
        ("modified_time", now.into()),
    ] {
        if !attr.contains_key(key) {
            let value = old.and_then(|old| old.get(key)).cloned().unwrap_or(default);
            attr.insert(key, value);
        }
    }
}

impl NotebookConnection for MemConnection {
    fn connect(&mut self, _url: &str) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        Ok(())
    }

    fn create_node(&mut self, nodeid: &str, attr: &NodeAttr) -> Result<()> {
        if nodeid.is_empty() {
            return Err(NotebookError::InvalidNodeId(nodeid.to_string()));
        }
        if self.nodes.contains_key(nodeid) {
            return Err(NotebookError::NodeExists(nodeid.to_string()));
        }
        let parentid = attr.parent_id();
        if let Some(parentid) = &parentid {
            self.check_node(parentid)?;
        }

        let mut attr = attr.clone();
        attr.insert("nodeid", nodeid);
        fill_required(&mut attr, None);
        attr.insert("parentids", parentid.iter().cloned().collect::<Vec<_>>());
        attr.insert("childrenids", AttrValue::Array(Vec::new()));

        if self.rootid.is_none() {
            self.rootid = Some(nodeid.to_string());
        }
        if let Some(parentid) = &parentid {
            let mut siblings = self.node(parentid)?.childrenids();
            siblings.push(nodeid.to_string());
            self.set_children(parentid, siblings);
        }
        self.nodes.insert(nodeid.to_string(), attr);
        self.files.lock().insert(nodeid.to_string(), BTreeMap::new());
        Ok(())
    }

    fn read_node(&mut self, nodeid: &str) -> Result<NodeAttr> {
        self.node(nodeid).cloned()
    }

    fn update_node(&mut self, nodeid: &str, attr: &NodeAttr) -> Result<()> {
        let old = self.node(nodeid)?;
        let mut attr = attr.clone();
        attr.insert("nodeid", nodeid);
        fill_required(&mut attr, Some(old));
        attr.insert("parentids", old.parentids());
        attr.insert("childrenids", old.childrenids());
        self.nodes.insert(nodeid.to_string(), attr);
        Ok(())
    }

    fn delete_node(&mut self, nodeid: &str) -> Result<()> {
        if self.rootid.as_deref() == Some(nodeid) {
            return Err(NotebookError::Connection("cannot delete the root node".into()));
        }
        let attr = self.node(nodeid)?.clone();
        if let Some(parentid) = attr.parent_id() {
            if let Ok(parent) = self.node(&parentid) {
                let siblings = parent.childrenids().into_iter().filter(|id| id != nodeid).collect();
                self.set_children(&parentid, siblings);
            }
        }

        let mut stack = vec![nodeid.to_string()];
        let mut files = self.files.lock();
        while let Some(id) = stack.pop() {
            if let Some(attr) = self.nodes.remove(&id) {
                stack.extend(attr.childrenids());
            }
            files.remove(&id);
        }
        Ok(())
    }

    fn has_node(&mut self, nodeid: &str) -> Result<bool> {
        Ok(self.nodes.contains_key(nodeid))
    }

    fn get_rootid(&mut self) -> Result<String> {
        self.rootid
            .clone()
            .ok_or_else(|| NotebookError::UnknownNode("notebook has no root node".into()))
    }

    fn move_node(&mut self, nodeid: &str, parentid: &str, index: Option<usize>) -> Result<()> {
        if self.rootid.as_deref() == Some(nodeid) {
            return Err(NotebookError::Connection("cannot move the root node".into()));
        }
        let old_parent = self.node(nodeid)?.parent_id();
        self.check_node(parentid)?;
        if self.is_ancestor(nodeid, parentid) {
            return Err(NotebookError::Connection(format!(
                "cannot move node '{}' into itself or a descendant",
                nodeid
            )));
        }

        if let Some(old_parent) = &old_parent {
            let siblings = self.node(old_parent)?.childrenids().into_iter().filter(|id| id != nodeid).collect();
            self.set_children(old_parent, siblings);
        }
        let mut siblings = self.node(parentid)?.childrenids();
        let at = index.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(at, nodeid.to_string());
        self.set_children(parentid, siblings);
        if let Some(attr) = self.nodes.get_mut(nodeid) {
            attr.insert("parentids", vec![parentid.to_string()]);
        }
        Ok(())
    }

    fn open_file(&mut self, nodeid: &str, filename: &str, mode: FileMode) -> Result<FileStream> {
        self.check_node(nodeid)?;
        check_filename(filename)?;
        if filename.ends_with('/') || file_key(filename).is_empty() {
            return Err(NotebookError::file(nodeid, filename, "is a directory"));
        }
        let key = file_key(filename);
        match mode {
            FileMode::Read => {
                let files = self.files.lock();
                let data = files
                    .get(nodeid)
                    .and_then(|table| table.get(&key))
                    .and_then(Option::clone)
                    .ok_or_else(|| NotebookError::file(nodeid, filename, "no such file"))?;
                Ok(FileStream::reader(Cursor::new(data)))
            }
            FileMode::Write | FileMode::Append => Ok(FileStream::writer(MemWriter {
                files: Arc::clone(&self.files),
                nodeid: nodeid.to_string(),
                key,
                buf: Vec::new(),
                append: mode == FileMode::Append,
            })),
        }
    }

    fn delete_file(&mut self, nodeid: &str, filename: &str) -> Result<()> {
        self.check_node(nodeid)?;
        check_filename(filename)?;
        let key = file_key(filename);
        let mut files = self.files.lock();
        if let Some(table) = files.get_mut(nodeid) {
            if key.ends_with('/') {
                table.retain(|name, _| !name.starts_with(&key));
            } else {
                table.remove(&key);
            }
        }
        Ok(())
    }

    fn create_dir(&mut self, nodeid: &str, filename: &str) -> Result<()> {
        self.check_node(nodeid)?;
        check_filename(filename)?;
        if !filename.ends_with('/') {
            return Err(NotebookError::File(format!(
                "directory name '{}' must end with '/'",
                filename
            )));
        }
        let key = file_key(filename);
        if !key.is_empty() {
            if let Some(table) = self.files.lock().get_mut(nodeid) {
                table.insert(key, None);
            }
        }
        Ok(())
    }

    fn list_dir(&mut self, nodeid: &str, filename: &str) -> Result<Vec<String>> {
        self.check_node(nodeid)?;
        if !filename.ends_with('/') && !filename.is_empty() {
            return Err(NotebookError::File(format!(
                "filename '{}' does not end with '/'",
                filename
            )));
        }
        let prefix = file_key(filename);
        let files = self.files.lock();
        let table = files
            .get(nodeid)
            .ok_or_else(|| NotebookError::UnknownNode(nodeid.to_string()))?;
        if !prefix.is_empty() && !table.keys().any(|name| name.starts_with(&prefix)) {
            return Err(NotebookError::UnknownFile(format!(
                "cannot find file '{}' '{}'",
                nodeid, filename
            )));
        }

        let mut listing = Vec::new();
        for name in table.keys() {
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            let entry = match rest.find('/') {
                Some(i) => &rest[..=i],
                None => rest,
            };
            if entry.is_empty() {
                continue;
            }
            let full = match entry.strip_suffix('/') {
                Some(dir) => format!("{}/", path_join(&[filename, dir])),
                None => path_join(&[filename, entry]),
            };
            if !listing.contains(&full) {
                listing.push(full);
            }
        }
        Ok(listing)
    }

    fn has_file(&mut self, nodeid: &str, filename: &str) -> Result<bool> {
        self.check_node(nodeid)?;
        let key = file_key(filename);
        if key.is_empty() {
            return Ok(true);
        }
        let files = self.files.lock();
        let Some(table) = files.get(nodeid) else {
            return Ok(false);
        };
        if key.ends_with('/') {
            Ok(table.keys().any(|name| name.starts_with(&key)))
        } else {
            Ok(matches!(table.get(&key), Some(Some(_))))
        }
    }

    fn index(&mut self, query: &IndexQuery) -> Result<IndexResult> {
        let result = match query {
            IndexQuery::IndexNeeded | IndexQuery::HasFulltext => IndexResult::Bool(false),
            IndexQuery::IndexAll => IndexResult::NodeIds(self.preorder()),
            IndexQuery::NodePath(nodeid) => IndexResult::NodePath(self.node_path(nodeid)),
            IndexQuery::ListChildren(nodeid) => IndexResult::Pairs(
                self.nodes
                    .get(nodeid)
                    .map(NodeAttr::childrenids)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|id| (id, String::new()))
                    .collect(),
            ),
            IndexQuery::HasChildren(nodeid) => IndexResult::Bool(
                self.nodes
                    .get(nodeid)
                    .is_some_and(|attr| !attr.childrenids().is_empty()),
            ),
            IndexQuery::HasNode(nodeid) => IndexResult::Bool(self.nodes.contains_key(nodeid)),
            IndexQuery::SearchTitles(text) => IndexResult::Pairs(self.search_titles(text)),
            IndexQuery::SearchFulltext(_) => IndexResult::NodeIds(Vec::new()),
            IndexQuery::GetAttr { nodeid, key } => {
                IndexResult::Value(self.nodes.get(nodeid).and_then(|attr| attr.get(key)).cloned())
            }
            IndexQuery::Init
            | IndexQuery::Clear
            | IndexQuery::SetIndexNeeded(_)
            | IndexQuery::Compact
            | IndexQuery::EnableFulltext(_)
            | IndexQuery::IndexAttr { .. } => IndexResult::Unit,
        };
        Ok(result)
    }
}
