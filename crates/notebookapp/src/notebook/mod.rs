//! # Notebook Facade
//!
//! [`Notebook`] is the entry point for working with a notebook as a tree of
//! nodes. It sits on top of any [`NotebookConnection`] and adds the
//! behaviour the storage contract leaves out.
//!
//! ## Role and Responsibilities
//!
//! - **Caching**: nodes are read through the connection once and kept as
//!   attribute snapshots keyed by node id. Parents are never held by
//!   reference; [`Node::parent_id`] is resolved through the cache on demand.
//! - **Sibling order**: the `order` attribute of each child is kept dense
//!   (`0..n`) after every insert, move and delete. New nodes go before the
//!   trash when appended to the root.
//! - **Change notification**: every mutation emits a [`NotebookEvent`] to
//!   subscribed listeners, in commit order.
//! - **Trash**: a top-level node of content type trash is created on open if
//!   missing. [`Notebook::trash`] soft-deletes into it; the trash itself can
//!   be neither deleted nor moved out of the root.
//! - **Preferences and icons**: see [`NotebookPrefs`] and the icon methods
//!   (`install_icon`, `install_icons`, `uninstall_icon`, `icons`).
//!
//! ## What the Facade Does NOT Do
//!
//! - **Storage**: directory naming, metadata files and the index belong to
//!   the connection.
//! - **Presentation**: methods return node snapshots and ids, never text.
//!
//! ## Renames and Moves
//!
//! `rename` changes the `title` attribute only. The node directory keeps its
//! name, so titles and directory names drift apart over time.

mod events;
mod icons;
mod node;
mod prefs;

pub use events::{ListenerId, Listeners, NotebookEvent};
pub use node::Node;
pub use prefs::{ExternalApp, NotebookPrefs, DEFAULT_FONT};

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::attr::{apply_defaults, AttrType, AttrValue, NodeAttr};
use crate::connection::{open_connection, FileMode, FileStream, IndexQuery, NotebookConnection};
use crate::error::{NotebookError, Result};
use crate::index::text::read_data_as_plain_text;
use crate::paths::{
    guess_file_mimetype, unique_filename_list, NOTEBOOK_META_DIR, PAGE_DATA_FILE, PREF_FILE,
};
use crate::task::{stopped, Task};
use crate::timestamp::get_timestamp;
use crate::{
    new_nodeid, BLANK_NOTE, CONTENT_TYPE_DIR, CONTENT_TYPE_PAGE, CONTENT_TYPE_TRASH,
    NOTEBOOK_FORMAT_VERSION, TRASH_NAME,
};

/// Keys a duplicate never inherits from its original.
const DUPLICATE_SKIP: &[&str] = &[
    "nodeid",
    "order",
    "parentids",
    "childrenids",
    "created_time",
    "modified_time",
];

/// Keys maintained by the connection and the facade.
const READ_ONLY_KEYS: &[&str] = &["nodeid", "parentids", "childrenids"];

pub struct Notebook {
    conn: Box<dyn NotebookConnection>,
    url: String,
    rootid: String,
    trashid: Option<String>,
    nodes: HashMap<String, NodeAttr>,
    prefs: NotebookPrefs,
    prefs_dirty: bool,
    listeners: Listeners,
}

impl Notebook {
    fn with_connection(conn: Box<dyn NotebookConnection>, url: &str, rootid: String) -> Notebook {
        Notebook {
            conn,
            url: url.to_string(),
            rootid,
            trashid: None,
            nodes: HashMap::new(),
            prefs: NotebookPrefs::default(),
            prefs_dirty: false,
            listeners: Listeners::default(),
        }
    }

    /// Creates a new notebook at `url` with a root titled `title`.
    pub fn create(url: &str, title: &str) -> Result<Notebook> {
        Notebook::create_on(open_connection(url)?, url, title)
    }

    /// Creates a new notebook on an already connected, empty connection.
    pub fn create_on(mut conn: Box<dyn NotebookConnection>, url: &str, title: &str) -> Result<Notebook> {
        if let Ok(rootid) = conn.get_rootid() {
            return Err(NotebookError::NodeExists(format!(
                "'{}' already holds a notebook (root {})",
                url, rootid
            )));
        }

        let rootid = new_nodeid();
        let attr = new_node_attr(&rootid, None, CONTENT_TYPE_DIR, title);
        conn.create_node(&rootid, &attr)?;
        info!(%url, %rootid, "created notebook");

        let mut notebook = Notebook::with_connection(conn, url, rootid.clone());
        notebook.nodes.insert(rootid, attr);
        notebook.write_prefs()?;
        notebook.init_index()?;
        notebook.init_trash()?;
        Ok(notebook)
    }

    /// Opens an existing notebook at `url`.
    pub fn load(url: &str) -> Result<Notebook> {
        Notebook::load_from(open_connection(url)?, url)
    }

    pub fn load_from(mut conn: Box<dyn NotebookConnection>, url: &str) -> Result<Notebook> {
        let rootid = conn.get_rootid()?;
        let root = conn.read_node(&rootid)?;
        if let Some(version) = root.get_i64("version") {
            if version > NOTEBOOK_FORMAT_VERSION {
                return Err(NotebookError::VersionMismatch {
                    found: version,
                    supported: NOTEBOOK_FORMAT_VERSION,
                });
            }
        }

        let mut notebook = Notebook::with_connection(conn, url, rootid.clone());
        notebook.nodes.insert(rootid.clone(), root);
        notebook.read_prefs()?;
        notebook.init_index()?;
        notebook.init_trash()?;
        notebook.notify(NotebookEvent::changed(&rootid, true));
        Ok(notebook)
    }

    /// Writes pending preferences and flushes the connection.
    pub fn save(&mut self) -> Result<()> {
        if self.prefs_dirty {
            self.write_prefs()?;
        }
        self.conn.save()
    }

    pub fn close(mut self) -> Result<()> {
        self.save()?;
        self.conn.close()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn rootid(&self) -> &str {
        &self.rootid
    }

    pub fn trashid(&self) -> Option<&str> {
        self.trashid.as_deref()
    }

    pub fn connection(&mut self) -> &mut dyn NotebookConnection {
        &mut *self.conn
    }

    // Events

    pub fn subscribe(&mut self, f: impl FnMut(&NotebookEvent) + Send + 'static) -> ListenerId {
        self.listeners.subscribe(f)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    fn notify(&mut self, event: NotebookEvent) {
        self.listeners.notify(&event);
    }

    // Nodes

    pub fn root(&mut self) -> Result<Node> {
        let rootid = self.rootid.clone();
        self.get_node(&rootid)
    }

    /// Looks a node up by id, reading it through the connection on a miss.
    pub fn get_node(&mut self, nodeid: &str) -> Result<Node> {
        if let Some(attr) = self.nodes.get(nodeid) {
            return Ok(Node::new(attr.clone()));
        }
        let attr = self.conn.read_node(nodeid)?;
        self.nodes.insert(nodeid.to_string(), attr.clone());
        Ok(Node::new(attr))
    }

    pub fn has_node(&mut self, nodeid: &str) -> Result<bool> {
        if self.nodes.contains_key(nodeid) {
            return Ok(true);
        }
        self.conn.has_node(nodeid)
    }

    /// Children of `nodeid` in sibling order.
    pub fn children(&mut self, nodeid: &str) -> Result<Vec<Node>> {
        let childrenids = self.get_node(nodeid)?.childrenids();
        let mut children = childrenids
            .iter()
            .map(|id| self.get_node(id))
            .collect::<Result<Vec<_>>>()?;
        children.sort_by_key(Node::order);
        Ok(children)
    }

    fn child_ids(&mut self, nodeid: &str) -> Result<Vec<String>> {
        Ok(self
            .children(nodeid)?
            .iter()
            .map(|node| node.nodeid().to_string())
            .collect())
    }

    /// Drops cached snapshots so the next access rereads them.
    pub fn invalidate(&mut self, nodeid: Option<&str>) {
        match nodeid {
            Some(nodeid) => {
                self.nodes.remove(nodeid);
            }
            None => self.nodes.clear(),
        }
    }

    /// True if `nodeid` is `ancestor` or lies below it.
    pub fn is_descendant(&mut self, nodeid: &str, ancestor: &str) -> Result<bool> {
        let mut seen = HashSet::new();
        let mut current = Some(nodeid.to_string());
        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            if !seen.insert(id.clone()) {
                break;
            }
            current = self.get_node(&id)?.parent_id();
        }
        Ok(false)
    }

    /// True if the node lies below the trash.
    pub fn in_trash(&mut self, nodeid: &str) -> Result<bool> {
        let Some(trashid) = self.trashid.clone() else {
            return Ok(false);
        };
        match self.get_node(nodeid)?.parent_id() {
            Some(parentid) => self.is_descendant(&parentid, &trashid),
            None => Ok(false),
        }
    }

    /// Adds a child node and returns its id.
    ///
    /// `index` positions it among its siblings; `None` appends (before the
    /// trash, under the root). Pages start with a blank `page.html`.
    pub fn new_child(
        &mut self,
        parentid: &str,
        content_type: &str,
        title: &str,
        index: Option<usize>,
    ) -> Result<String> {
        let nodeid = self.create_child(parentid, content_type, title, index)?;
        self.notify(NotebookEvent::Added {
            nodeid: nodeid.clone(),
            parentid: parentid.to_string(),
        });
        self.notify(NotebookEvent::changed(parentid, true));
        Ok(nodeid)
    }

    /// [`Notebook::new_child`] without notifying.
    fn create_child(
        &mut self,
        parentid: &str,
        content_type: &str,
        title: &str,
        index: Option<usize>,
    ) -> Result<String> {
        self.get_node(parentid)?;
        let nodeid = new_nodeid();
        let attr = new_node_attr(&nodeid, Some(parentid), content_type, title);
        self.conn.create_node(&nodeid, &attr)?;
        self.nodes.insert(nodeid.clone(), attr);

        if content_type == CONTENT_TYPE_PAGE {
            if let Err(err) = self.write_file(&nodeid, PAGE_DATA_FILE, BLANK_NOTE.as_bytes()) {
                self.discard_node(&nodeid);
                return Err(err);
            }
        }

        self.nodes.remove(parentid);
        self.insert_child(parentid, &nodeid, index)?;
        debug!(%nodeid, %parentid, %content_type, "created node");
        Ok(nodeid)
    }

    /// Removes a half-created node, logging rather than failing.
    fn discard_node(&mut self, nodeid: &str) {
        if let Err(err) = self.conn.delete_node(nodeid) {
            warn!(%nodeid, error = %err, "could not remove incomplete node");
        }
        self.nodes.remove(nodeid);
    }

    /// Places `nodeid` at `index` among the children of `parentid` and
    /// renumbers them.
    fn insert_child(&mut self, parentid: &str, nodeid: &str, index: Option<usize>) -> Result<()> {
        let mut siblings: Vec<String> = self
            .child_ids(parentid)?
            .into_iter()
            .filter(|id| id != nodeid)
            .collect();
        let position = match index {
            Some(i) => i.min(siblings.len()),
            None => {
                let trash_last = siblings.last().is_some_and(|id| Some(id) == self.trashid.as_ref());
                if trash_last {
                    siblings.len() - 1
                } else {
                    siblings.len()
                }
            }
        };
        siblings.insert(position, nodeid.to_string());
        self.renumber(&siblings)
    }

    fn renumber(&mut self, ids: &[String]) -> Result<()> {
        for (i, id) in ids.iter().enumerate() {
            let order = i as i64;
            let node = self.get_node(id)?;
            if node.attr().get_i64("order") != Some(order) {
                let mut attr = node.into_attr();
                attr.insert("order", order);
                self.store_attr(id, attr)?;
            }
        }
        Ok(())
    }

    fn store_attr(&mut self, nodeid: &str, attr: NodeAttr) -> Result<()> {
        self.conn.update_node(nodeid, &attr)?;
        self.nodes.insert(nodeid.to_string(), attr);
        Ok(())
    }

    /// Sets one attribute. Ids and the tree keys are read-only.
    pub fn set_attr(&mut self, nodeid: &str, key: &str, value: impl Into<AttrValue>) -> Result<()> {
        if READ_ONLY_KEYS.contains(&key) {
            return Err(NotebookError::Connection(format!(
                "attribute '{}' cannot be set directly",
                key
            )));
        }
        let mut attr = self.get_node(nodeid)?.into_attr();
        attr.insert(key, value);
        self.store_attr(nodeid, attr)?;
        self.notify(NotebookEvent::changed(nodeid, false));
        Ok(())
    }

    /// Stamps the node's `modified_time` with the current time.
    pub fn mark_modified(&mut self, nodeid: &str) -> Result<()> {
        self.set_attr(nodeid, "modified_time", get_timestamp())
    }

    /// Changes the title attribute; the node directory keeps its name.
    pub fn rename(&mut self, nodeid: &str, title: &str) -> Result<()> {
        let node = self.get_node(nodeid)?;
        if node.title() == title {
            return Ok(());
        }
        let mut attr = node.into_attr();
        attr.insert("title", title);
        self.store_attr(nodeid, attr)?;
        self.notify(NotebookEvent::changed(nodeid, false));
        Ok(())
    }

    /// Moves a node under `parentid`, or reorders it when the parent is
    /// unchanged.
    pub fn move_node(&mut self, nodeid: &str, parentid: &str, index: Option<usize>) -> Result<()> {
        if nodeid == self.rootid {
            return Err(NotebookError::Connection("the notebook root cannot be moved".into()));
        }
        let node = self.get_node(nodeid)?;
        if node.is_trash() && parentid != self.rootid {
            return Err(NotebookError::Connection(
                "the Trash folder must be a top-level folder".into(),
            ));
        }
        self.get_node(parentid)?;
        if self.is_descendant(parentid, nodeid)? {
            return Err(NotebookError::Connection(format!(
                "cannot move '{}' into its own subtree",
                nodeid
            )));
        }
        let old_parent = node
            .parent_id()
            .ok_or_else(|| NotebookError::Connection(format!("node '{}' has no parent", nodeid)))?;

        if old_parent == parentid {
            // Reordering within the parent: the node's own slot goes away.
            let index = index.map(|i| if node.order() < i as i64 { i - 1 } else { i });
            self.insert_child(parentid, nodeid, index)?;
            self.notify(NotebookEvent::changed(parentid, true));
            return Ok(());
        }

        self.conn.move_node(nodeid, parentid, index)?;
        for id in [nodeid, old_parent.as_str(), parentid] {
            self.nodes.remove(id);
        }
        let remaining = self.child_ids(&old_parent)?;
        self.renumber(&remaining)?;
        self.insert_child(parentid, nodeid, index)?;

        self.notify(NotebookEvent::changed(&old_parent, true));
        self.notify(NotebookEvent::changed(parentid, true));
        Ok(())
    }

    /// Copies a node (and with `recurse` its subtree) under `parentid`.
    ///
    /// Copies get fresh ids and timestamps, keep every other attribute and
    /// all attached files, and record the original in `duplicate_of`.
    pub fn duplicate(
        &mut self,
        nodeid: &str,
        parentid: &str,
        index: Option<usize>,
        recurse: bool,
        task: Option<&Task>,
    ) -> Result<String> {
        let mut created = HashSet::new();
        let newid = self.duplicate_node(nodeid, parentid, index, recurse, task, &mut created)?;
        self.notify(NotebookEvent::Added {
            nodeid: newid.clone(),
            parentid: parentid.to_string(),
        });
        self.notify(NotebookEvent::changed(parentid, true));
        Ok(newid)
    }

    fn duplicate_node(
        &mut self,
        nodeid: &str,
        parentid: &str,
        index: Option<usize>,
        recurse: bool,
        task: Option<&Task>,
        created: &mut HashSet<String>,
    ) -> Result<String> {
        let node = self.get_node(nodeid)?;
        // A second trash would confuse the trash lookup.
        let content_type = if node.is_trash() {
            CONTENT_TYPE_DIR
        } else {
            node.content_type()
        };
        let newid = self.create_child(parentid, content_type, node.title(), index)?;
        created.insert(newid.clone());

        let mut attr = self.get_node(&newid)?.into_attr();
        for (key, value) in node.attr().iter() {
            if !DUPLICATE_SKIP.contains(&key.as_str()) && key != "content_type" {
                attr.insert(key, value.clone());
            }
        }
        attr.insert("duplicate_of", nodeid);
        self.store_attr(&newid, attr)?;

        if let Err(err) = self.copy_node_files(nodeid, &newid) {
            warn!(%nodeid, %newid, error = %err, "could not copy all files of duplicated node");
        }

        if recurse {
            for child in self.child_ids(nodeid)? {
                if stopped(task) {
                    info!(%nodeid, "duplicate stopped");
                    break;
                }
                if created.contains(&child) {
                    continue;
                }
                self.duplicate_node(&child, &newid, None, true, task, created)?;
            }
        }
        Ok(newid)
    }

    fn copy_node_files(&mut self, from: &str, to: &str) -> Result<()> {
        let is_root = from == self.rootid;
        for entry in self.conn.list_dir(from, "")? {
            if entry.starts_with("__") || (is_root && entry == PREF_FILE) {
                continue;
            }
            self.conn.copy_file(Some(from), &entry, Some(to), &entry)?;
        }
        Ok(())
    }

    /// Deletes a node and its subtree for good.
    pub fn delete(&mut self, nodeid: &str) -> Result<()> {
        if self.trashid.as_deref() == Some(nodeid) {
            return Err(NotebookError::Connection("the Trash folder cannot be deleted".into()));
        }
        if nodeid == self.rootid {
            return Err(NotebookError::Connection("the notebook root cannot be deleted".into()));
        }
        let parentid = self.get_node(nodeid)?.parent_id();
        let doomed = self.cached_subtree(nodeid);
        self.conn.delete_node(nodeid)?;
        for id in doomed {
            self.nodes.remove(&id);
        }

        if let Some(parentid) = parentid {
            self.nodes.remove(&parentid);
            let remaining = self.child_ids(&parentid)?;
            self.renumber(&remaining)?;
            self.notify(NotebookEvent::Removed {
                nodeid: nodeid.to_string(),
                parentid: parentid.clone(),
            });
            self.notify(NotebookEvent::changed(&parentid, true));
        }
        Ok(())
    }

    /// Ids of `nodeid` and every cached node below it.
    fn cached_subtree(&self, nodeid: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut stack = vec![nodeid.to_string()];
        while let Some(id) = stack.pop() {
            if let Some(attr) = self.nodes.get(&id) {
                stack.extend(attr.childrenids());
            }
            found.push(id);
        }
        found
    }

    /// Moves a node to the trash, or deletes it if it is already there.
    pub fn trash(&mut self, nodeid: &str) -> Result<()> {
        if self.in_trash(nodeid)? {
            return self.delete(nodeid);
        }
        let trashid = self.ensure_trash()?;
        self.move_node(nodeid, &trashid, None)
    }

    /// Deletes everything in the trash.
    pub fn empty_trash(&mut self) -> Result<()> {
        let trashid = self.ensure_trash()?;
        for child in self.child_ids(&trashid)?.into_iter().rev() {
            self.delete(&child)?;
        }
        Ok(())
    }

    fn ensure_trash(&mut self) -> Result<String> {
        if let Some(trashid) = &self.trashid {
            return Ok(trashid.clone());
        }
        self.init_trash()
    }

    fn init_trash(&mut self) -> Result<String> {
        let rootid = self.rootid.clone();
        let existing = self.children(&rootid)?.into_iter().find(Node::is_trash);
        let trashid = match existing {
            Some(trash) => trash.nodeid().to_string(),
            None => {
                info!("creating Trash folder");
                self.create_child(&rootid, CONTENT_TYPE_TRASH, TRASH_NAME, None)?
            }
        };
        self.trashid = Some(trashid.clone());
        Ok(trashid)
    }

    /// Adds a child holding a copy of a local file as its payload.
    ///
    /// The content type is guessed from the file extension.
    pub fn attach_file(&mut self, path: &Path, parentid: &str, index: Option<usize>) -> Result<String> {
        if path.is_dir() {
            return Err(NotebookError::File(format!(
                "cannot attach directory '{}'",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(NotebookError::UnknownFile(path.display().to_string()));
        }
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| NotebookError::File(format!("no file name in '{}'", path.display())))?;
        let content_type = guess_file_mimetype(&filename);

        let nodeid = self.create_child(parentid, content_type, &filename, index)?;
        if let Err(err) = self.set_payload(&nodeid, path, &filename) {
            self.discard_node(&nodeid);
            self.nodes.remove(parentid);
            return Err(err);
        }
        self.notify(NotebookEvent::Added {
            nodeid: nodeid.clone(),
            parentid: parentid.to_string(),
        });
        self.notify(NotebookEvent::changed(parentid, true));
        Ok(nodeid)
    }

    fn set_payload(&mut self, nodeid: &str, path: &Path, filename: &str) -> Result<()> {
        let (stem, ext) = match filename.rfind('.') {
            Some(i) if i > 0 => filename.split_at(i),
            _ => (filename, ""),
        };
        let taken = self.conn.list_dir(nodeid, "")?;
        let new_filename = unique_filename_list(taken, stem, ext, " ", 2);
        self.conn
            .copy_file(None, &path.to_string_lossy(), Some(nodeid), &new_filename)?;

        let mut attr = self.get_node(nodeid)?.into_attr();
        attr.insert("payload_filename", new_filename);
        self.store_attr(nodeid, attr)
    }

    // Files

    pub fn open_file(&mut self, nodeid: &str, filename: &str, mode: FileMode) -> Result<FileStream> {
        self.conn.open_file(nodeid, filename, mode)
    }

    pub fn list_files(&mut self, nodeid: &str, dir: &str) -> Result<Vec<String>> {
        self.conn.list_dir(nodeid, dir)
    }

    /// Replaces a file with `data` in one commit.
    pub fn write_file(&mut self, nodeid: &str, filename: &str, data: &[u8]) -> Result<()> {
        let mut out = self.conn.open_file(nodeid, filename, FileMode::Write)?;
        if let Err(err) = out.write_all(data) {
            out.discard()?;
            return Err(NotebookError::file(nodeid, filename, err));
        }
        out.close()
    }

    /// Body text of a page with markup removed.
    pub fn page_text(&mut self, nodeid: &str) -> Result<String> {
        let data = self
            .conn
            .open_file(nodeid, PAGE_DATA_FILE, FileMode::Read)?
            .read_text()?;
        Ok(read_data_as_plain_text(&data))
    }

    // Index

    fn init_index(&mut self) -> Result<()> {
        for (key, index_value) in [("icon", false), ("title", true)] {
            self.conn.index(&IndexQuery::IndexAttr {
                key: key.to_string(),
                datatype: AttrType::String,
                index_value,
            })?;
        }
        Ok(())
    }

    /// `(nodeid, title)` of nodes whose title contains `text`.
    pub fn search_titles(&mut self, text: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .conn
            .index(&IndexQuery::SearchTitles(text.to_string()))?
            .into_pairs())
    }

    /// Ids of pages containing every word of `text`.
    pub fn search_fulltext(&mut self, text: &str) -> Result<Vec<String>> {
        Ok(self
            .conn
            .index(&IndexQuery::SearchFulltext(text.to_string()))?
            .into_nodeids())
    }

    pub fn has_fulltext(&mut self) -> Result<bool> {
        Ok(self.conn.index(&IndexQuery::HasFulltext)?.as_bool())
    }

    pub fn enable_fulltext(&mut self, enabled: bool) -> Result<()> {
        self.conn.index(&IndexQuery::EnableFulltext(enabled))?;
        Ok(())
    }

    pub fn index_needed(&mut self) -> Result<bool> {
        Ok(self.conn.index(&IndexQuery::IndexNeeded)?.as_bool())
    }

    /// Ids from the root down to `nodeid`, if the index knows it.
    pub fn get_node_path(&mut self, nodeid: &str) -> Result<Option<Vec<String>>> {
        Ok(self
            .conn
            .index(&IndexQuery::NodePath(nodeid.to_string()))?
            .into_node_path())
    }

    pub fn get_attr_by_id(&mut self, nodeid: &str, key: &str) -> Result<Option<AttrValue>> {
        Ok(self
            .conn
            .index(&IndexQuery::GetAttr {
                nodeid: nodeid.to_string(),
                key: key.to_string(),
            })?
            .into_value())
    }

    /// Rebuilds the index from storage, returning how many nodes were
    /// visited. A stopped task leaves the index marked as needing a rebuild.
    pub fn reindex(&mut self, task: Option<&Task>) -> Result<usize> {
        let mut count = 0;
        for nodeid in self.conn.index_all()? {
            if stopped(task) {
                info!(count, "reindex stopped");
                break;
            }
            let nodeid = nodeid?;
            debug!(%nodeid, "indexed");
            count += 1;
        }
        self.nodes.clear();
        Ok(count)
    }

    // Preferences

    pub fn prefs(&self) -> &NotebookPrefs {
        &self.prefs
    }

    /// Mutable access; the change is written on the next [`Notebook::save`].
    pub fn prefs_mut(&mut self) -> &mut NotebookPrefs {
        self.prefs_dirty = true;
        &mut self.prefs
    }

    pub fn set_quick_pick_icons(&mut self, icons: Vec<String>) {
        self.prefs_mut().quick_pick_icons = icons;
    }

    fn read_prefs(&mut self) -> Result<()> {
        let rootid = self.rootid.clone();
        if !self.conn.has_file(&rootid, PREF_FILE)? {
            warn!(url = %self.url, "notebook has no preference file, using defaults");
            self.prefs = NotebookPrefs::default();
            self.prefs_dirty = true;
            return Ok(());
        }
        let text = self.conn.open_file(&rootid, PREF_FILE, FileMode::Read)?.read_text()?;
        self.prefs = NotebookPrefs::parse(&text)?;
        self.prefs_dirty = false;
        Ok(())
    }

    fn write_prefs(&mut self) -> Result<()> {
        let rootid = self.rootid.clone();
        self.conn.create_dir(&rootid, &format!("{}/", NOTEBOOK_META_DIR))?;
        self.conn.create_dir(&rootid, icons::ICON_DIR)?;
        let text = self.prefs.format();
        self.write_file(&rootid, PREF_FILE, text.as_bytes())?;
        self.prefs_dirty = false;
        Ok(())
    }
}

impl std::fmt::Debug for Notebook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notebook")
            .field("url", &self.url)
            .field("rootid", &self.rootid)
            .field("trashid", &self.trashid)
            .field("cached", &self.nodes.len())
            .finish()
    }
}

/// Attributes of a brand new node.
fn new_node_attr(nodeid: &str, parentid: Option<&str>, content_type: &str, title: &str) -> NodeAttr {
    let now = get_timestamp();
    let parentids: Vec<String> = parentid.into_iter().map(str::to_string).collect();
    let mut attr = NodeAttr::new()
        .with("nodeid", nodeid)
        .with("content_type", content_type)
        .with("title", title)
        .with("parentids", parentids)
        .with("childrenids", Vec::<String>::new())
        .with("version", NOTEBOOK_FORMAT_VERSION)
        .with("created_time", now)
        .with("modified_time", now);
    apply_defaults(&mut attr);
    attr
}
