//! # Filesystem Connection
//!
//! The notebook of record: one directory per node, nested like the tree.
//!
//! ```text
//! <notebook>/
//!   node.xml            root metadata
//!   notebook.nbk        preferences
//!   __NOTEBOOK__/
//!     index.sqlite      derived index
//!     lost_found/       data that could not be placed
//!     orphans/          nodes whose parent does not exist (yet)
//!   <child title>/
//!     node.xml
//!     page.html
//! ```
//!
//! Child directories are named after the node title when created and never
//! renamed afterwards. `parentids` and `childrenids` are derived from the
//! directory nesting and are not stored in `node.xml`, except for orphans,
//! which keep the parent they are waiting for.
//!
//! A node's directory is found through the [`PathCache`], then the index,
//! then the orphan store. Reading a node whose directory is newer than the
//! mtime recorded in the index reindexes it on the spot.

mod path_cache;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{file, FileMode, FileStream, IndexQuery, IndexResult, NotebookConnection};
use crate::attr::{AttrValue, NodeAttr};
use crate::error::{NotebookError, Result};
use crate::index::text::{match_words, read_data_as_plain_text, search_words};
use crate::index::{path_mtime, AttrIndex, Index, INDEX_FILE};
use crate::meta::{read_node_meta, read_prefs, write_node_meta};
use crate::nodedirs::NodeDirs;
use crate::paths::{
    check_filename, lost_dir, meta_dir, node_filename, node_meta_file, normalize_notebook_dirname, orphan_dir,
    pref_file, unique_filename, valid_unique_node_dir, PAGE_DATA_FILE,
};
use crate::timestamp::get_timestamp;
use crate::{CONTENT_TYPE_PAGE, DEFAULT_PAGE_NAME, NOTEBOOK_FORMAT_VERSION};

pub use path_cache::{Location, PathCache};

/// Keys derived from the directory layout instead of stored.
const DERIVED_KEYS: &[&str] = &["parentids", "childrenids"];
const ORPHAN_DERIVED_KEYS: &[&str] = &["childrenids"];

#[derive(Default)]
pub struct FsConnection {
    root: Option<PathBuf>,
    rootid: Option<String>,
    index: Option<Index>,
    cache: PathCache,
    orphans: Option<NodeDirs>,
    /// Orphan id to the parent id it is waiting for.
    orphan_parents: HashMap<String, String>,
}

impl FsConnection {
    pub fn new() -> FsConnection {
        FsConnection::default()
    }

    /// The notebook directory.
    pub fn notebook_path(&self) -> Result<&Path> {
        self.root
            .as_deref()
            .ok_or_else(|| NotebookError::Connection("connect() has not been called".into()))
    }

    fn index_mut(&mut self) -> Result<&mut Index> {
        self.index
            .as_mut()
            .ok_or_else(|| NotebookError::Connection("connect() has not been called".into()))
    }

    /// Directory holding `nodeid`.
    pub fn get_node_path(&mut self, nodeid: &str) -> Result<PathBuf> {
        if let Some(path) = self.cache.get_path(nodeid) {
            return Ok(path);
        }
        if let Some(path) = self.path_from_index(nodeid) {
            return Ok(path);
        }
        if let Some(orphans) = &self.orphans {
            if !nodeid.is_empty() && orphans.has_nodedir(nodeid)? {
                let path = orphans.get_nodedir(nodeid)?;
                if node_meta_file(&path).exists() {
                    self.cache.add(nodeid, Location::Orphan(path.clone()));
                    return Ok(path);
                }
            }
        }
        Err(NotebookError::UnknownNode(nodeid.to_string()))
    }

    /// Host path of an attached file.
    pub fn get_file(&mut self, nodeid: &str, filename: &str) -> Result<PathBuf> {
        check_filename(filename)?;
        Ok(node_filename(&self.get_node_path(nodeid)?, filename))
    }

    /// Fills the cache from the index's parent chain for `nodeid`.
    fn path_from_index(&mut self, nodeid: &str) -> Option<PathBuf> {
        let index = self.index.as_mut()?;
        let ids = index.get_node_path(nodeid)?;
        for pair in ids.windows(2) {
            let (parentid, childid) = (&pair[0], &pair[1]);
            if self.cache.has_node(childid) {
                continue;
            }
            let node = index.get_node(childid)?;
            self.cache.add_child(childid, parentid, &node.basename);
        }
        let path = self.cache.get_path(nodeid)?;
        if node_meta_file(&path).exists() {
            Some(path)
        } else {
            // The index is stale for this node.
            self.cache.remove(nodeid);
            None
        }
    }

    fn index_file(notebook: &Path) -> PathBuf {
        let index_dir = read_prefs(&pref_file(notebook))
            .ok()
            .and_then(|(_, prefs)| prefs.get("index_dir").and_then(AttrValue::as_str).map(PathBuf::from))
            .filter(|dir| !dir.as_os_str().is_empty());
        match index_dir {
            Some(dir) => dir.join(INDEX_FILE),
            None => meta_dir(notebook).join(INDEX_FILE),
        }
    }

    // Root

    /// Reads the root metadata and checks for changes made while closed.
    fn read_root(&mut self) -> Result<()> {
        let path = self.notebook_path()?.to_path_buf();
        let (attr, header) = read_node_meta(&node_meta_file(&path))?;
        let rootid = header
            .nodeid
            .or_else(|| attr.nodeid().map(str::to_string))
            .ok_or_else(|| NotebookError::Parse("root node has no id".into()))?;

        self.cache.add(&rootid, Location::Root(path.clone()));
        self.rootid = Some(rootid.clone());
        self.init_root()?;

        let index = self.index_mut()?;
        if node_mtime(&path) > index.get_node_mtime(&rootid) {
            info!(notebook = %path.display(), "Unmanaged change detected. Index needed");
            index.set_index_needed(true);
        }

        self.reunite_orphans(None)?;
        if !self.orphan_parents.is_empty() {
            warn!(
                count = self.orphan_parents.len(),
                "orphaned nodes are waiting for their parents"
            );
        }
        Ok(())
    }

    /// Creates the metadata directories and loads the orphan store.
    fn init_root(&mut self) -> Result<()> {
        let path = self.notebook_path()?.to_path_buf();
        fs::create_dir_all(meta_dir(&path))?;
        fs::create_dir_all(lost_dir(&path))?;
        let orphans = NodeDirs::open(orphan_dir(&path))?;

        self.orphan_parents.clear();
        for nodeid in orphans.iter_nodeids()? {
            let dir = orphans.get_nodedir(&nodeid)?;
            match read_node_meta(&node_meta_file(&dir)) {
                Ok((attr, _)) => match attr.parent_id() {
                    Some(parentid) => {
                        self.orphan_parents.insert(nodeid, parentid);
                    }
                    None => debug!(%nodeid, "orphan without a parent"),
                },
                Err(e) => {
                    warn!(%nodeid, error = %e, "unreadable orphan");
                    self.move_to_lostdir(&dir)?;
                    orphans.delete_nodedir(&nodeid)?;
                }
            }
        }
        self.orphans = Some(orphans);
        Ok(())
    }

    /// Moves a file or directory out of the way into `lost_found/`.
    fn move_to_lostdir(&self, path: &Path) -> Result<PathBuf> {
        let lostdir = lost_dir(self.notebook_path()?);
        fs::create_dir_all(&lostdir)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "lost".to_string());
        let target = unique_filename(&lostdir, &name, "", "-", 2);
        info!(from = %path.display(), to = %target.display(), "moving data to lost_found");
        fs::rename(path, &target).map_err(|e| {
            NotebookError::Connection(format!("unable to store lost file '{}': {}", path.display(), e))
        })?;
        Ok(target)
    }

    /// Moves orphans into place once their parent exists. `parentid`
    /// restricts this to the children of one node.
    fn reunite_orphans(&mut self, parentid: Option<&str>) -> Result<()> {
        let waiting: Vec<(String, String)> = self
            .orphan_parents
            .iter()
            .filter(|(_, wanted)| parentid.is_none_or(|p| p == wanted.as_str()))
            .map(|(orphan, wanted)| (orphan.clone(), wanted.clone()))
            .collect();
        for (orphan, wanted) in waiting {
            if self.has_node(&wanted)? {
                info!(nodeid = %orphan, parentid = %wanted, "reuniting orphan with its parent");
                self.move_node(&orphan, &wanted, None)?;
            }
        }
        Ok(())
    }

    // Attributes

    /// Fills in the schema keys. Returns false if a stored key was missing.
    fn clean_attr(nodeid: &str, attr: &mut NodeAttr) -> bool {
        let now = get_timestamp();
        let defaults: [(&str, AttrValue); 6] = [
            ("nodeid", nodeid.into()),
            ("version", NOTEBOOK_FORMAT_VERSION.into()),
            ("parentids", AttrValue::Array(Vec::new())),
            ("childrenids", AttrValue::Array(Vec::new())),
            ("created_time", now.into()),
            ("modified_time", now.into()),
        ];
        let mut was_clean = true;
        for (key, value) in defaults {
            if !attr.contains_key(key) {
                attr.insert(key, value);
                if !DERIVED_KEYS.contains(&key) {
                    was_clean = false;
                }
            }
        }
        if attr.nodeid() != Some(nodeid) {
            attr.insert("nodeid", nodeid);
            was_clean = false;
        }
        was_clean
    }

    fn write_attr(path: &Path, nodeid: &str, attr: &NodeAttr, orphan: bool) -> Result<()> {
        let skip = if orphan { ORPHAN_DERIVED_KEYS } else { DERIVED_KEYS };
        write_node_meta(&node_meta_file(path), nodeid, attr, skip)
    }

    /// Reads a node from its directory, reindexing it if it changed on disk.
    fn load_node(&mut self, nodeid: &str, force_index: bool) -> Result<NodeAttr> {
        let path = self.get_node_path(nodeid)?;
        let location = self
            .cache
            .location(nodeid)
            .cloned()
            .ok_or_else(|| NotebookError::UnknownNode(nodeid.to_string()))?;
        let metafile = node_meta_file(&path);
        if !metafile.exists() {
            return Err(NotebookError::UnknownNode(nodeid.to_string()));
        }

        let (mut attr, _) = read_node_meta(&metafile)?;
        let orphan = matches!(location, Location::Orphan(_));
        if !Self::clean_attr(nodeid, &mut attr) {
            Self::write_attr(&path, nodeid, &attr, orphan)?;
        }

        let mtime = node_mtime(&path);
        let indexed = self.index_mut()?.get_node_mtime(nodeid);
        if force_index || mtime > indexed {
            if !force_index && indexed > 0.0 {
                info!(path = %path.display(), "Unmanaged change detected. Reindexing");
            }
            self.cache.set_children_complete(nodeid, false);
            self.index_node(nodeid, &location, &attr, mtime, &path)?;
        }

        match &location {
            Location::Root(_) => {
                attr.insert("parentids", AttrValue::Array(Vec::new()));
            }
            Location::Child { parentid, .. } => {
                attr.insert("parentids", vec![parentid.clone()]);
            }
            Location::Orphan(_) => {}
        }
        let children = self.list_children_nodeids(nodeid, &path)?;
        attr.insert("childrenids", children);
        Ok(attr)
    }

    /// Child ids from the cache, or by reading each child directory.
    fn list_children_nodeids(&mut self, nodeid: &str, path: &Path) -> Result<Vec<String>> {
        if let Some(children) = self.cache.get_children(nodeid) {
            return Ok(children);
        }

        let entries = fs::read_dir(path).map_err(|e| {
            NotebookError::Connection(format!(
                "cannot read folder contents '{}': {}",
                path.display(),
                e
            ))
        })?;
        let mut names: Vec<String> = entries
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with("__"))
            .collect();
        names.sort();

        let mut children = Vec::new();
        for name in names {
            let metafile = node_meta_file(&path.join(&name));
            if !metafile.is_file() {
                continue;
            }
            match read_node_meta(&metafile) {
                Ok((attr, header)) => {
                    if let Some(childid) = header.nodeid.or_else(|| attr.nodeid().map(str::to_string)) {
                        self.cache.add_child(&childid, nodeid, &name);
                        children.push(childid);
                    }
                }
                Err(e) => warn!(path = %metafile.display(), error = %e, "error reading child node"),
            }
        }
        children.sort();
        self.cache.set_children_complete(nodeid, true);
        Ok(children)
    }

    /// Writes a node into the index. Orphans stay out of it.
    fn index_node(&mut self, nodeid: &str, location: &Location, attr: &NodeAttr, mtime: f64, path: &Path) -> Result<()> {
        let (parentid, basename) = match location {
            Location::Root(_) => (None, String::new()),
            Location::Child { parentid, basename } => (Some(parentid.as_str()), basename.clone()),
            Location::Orphan(_) => return Ok(()),
        };
        let index = self.index_mut()?;
        let body = if index.fulltext_active() && attr.content_type() == Some(CONTENT_TYPE_PAGE) {
            fs::read_to_string(path.join(PAGE_DATA_FILE))
                .map(|data| read_data_as_plain_text(&data))
                .unwrap_or_default()
        } else {
            String::new()
        };
        index.add_node(nodeid, parentid, &basename, attr, mtime, &body);
        Ok(())
    }

    /// Records a parent's directory mtime after a managed change to its
    /// children, so it is not mistaken for an external one.
    fn touch_parent(&mut self, parentid: &str) -> Result<()> {
        let path = self.get_node_path(parentid)?;
        let mtime = node_mtime(&path);
        let index = self.index_mut()?;
        if index.get_node_mtime(parentid) > 0.0 {
            index.set_node_mtime(parentid, mtime);
        }
        Ok(())
    }

    // Search

    /// Walks the notebook in preorder matching every word of `text`
    /// against titles and page text.
    ///
    /// Yields `Some(nodeid)` for a match and `None` for each other node, so
    /// a caller can stop between nodes.
    pub fn scan_fulltext(&mut self, text: &str) -> FulltextScan<'_> {
        let stack = self.rootid.clone().into_iter().collect();
        FulltextScan {
            conn: self,
            words: search_words(text),
            stack,
        }
    }

    fn search_fulltext(&mut self, text: &str) -> Result<Vec<String>> {
        if let Some(ids) = self.index_mut()?.search_fulltext(text) {
            return Ok(ids);
        }
        info!("manual full-text search");
        let mut ids = Vec::new();
        for hit in self.scan_fulltext(text) {
            if let Some(nodeid) = hit? {
                ids.push(nodeid);
            }
        }
        Ok(ids)
    }
}

impl NotebookConnection for FsConnection {
    fn connect(&mut self, url: &str) -> Result<()> {
        let location = url.strip_prefix("file://").unwrap_or(url);
        let requested = Path::new(location);
        if !requested.exists() {
            fs::create_dir_all(requested)?;
        }
        let path = normalize_notebook_dirname(requested)?;

        self.cache.clear();
        self.rootid = None;
        self.orphans = None;
        self.orphan_parents.clear();
        self.index = Some(Index::open(Self::index_file(&path))?);
        self.root = Some(path.clone());

        if node_meta_file(&path).exists() {
            self.read_root()?;
        }
        debug!(notebook = %path.display(), "connected");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.save()?;
        if let Some(mut index) = self.index.take() {
            index.close()?;
        }
        self.root = None;
        self.rootid = None;
        self.orphans = None;
        self.orphan_parents.clear();
        self.cache.clear();
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        if let (Some(rootid), Some(index)) = (&self.rootid, self.index.as_mut()) {
            index.save(rootid);
        }
        Ok(())
    }

    fn create_node(&mut self, nodeid: &str, attr: &NodeAttr) -> Result<()> {
        let notebook = self.notebook_path()?.to_path_buf();
        if nodeid.is_empty() {
            return Err(NotebookError::InvalidNodeId(nodeid.to_string()));
        }
        let parentid = attr.parent_id();
        match (&self.rootid, &parentid) {
            (None, Some(_)) => {
                return Err(NotebookError::Connection(
                    "root node must have parentids = []".into(),
                ))
            }
            (Some(_), None) => {
                return Err(NotebookError::Connection(
                    "notebook already has a root node".into(),
                ))
            }
            _ => {}
        }
        if self.has_node(nodeid)? {
            return Err(NotebookError::NodeExists(nodeid.to_string()));
        }

        let mut attr = attr.clone();
        Self::clean_attr(nodeid, &mut attr);

        let (path, location) = match &parentid {
            None => (notebook.clone(), Location::Root(notebook.clone())),
            Some(parentid) if self.has_node(parentid)? => {
                let parent_path = self.get_node_path(parentid)?;
                let title = Some(attr.title()).filter(|t| !t.is_empty()).unwrap_or(DEFAULT_PAGE_NAME);
                let path = valid_unique_node_dir(&parent_path, title);
                let basename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let location = Location::Child {
                    parentid: parentid.clone(),
                    basename,
                };
                (path, location)
            }
            Some(parentid) => {
                let orphans = self
                    .orphans
                    .as_ref()
                    .ok_or_else(|| NotebookError::Connection("orphan store is not open".into()))?;
                warn!(%nodeid, %parentid, "parent does not exist, storing node as an orphan");
                let path = orphans.get_nodedir(nodeid)?;
                (path.clone(), Location::Orphan(path))
            }
        };

        let orphan = matches!(location, Location::Orphan(_));
        fs::create_dir_all(&path)
            .map_err(|e| NotebookError::Connection(format!("cannot create node '{}': {}", nodeid, e)))?;
        Self::write_attr(&path, nodeid, &attr, orphan)?;

        let is_root = matches!(location, Location::Root(_));
        if is_root {
            self.rootid = Some(nodeid.to_string());
            self.init_root()?;
        }
        self.cache.add(nodeid, location.clone());
        if !is_root {
            self.cache.set_children_complete(nodeid, true);
        }
        self.index_node(nodeid, &location, &attr, node_mtime(&path), &path)?;

        match location {
            Location::Orphan(_) => {
                if let Some(parentid) = parentid {
                    self.orphan_parents.insert(nodeid.to_string(), parentid);
                }
            }
            Location::Child { parentid, .. } => {
                self.touch_parent(&parentid)?;
                self.reunite_orphans(Some(nodeid))?;
            }
            Location::Root(_) => self.reunite_orphans(Some(nodeid))?,
        }
        Ok(())
    }

    fn read_node(&mut self, nodeid: &str) -> Result<NodeAttr> {
        self.load_node(nodeid, false)
    }

    fn update_node(&mut self, nodeid: &str, attr: &NodeAttr) -> Result<()> {
        let path = self.get_node_path(nodeid)?;
        if !node_meta_file(&path).exists() {
            return Err(NotebookError::UnknownNode(nodeid.to_string()));
        }
        let location = self
            .cache
            .location(nodeid)
            .cloned()
            .ok_or_else(|| NotebookError::UnknownNode(nodeid.to_string()))?;

        let mut attr = attr.clone();
        Self::clean_attr(nodeid, &mut attr);
        Self::write_attr(&path, nodeid, &attr, matches!(location, Location::Orphan(_)))?;
        self.index_node(nodeid, &location, &attr, node_mtime(&path), &path)
    }

    fn delete_node(&mut self, nodeid: &str) -> Result<()> {
        if self.rootid.as_deref() == Some(nodeid) {
            return Err(NotebookError::Connection("cannot delete the root node".into()));
        }
        let path = self.get_node_path(nodeid)?;
        if !node_meta_file(&path).exists() {
            return Err(NotebookError::UnknownNode(nodeid.to_string()));
        }
        let location = self.cache.location(nodeid).cloned();

        match &location {
            Some(Location::Orphan(_)) => {
                if let Some(orphans) = &self.orphans {
                    orphans.delete_nodedir(nodeid)?;
                }
                self.orphan_parents.remove(nodeid);
            }
            _ => fs::remove_dir_all(&path).map_err(|e| {
                NotebookError::Connection(format!("cannot delete node '{}': {}", nodeid, e))
            })?,
        }

        self.cache.remove(nodeid);
        self.index_mut()?.remove_node(nodeid);
        if let Some(Location::Child { parentid, .. }) = location {
            self.touch_parent(&parentid)?;
        }
        Ok(())
    }

    fn has_node(&mut self, nodeid: &str) -> Result<bool> {
        if nodeid.is_empty() {
            return Ok(false);
        }
        match self.get_node_path(nodeid) {
            Ok(path) => Ok(node_meta_file(&path).exists()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn get_rootid(&mut self) -> Result<String> {
        self.notebook_path()?;
        self.rootid
            .clone()
            .ok_or_else(|| NotebookError::UnknownNode("notebook has no root node".into()))
    }

    /// Renames the node directory under the new parent.
    ///
    /// Sibling order is kept in each node's `order` attribute, so `index`
    /// is not used here.
    fn move_node(&mut self, nodeid: &str, parentid: &str, _index: Option<usize>) -> Result<()> {
        if self.rootid.as_deref() == Some(nodeid) {
            return Err(NotebookError::Connection("cannot move the root node".into()));
        }
        let path = self.get_node_path(nodeid)?;
        if !node_meta_file(&path).exists() {
            return Err(NotebookError::UnknownNode(nodeid.to_string()));
        }
        if !self.has_node(parentid)? {
            return Err(NotebookError::UnknownNode(parentid.to_string()));
        }

        let mut ancestor = Some(parentid.to_string());
        while let Some(id) = ancestor {
            if id == nodeid {
                return Err(NotebookError::Connection(format!(
                    "cannot move node '{}' into itself or a descendant",
                    nodeid
                )));
            }
            self.get_node_path(&id)?;
            ancestor = self.cache.get_parentid(&id).map(str::to_string);
        }

        let old_location = self.cache.location(nodeid).cloned();
        if let Some(Location::Child { parentid: old_parent, .. }) = &old_location {
            if old_parent == parentid {
                return Ok(());
            }
        }

        let (attr, _) = read_node_meta(&node_meta_file(&path))?;
        let title = Some(attr.title()).filter(|t| !t.is_empty()).unwrap_or(DEFAULT_PAGE_NAME);
        let parent_path = self.get_node_path(parentid)?;
        let new_path = valid_unique_node_dir(&parent_path, title);
        fs::rename(&path, &new_path).map_err(|e| {
            NotebookError::Connection(format!(
                "cannot move '{}' to '{}': {}",
                path.display(),
                new_path.display(),
                e
            ))
        })?;

        let was_orphan = matches!(old_location, Some(Location::Orphan(_)));
        if was_orphan {
            // Orphans store their parent; rewrite without it.
            if let Err(e) = Self::write_attr(&new_path, nodeid, &attr, false) {
                if let Err(restore) = fs::rename(&new_path, &path) {
                    warn!(nodeid, error = %restore, "could not restore node after failed move");
                }
                self.index_mut()?.set_index_needed(true);
                return Err(NotebookError::Connection(format!(
                    "cannot move node '{}': {}",
                    nodeid, e
                )));
            }
            if let Some(orphans) = &self.orphans {
                orphans.delete_nodedir(nodeid)?;
            }
            self.orphan_parents.remove(nodeid);
        }

        let basename = new_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let location = Location::Child {
            parentid: parentid.to_string(),
            basename,
        };
        self.cache.add(nodeid, location.clone());
        self.index_node(nodeid, &location, &attr, node_mtime(&new_path), &new_path)?;
        if let Some(Location::Child { parentid: old_parent, .. }) = old_location {
            self.touch_parent(&old_parent)?;
        }
        self.touch_parent(parentid)
    }

    fn open_file(&mut self, nodeid: &str, filename: &str, mode: FileMode) -> Result<FileStream> {
        let path = self.get_node_path(nodeid)?;
        file::open_file(&path, nodeid, filename, mode)
    }

    fn delete_file(&mut self, nodeid: &str, filename: &str) -> Result<()> {
        let path = self.get_node_path(nodeid)?;
        file::delete_file(&path, nodeid, filename)
    }

    fn create_dir(&mut self, nodeid: &str, filename: &str) -> Result<()> {
        let path = self.get_node_path(nodeid)?;
        file::create_dir(&path, nodeid, filename)
    }

    fn list_dir(&mut self, nodeid: &str, filename: &str) -> Result<Vec<String>> {
        let path = self.get_node_path(nodeid)?;
        file::list_dir(&path, nodeid, filename)
    }

    fn has_file(&mut self, nodeid: &str, filename: &str) -> Result<bool> {
        let path = self.get_node_path(nodeid)?;
        Ok(file::has_file(&path, filename))
    }

    fn move_file(&mut self, nodeid1: &str, filename1: &str, nodeid2: &str, filename2: &str) -> Result<()> {
        let path1 = self.get_node_path(nodeid1)?;
        let path2 = self.get_node_path(nodeid2)?;
        file::move_file(&path1, nodeid1, filename1, &path2, filename2)
    }

    fn copy_file(
        &mut self,
        nodeid1: Option<&str>,
        filename1: &str,
        nodeid2: Option<&str>,
        filename2: &str,
    ) -> Result<()> {
        let source = match nodeid1 {
            Some(nodeid) => self.get_file(nodeid, filename1)?,
            None => PathBuf::from(filename1),
        };
        let dest = match nodeid2 {
            Some(nodeid) => self.get_file(nodeid, filename2)?,
            None => PathBuf::from(filename2),
        };
        file::copy_file(&source, (nodeid1.unwrap_or(""), filename1), &dest)
    }

    fn index(&mut self, query: &IndexQuery) -> Result<IndexResult> {
        let result = match query {
            IndexQuery::Init => {
                self.index_mut()?.init()?;
                IndexResult::Unit
            }
            IndexQuery::Clear => {
                self.index_mut()?.clear()?;
                IndexResult::Unit
            }
            IndexQuery::IndexNeeded => IndexResult::Bool(self.index_mut()?.index_needed()),
            IndexQuery::SetIndexNeeded(needed) => {
                self.index_mut()?.set_index_needed(*needed);
                IndexResult::Unit
            }
            IndexQuery::IndexAll => {
                let ids = self.index_all()?.collect::<Result<Vec<_>>>()?;
                IndexResult::NodeIds(ids)
            }
            IndexQuery::Compact => {
                self.index_mut()?.compact();
                IndexResult::Unit
            }
            IndexQuery::HasFulltext => IndexResult::Bool(self.index_mut()?.has_fulltext()),
            IndexQuery::EnableFulltext(enabled) => {
                self.index_mut()?.enable_fulltext(*enabled);
                IndexResult::Unit
            }
            IndexQuery::NodePath(nodeid) => IndexResult::NodePath(self.index_mut()?.get_node_path(nodeid)),
            IndexQuery::ListChildren(nodeid) => IndexResult::Pairs(self.index_mut()?.list_children(nodeid)),
            IndexQuery::HasChildren(nodeid) => IndexResult::Bool(self.index_mut()?.has_children(nodeid)),
            IndexQuery::HasNode(nodeid) => IndexResult::Bool(self.index_mut()?.has_node(nodeid)),
            IndexQuery::SearchTitles(query) => IndexResult::Pairs(self.index_mut()?.search_titles(query)),
            IndexQuery::SearchFulltext(text) => IndexResult::NodeIds(self.search_fulltext(text)?),
            IndexQuery::GetAttr { nodeid, key } => IndexResult::Value(self.index_mut()?.get_attr(nodeid, key)),
            IndexQuery::IndexAttr {
                key,
                datatype,
                index_value,
            } => {
                self.index_mut()?
                    .add_attr(AttrIndex::new(key, *datatype, *index_value));
                IndexResult::Unit
            }
        };
        Ok(result)
    }

    fn index_all(&mut self) -> Result<Box<dyn Iterator<Item = Result<String>> + '_>> {
        let rootid = self.get_rootid()?;
        let notebook = self.notebook_path()?.to_path_buf();
        self.cache.clear();
        self.cache.add(&rootid, Location::Root(notebook));
        Ok(Box::new(IndexAll {
            conn: self,
            stack: vec![rootid],
            finished: false,
            failed: false,
        }))
    }
}

/// Lazy preorder reindex of the whole notebook.
///
/// Dropping it before the end leaves the index marked as needing a
/// reindex.
pub struct IndexAll<'a> {
    conn: &'a mut FsConnection,
    stack: Vec<String>,
    finished: bool,
    failed: bool,
}

impl Iterator for IndexAll<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Result<String>> {
        let Some(nodeid) = self.stack.pop() else {
            if !self.finished {
                self.finished = true;
                if let Some(index) = self.conn.index.as_mut() {
                    index.set_index_needed(self.failed);
                }
            }
            return None;
        };

        match self.conn.load_node(&nodeid, true) {
            Ok(attr) => {
                self.stack.extend(attr.childrenids().into_iter().rev());
                Some(Ok(nodeid))
            }
            Err(e) => {
                warn!(%nodeid, error = %e, "could not index node");
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for IndexAll<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(index) = self.conn.index.as_mut() {
                index.set_index_needed(true);
            }
        }
    }
}

/// Manual full-text search, see [`FsConnection::scan_fulltext`].
pub struct FulltextScan<'a> {
    conn: &'a mut FsConnection,
    words: Vec<String>,
    stack: Vec<String>,
}

impl Iterator for FulltextScan<'_> {
    type Item = Result<Option<String>>;

    fn next(&mut self) -> Option<Result<Option<String>>> {
        let nodeid = self.stack.pop()?;
        let attr = match self.conn.load_node(&nodeid, false) {
            Ok(attr) => attr,
            Err(e) => return Some(Err(e)),
        };
        self.stack.extend(attr.childrenids().into_iter().rev());

        let mut text = attr.title().to_string();
        if let Ok(mut page) = self.conn.open_file(&nodeid, PAGE_DATA_FILE, FileMode::Read) {
            let mut data = String::new();
            if std::io::Read::read_to_string(&mut page, &mut data).is_ok() {
                text.push('\n');
                text.push_str(&read_data_as_plain_text(&data));
            }
        }
        if match_words(&text, &self.words) {
            Some(Ok(Some(nodeid)))
        } else {
            Some(Ok(None))
        }
    }
}

/// Change time of a node: the newer of its directory and its `node.xml`,
/// which an in-place edit touches without touching the directory.
fn node_mtime(path: &Path) -> f64 {
    path_mtime(path).max(path_mtime(&node_meta_file(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttrType;
    use std::io::Write;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FsConnection) {
        let dir = TempDir::new().unwrap();
        let mut conn = FsConnection::new();
        conn.connect(dir.path().join("nb").to_str().unwrap()).unwrap();
        conn.create_node("root", &NodeAttr::new().with("title", "Root")).unwrap();
        (dir, conn)
    }

    fn child(conn: &mut FsConnection, nodeid: &str, parent: &str, title: &str) {
        let attr = NodeAttr::new()
            .with("title", title)
            .with("parentids", vec![parent.to_string()]);
        conn.create_node(nodeid, &attr).unwrap();
    }

    #[test]
    fn test_create_layout() {
        let (dir, mut conn) = setup();
        child(&mut conn, "c1", "root", "My Child");
        let nb = dir.path().join("nb");
        assert!(nb.join("node.xml").is_file());
        assert!(nb.join("my child").join("node.xml").is_file());
        assert!(nb.join("__NOTEBOOK__").join("lost_found").is_dir());
        assert!(nb.join("__NOTEBOOK__").join("orphans").is_dir());

        let text = fs::read_to_string(nb.join("my child").join("node.xml")).unwrap();
        assert!(!text.contains("parentids"));
    }

    #[test]
    fn test_read_derives_graph() {
        let (_dir, mut conn) = setup();
        child(&mut conn, "c1", "root", "A");
        child(&mut conn, "c2", "root", "A");
        child(&mut conn, "g1", "c1", "G");

        let root = conn.read_node("root").unwrap();
        assert_eq!(root.childrenids(), vec!["c1", "c2"]);
        assert!(root.parentids().is_empty());
        let c1 = conn.read_node("c1").unwrap();
        assert_eq!(c1.parentids(), vec!["root"]);
        assert_eq!(c1.childrenids(), vec!["g1"]);
        assert_eq!(c1.get_i64("version"), Some(NOTEBOOK_FORMAT_VERSION));
        assert_eq!(conn.get_node_path("c2").unwrap().file_name().unwrap(), "a 2");
    }

    #[test]
    fn test_errors() {
        let (_dir, mut conn) = setup();
        assert!(matches!(
            conn.create_node("", &NodeAttr::new()),
            Err(NotebookError::InvalidNodeId(_))
        ));
        child(&mut conn, "c1", "root", "A");
        let dup = NodeAttr::new().with("parentids", vec!["root".to_string()]);
        assert!(matches!(conn.create_node("c1", &dup), Err(NotebookError::NodeExists(_))));
        assert!(matches!(conn.read_node("nope"), Err(NotebookError::UnknownNode(_))));
        assert!(matches!(conn.delete_node("root"), Err(NotebookError::Connection(_))));
        assert!(matches!(
            conn.create_node("root2", &NodeAttr::new()),
            Err(NotebookError::Connection(_))
        ));
    }

    #[test]
    fn test_delete_twice() {
        let (_dir, mut conn) = setup();
        child(&mut conn, "c1", "root", "A");
        child(&mut conn, "g1", "c1", "G");
        conn.delete_node("c1").unwrap();
        assert!(!conn.has_node("c1").unwrap());
        assert!(!conn.has_node("g1").unwrap());
        assert!(matches!(conn.delete_node("c1"), Err(NotebookError::UnknownNode(_))));
        assert!(conn.read_node("root").unwrap().childrenids().is_empty());
    }

    #[test]
    fn test_update_keeps_directory() {
        let (dir, mut conn) = setup();
        child(&mut conn, "c1", "root", "Before");
        let mut attr = conn.read_node("c1").unwrap();
        attr.insert("title", "After");
        conn.update_node("c1", &attr).unwrap();
        conn.update_node("c1", &attr).unwrap();
        assert!(dir.path().join("nb").join("before").is_dir());
        assert_eq!(conn.read_node("c1").unwrap().title(), "After");
    }

    #[test]
    fn test_move_node() {
        let (dir, mut conn) = setup();
        child(&mut conn, "a", "root", "A");
        child(&mut conn, "b", "root", "B");
        child(&mut conn, "a1", "a", "A1");

        conn.move_node("a", "b", None).unwrap();
        assert!(dir.path().join("nb").join("b").join("a").join("a1").is_dir());
        assert_eq!(conn.read_node("b").unwrap().childrenids(), vec!["a"]);
        assert_eq!(conn.read_node("root").unwrap().childrenids(), vec!["b"]);
        assert_eq!(conn.read_node("a1").unwrap().parentids(), vec!["a"]);
        assert_eq!(
            conn.index(&IndexQuery::NodePath("a1".into())).unwrap().into_node_path().unwrap(),
            vec!["root", "b", "a", "a1"]
        );
    }

    #[test]
    fn test_move_into_descendant_fails() {
        let (dir, mut conn) = setup();
        child(&mut conn, "a", "root", "A");
        child(&mut conn, "a1", "a", "A1");
        assert!(matches!(conn.move_node("a", "a1", None), Err(NotebookError::Connection(_))));
        assert!(matches!(conn.move_node("a", "a", None), Err(NotebookError::Connection(_))));
        assert!(dir.path().join("nb").join("a").join("a1").is_dir());
        assert_eq!(conn.read_node("a").unwrap().parentids(), vec!["root"]);
    }

    #[test]
    fn test_orphan_reunited() {
        let (dir, mut conn) = setup();
        child(&mut conn, "kid", "root", "Kid");
        let orphan = NodeAttr::new()
            .with("title", "Lost")
            .with("parentids", vec!["later".to_string()]);
        conn.create_node("orphan", &orphan).unwrap();
        assert!(conn.has_node("orphan").unwrap());
        assert_eq!(conn.read_node("orphan").unwrap().parentids(), vec!["later"]);

        child(&mut conn, "later", "kid", "Later");
        assert_eq!(conn.read_node("later").unwrap().childrenids(), vec!["orphan"]);
        assert!(dir.path().join("nb").join("kid").join("later").join("lost").is_dir());
    }

    #[test]
    fn test_orphan_survives_reopen() {
        let (dir, mut conn) = setup();
        let orphan = NodeAttr::new().with("parentids", vec!["later".to_string()]);
        conn.create_node("orphan", &orphan).unwrap();
        conn.close().unwrap();

        let mut conn = FsConnection::new();
        conn.connect(dir.path().join("nb").to_str().unwrap()).unwrap();
        assert!(conn.has_node("orphan").unwrap());
        child(&mut conn, "later", "root", "Later");
        assert_eq!(conn.read_node("orphan").unwrap().parentids(), vec!["later"]);
    }

    #[test]
    fn test_files() {
        let (_dir, mut conn) = setup();
        child(&mut conn, "c1", "root", "A");
        let mut out = conn.open_file("c1", "page.html", FileMode::Write).unwrap();
        out.write_all(b"<html><body>hi</body></html>").unwrap();
        out.close().unwrap();
        assert!(conn.has_file("c1", "page.html").unwrap());
        assert_eq!(conn.list_dir("c1", "/").unwrap(), vec!["/page.html"]);

        conn.copy_file(Some("c1"), "page.html", Some("root"), "copy.html").unwrap();
        conn.move_file("root", "copy.html", "c1", "moved.html").unwrap();
        assert!(!conn.has_file("root", "copy.html").unwrap());
        assert_eq!(
            conn.open_file("c1", "moved.html", FileMode::Read).unwrap().read_text().unwrap(),
            "<html><body>hi</body></html>"
        );
        // child node directories are not attached files
        assert!(conn.list_dir("root", "/").unwrap().is_empty());
    }

    #[test]
    fn test_index_all_and_titles() {
        let (_dir, mut conn) = setup();
        conn.index(&IndexQuery::IndexAttr {
            key: "title".into(),
            datatype: AttrType::String,
            index_value: true,
        })
        .unwrap();
        child(&mut conn, "c1", "root", "Alpha");
        child(&mut conn, "c2", "c1", "Beta");

        let ids = conn.index(&IndexQuery::IndexAll).unwrap().into_nodeids();
        assert_eq!(ids, vec!["root", "c1", "c2"]);
        assert!(!conn.index(&IndexQuery::IndexNeeded).unwrap().as_bool());
        let hits = conn.index(&IndexQuery::SearchTitles("bet".into())).unwrap().into_pairs();
        assert_eq!(hits, vec![("c2".to_string(), "Beta".to_string())]);
    }

    #[test]
    fn test_abandoned_index_all() {
        let (_dir, mut conn) = setup();
        child(&mut conn, "c1", "root", "Alpha");
        conn.index(&IndexQuery::IndexAll).unwrap();
        {
            let mut walk = conn.index_all().unwrap();
            walk.next();
        }
        assert!(conn.index(&IndexQuery::IndexNeeded).unwrap().as_bool());
    }
}
