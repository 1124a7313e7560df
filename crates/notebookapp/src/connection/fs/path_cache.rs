use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

/// Where a node's directory lives.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// The notebook directory itself.
    Root(PathBuf),
    /// `basename` inside the parent's directory.
    Child { parentid: String, basename: String },
    /// A directory in the orphan store, waiting for its parent.
    Orphan(PathBuf),
}

#[derive(Debug)]
struct CacheNode {
    location: Location,
    children: BTreeSet<String>,
    children_complete: bool,
}

/// In-memory map from node ids to directories.
///
/// Only holds what has been seen; a miss means "ask the index", not
/// "no such node".
#[derive(Debug, Default)]
pub struct PathCache {
    nodes: HashMap<String, CacheNode>,
}

impl PathCache {
    pub fn new() -> PathCache {
        PathCache::default()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn has_node(&self, nodeid: &str) -> bool {
        self.nodes.contains_key(nodeid)
    }

    pub fn location(&self, nodeid: &str) -> Option<&Location> {
        self.nodes.get(nodeid).map(|node| &node.location)
    }

    /// Full directory of a node, `None` unless every ancestor is cached.
    pub fn get_path(&self, nodeid: &str) -> Option<PathBuf> {
        let mut parts = Vec::new();
        let mut visited = HashSet::new();
        let mut current = nodeid;
        loop {
            if !visited.insert(current) {
                return None;
            }
            match &self.nodes.get(current)?.location {
                Location::Root(path) | Location::Orphan(path) => {
                    let mut full = path.clone();
                    full.extend(parts.iter().rev());
                    return Some(full);
                }
                Location::Child { parentid, basename } => {
                    parts.push(basename.as_str());
                    current = parentid;
                }
            }
        }
    }

    pub fn get_parentid(&self, nodeid: &str) -> Option<&str> {
        match self.location(nodeid)? {
            Location::Child { parentid, .. } => Some(parentid),
            _ => None,
        }
    }

    /// Child ids, if the children of `nodeid` have all been read.
    pub fn get_children(&self, nodeid: &str) -> Option<Vec<String>> {
        let node = self.nodes.get(nodeid)?;
        node.children_complete
            .then(|| node.children.iter().cloned().collect())
    }

    pub fn set_children_complete(&mut self, nodeid: &str, complete: bool) {
        if let Some(node) = self.nodes.get_mut(nodeid) {
            node.children_complete = complete;
        }
    }

    /// Adds or relocates a node.
    pub fn add(&mut self, nodeid: &str, location: Location) {
        self.detach(nodeid);
        if let Location::Child { parentid, .. } = &location {
            if let Some(parent) = self.nodes.get_mut(parentid) {
                parent.children.insert(nodeid.to_string());
            }
        }
        match self.nodes.get_mut(nodeid) {
            Some(node) => node.location = location,
            None => {
                self.nodes.insert(
                    nodeid.to_string(),
                    CacheNode {
                        location,
                        children: BTreeSet::new(),
                        children_complete: false,
                    },
                );
            }
        }
    }

    pub fn add_child(&mut self, nodeid: &str, parentid: &str, basename: &str) {
        self.add(
            nodeid,
            Location::Child {
                parentid: parentid.to_string(),
                basename: basename.to_string(),
            },
        );
    }

    /// Drops a node and everything cached beneath it.
    pub fn remove(&mut self, nodeid: &str) {
        self.detach(nodeid);
        let mut stack = vec![nodeid.to_string()];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend(node.children);
            }
        }
    }

    /// Removes `nodeid` from its current parent's child set.
    fn detach(&mut self, nodeid: &str) {
        let parentid = match self.location(nodeid) {
            Some(Location::Child { parentid, .. }) => parentid.clone(),
            _ => return,
        };
        if let Some(parent) = self.nodes.get_mut(&parentid) {
            parent.children.remove(nodeid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> PathCache {
        let mut cache = PathCache::new();
        cache.add("root", Location::Root(PathBuf::from("/nb")));
        cache.add_child("a", "root", "a dir");
        cache.add_child("b", "a", "b dir");
        cache
    }

    #[test]
    fn test_paths() {
        let cache = setup();
        assert_eq!(cache.get_path("b").unwrap(), PathBuf::from("/nb/a dir/b dir"));
        assert_eq!(cache.get_path("root").unwrap(), PathBuf::from("/nb"));
        assert_eq!(cache.get_parentid("b"), Some("a"));
        assert_eq!(cache.get_parentid("root"), None);
        assert_eq!(cache.get_path("zzz"), None);
    }

    #[test]
    fn test_uncached_ancestor() {
        let mut cache = setup();
        cache.add_child("x", "unknown", "x");
        assert_eq!(cache.get_path("x"), None);
    }

    #[test]
    fn test_children_complete() {
        let mut cache = setup();
        assert_eq!(cache.get_children("root"), None);
        cache.set_children_complete("root", true);
        assert_eq!(cache.get_children("root").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_move_updates_children() {
        let mut cache = setup();
        cache.set_children_complete("root", true);
        cache.set_children_complete("a", true);
        cache.add_child("b", "root", "b dir");
        assert_eq!(cache.get_children("root").unwrap(), vec!["a", "b"]);
        assert!(cache.get_children("a").unwrap().is_empty());
        assert_eq!(cache.get_path("b").unwrap(), PathBuf::from("/nb/b dir"));
    }

    #[test]
    fn test_remove_subtree() {
        let mut cache = setup();
        cache.set_children_complete("root", true);
        cache.remove("a");
        assert!(!cache.has_node("a"));
        assert!(!cache.has_node("b"));
        assert!(cache.get_children("root").unwrap().is_empty());
    }

    #[test]
    fn test_orphan_subtree() {
        let mut cache = PathCache::new();
        cache.add("o", Location::Orphan(PathBuf::from("/nb/__NOTEBOOK__/orphans/o1/23")));
        cache.add_child("c", "o", "child");
        assert_eq!(
            cache.get_path("c").unwrap(),
            PathBuf::from("/nb/__NOTEBOOK__/orphans/o1/23/child")
        );
    }
}
