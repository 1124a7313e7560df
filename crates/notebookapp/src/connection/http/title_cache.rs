use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::attr::NodeAttr;

/// Client-side copy of every node title, so title searches do not need a
/// round trip once the cache has been filled.
#[derive(Debug, Default)]
pub struct NodeTitleCache {
    /// Lowercased title to node ids.
    titles: BTreeMap<String, BTreeSet<String>>,
    nodeids: HashMap<String, String>,
    complete: bool,
}

impl NodeTitleCache {
    pub fn new() -> NodeTitleCache {
        NodeTitleCache::default()
    }

    /// True once every title in the notebook has been loaded.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn set_complete(&mut self, complete: bool) {
        self.complete = complete;
    }

    /// Records the title carried by `attr`, dropping any previous one.
    pub fn update_attr(&mut self, attr: &NodeAttr) {
        let Some(nodeid) = attr.nodeid() else {
            return;
        };
        self.remove(nodeid);
        if let Some(title) = attr.get_str("title") {
            self.add(nodeid, title);
        }
    }

    pub fn add(&mut self, nodeid: &str, title: &str) {
        self.remove(nodeid);
        self.titles
            .entry(title.to_lowercase())
            .or_default()
            .insert(nodeid.to_string());
        self.nodeids.insert(nodeid.to_string(), title.to_string());
    }

    pub fn remove(&mut self, nodeid: &str) {
        let Some(old) = self.nodeids.remove(nodeid) else {
            return;
        };
        let key = old.to_lowercase();
        if let Some(ids) = self.titles.get_mut(&key) {
            ids.remove(nodeid);
            if ids.is_empty() {
                self.titles.remove(&key);
            }
        }
    }

    /// `(nodeid, title)` for every title containing `query`, ignoring case.
    /// Exact matches come first.
    pub fn get(&self, query: &str) -> Vec<(String, String)> {
        let needle = query.to_lowercase();
        let mut hits: Vec<(String, String)> = self
            .titles
            .iter()
            .filter(|(title, _)| title.contains(&needle))
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| self.nodeids.get(id).map(|title| (id.clone(), title.clone())))
            .collect();
        hits.sort_by_key(|(_, title)| title != query);
        hits
    }

    pub fn clear(&mut self) {
        self.titles.clear();
        self.nodeids.clear();
        self.complete = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let mut cache = NodeTitleCache::new();
        cache.add("n1", "Shopping List");
        cache.add("n2", "list");
        cache.add("n3", "Other");
        assert_eq!(
            cache.get("list"),
            vec![
                ("n2".to_string(), "list".to_string()),
                ("n1".to_string(), "Shopping List".to_string()),
            ]
        );
        assert!(cache.get("zzz").is_empty());
    }

    #[test]
    fn test_update_replaces_title() {
        let mut cache = NodeTitleCache::new();
        cache.update_attr(&NodeAttr::new().with("nodeid", "n1").with("title", "Old"));
        cache.update_attr(&NodeAttr::new().with("nodeid", "n1").with("title", "New"));
        assert!(cache.get("old").is_empty());
        assert_eq!(cache.get("new").len(), 1);

        cache.update_attr(&NodeAttr::new().with("nodeid", "n1"));
        assert!(cache.get("new").is_empty());
    }

    #[test]
    fn test_clear_resets_complete() {
        let mut cache = NodeTitleCache::new();
        cache.set_complete(true);
        cache.add("n1", "x");
        cache.clear();
        assert!(!cache.is_complete());
        assert!(cache.get("x").is_empty());
    }
}
