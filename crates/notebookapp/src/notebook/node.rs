use crate::attr::{AttrValue, NodeAttr};
use crate::{CONTENT_TYPE_DIR, CONTENT_TYPE_PAGE, CONTENT_TYPE_TRASH};

/// Snapshot of one node as last read from the connection.
///
/// Nodes refer to each other by id only; resolve them through
/// [`super::Notebook::get_node`].
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    attr: NodeAttr,
}

impl Node {
    pub(crate) fn new(attr: NodeAttr) -> Node {
        Node { attr }
    }

    pub fn attr(&self) -> &NodeAttr {
        &self.attr
    }

    pub fn into_attr(self) -> NodeAttr {
        self.attr
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attr.get(key)
    }

    pub fn nodeid(&self) -> &str {
        self.attr.nodeid().unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.attr.title()
    }

    pub fn content_type(&self) -> &str {
        self.attr.content_type().unwrap_or(CONTENT_TYPE_DIR)
    }

    pub fn parent_id(&self) -> Option<String> {
        self.attr.parent_id()
    }

    pub fn childrenids(&self) -> Vec<String> {
        self.attr.childrenids()
    }

    /// Position among siblings; unordered nodes sort last.
    pub fn order(&self) -> i64 {
        self.attr.get_i64("order").unwrap_or(i64::MAX)
    }

    pub fn created_time(&self) -> i64 {
        self.attr.get_i64("created_time").unwrap_or(0)
    }

    pub fn modified_time(&self) -> i64 {
        self.attr.modified_time()
    }

    pub fn icon(&self) -> Option<&str> {
        self.attr.get_str("icon")
    }

    pub fn payload_filename(&self) -> Option<&str> {
        self.attr.get_str("payload_filename")
    }

    pub fn is_page(&self) -> bool {
        self.content_type() == CONTENT_TYPE_PAGE
    }

    pub fn is_dir(&self) -> bool {
        self.content_type() == CONTENT_TYPE_DIR
    }

    pub fn is_trash(&self) -> bool {
        self.content_type() == CONTENT_TYPE_TRASH
    }

    pub fn is_root(&self) -> bool {
        self.attr.parentids().is_empty()
    }

    pub fn has_children(&self) -> bool {
        !self.attr.childrenids().is_empty()
    }
}
