//! # Notebook Architecture
//!
//! `notebookapp` is a **UI-agnostic library for hierarchical notebooks**: a
//! tree of pages and folders stored as plain directories, each node carrying
//! a typed attribute file and any number of attached files. The `notebook`
//! binary is one client of it.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI (crates/notebook)                                      │
//! │  - Parses arguments, prints, installs the log subscriber    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Facade (notebook/)                                         │
//! │  - Node cache, sibling order, trash, events, prefs, icons   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Connections (connection/)                                  │
//! │  - NotebookConnection trait: node CRUD, files, index query  │
//! │  - Filesystem (authoritative), memory, HTTP client/server   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage helpers                                            │
//! │  - safefile, meta + plist (node.xml), nodedirs, index       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Principle: The Filesystem Is the Truth
//!
//! Everything in the sqlite index can be rebuilt from the node directories.
//! Index failures are logged and repaired, never allowed to fail a node
//! operation. Edits made to the directory while no program had it open are
//! detected by modification time and trigger a reindex.
//!
//! ## No I/O Assumptions in Core
//!
//! Library code never writes to stdout/stderr and never exits the process.
//! Diagnostics go through `tracing`; the subscriber is the client's choice.
//!
//! ## Module Overview
//!
//! - [`notebook`]: the facade, entry point for UI clients
//! - [`connection`]: the storage contract and its three backends
//! - [`sync`]: last-writer-wins copying between connections
//! - [`index`]: the sqlite mirror used for lookups and search
//! - [`attr`], [`meta`], [`plist`]: attribute values and their file format
//! - [`nodedirs`]: directories for arbitrary node ids
//! - [`paths`], [`safefile`], [`timestamp`], [`task`]: small shared helpers
//! - [`config`], [`init`]: configuration loading and notebook opening
//! - [`error`]: error types

pub mod attr;
pub mod config;
pub mod connection;
pub mod error;
pub mod index;
pub mod init;
pub mod meta;
pub mod nodedirs;
pub mod notebook;
pub mod paths;
pub mod plist;
pub mod safefile;
pub mod sync;
pub mod task;
pub mod timestamp;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

/// Format version written to `node.xml` and `notebook.nbk`.
pub const NOTEBOOK_FORMAT_VERSION: i64 = 5;

pub const CONTENT_TYPE_PAGE: &str = "text/xhtml+xml";
pub const CONTENT_TYPE_DIR: &str = "application/x-notebook-dir";
pub const CONTENT_TYPE_TRASH: &str = "application/x-notebook-trash";
pub const CONTENT_TYPE_UNKNOWN: &str = "application/x-notebook-unknown";

/// Implied parent of every notebook root. Never stored.
pub const UNIVERSAL_ROOT: &str = "b810760f-f246-4e42-aebb-50ce51c3d1ed";

pub const TRASH_NAME: &str = "Trash";
pub const DEFAULT_PAGE_NAME: &str = "New Page";
pub const DEFAULT_DIR_NAME: &str = "New Folder";

/// Contents of a new page's `page.html`.
pub const BLANK_NOTE: &str = "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Transitional//EN\" \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd\">\n<html xmlns=\"http://www.w3.org/1999/xhtml\"><body></body></html>\n";

/// A fresh random node id.
pub fn new_nodeid() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub use connection::{open_connection, NotebookConnection};
pub use error::{NotebookError, Result};
pub use notebook::{Node, Notebook, NotebookEvent};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_nodeids_differ() {
        let a = new_nodeid();
        assert_eq!(a.len(), 36);
        assert_ne!(a, new_nodeid());
    }

    #[test]
    fn test_blank_note_has_empty_body() {
        assert!(BLANK_NOTE.contains("<body></body>"));
        assert_eq!(index::text::read_data_as_plain_text(BLANK_NOTE).trim(), "");
    }
}
