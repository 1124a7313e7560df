//! Notebooks over HTTP.
//!
//! [`NotebookServer`] exposes any connection; [`HttpConnection`] speaks to it
//! and is itself a connection, so a remote notebook can be opened, searched
//! and synced like a local one.
//!
//! | Method | Path (below the notebook URL) | Action |
//! |--------|-------------------------------|--------|
//! | GET | `nodes/` | `{"rootids": [...]}` |
//! | GET, POST, PUT, DELETE, HEAD | `nodes/<nodeid>` | read, create, update, delete, exists |
//! | POST | `nodes/<nodeid>?move=<parent>&index=<n>` | move |
//! | GET | `nodes/<nodeid>/<dir>/` | `{"files": [...]}` |
//! | GET, POST, DELETE, HEAD | `nodes/<nodeid>/<file>` | read, write (`?mode=a` appends), delete, exists |
//! | PUT | `nodes/<nodeid>/<dir>/` | create directory |
//! | POST | `?index`, `?save`, `?shutdown` | index query, save, stop (localhost only) |
//!
//! Attribute records travel as JSON objects, index queries as JSON lists.
//! Errors come back as `{"kind", "message"}` with a matching status code.

mod client;
mod server;
mod title_cache;
pub mod wire;

pub use client::HttpConnection;
pub use server::NotebookServer;
pub use title_cache::NodeTitleCache;
