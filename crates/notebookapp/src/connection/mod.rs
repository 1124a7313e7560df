//! # Notebook Connections
//!
//! A connection is the storage contract every notebook backend implements:
//! node CRUD, per-node attached files, and a typed index query router.
//!
//! ## Backends
//!
//! | Backend | URL | Notes |
//! |---------|-----|-------|
//! | [`FsConnection`] | a path or `file://path` | authoritative on-disk notebook with a sqlite index |
//! | [`MemConnection`] | `mem:` | dictionaries only, answers queries by linear scan |
//! | [`HttpConnection`] | `http://host:port/notebook/` | remote notebook served by [`http::NotebookServer`] |
//!
//! All three are used through `Box<dyn NotebookConnection>`; [`open_connection`]
//! picks one from a URL.
//!
//! ## Attached files
//!
//! Files are addressed by `(nodeid, filename)` with `/`-separated paths
//! relative to the node. A trailing `/` names a directory and `""` or `/`
//! names the node directory itself. Writes go through [`FileStream`], which
//! only publishes the written bytes on [`FileStream::close`].

pub mod file;
pub mod fs;
pub mod http;
pub mod mem;
mod query;

use std::io::{self, Read, Write};
use std::path::Path;

use crate::attr::NodeAttr;
use crate::error::{NotebookError, Result};
use crate::paths::path_join;
use crate::safefile::SafeFile;

pub use fs::FsConnection;
pub use http::HttpConnection;
pub use mem::MemConnection;
pub use query::{IndexQuery, IndexResult};

/// How an attached file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
    Append,
}

impl FileMode {
    pub fn parse(mode: &str) -> Result<FileMode> {
        match mode {
            "r" | "rb" => Ok(FileMode::Read),
            "w" | "wb" => Ok(FileMode::Write),
            "a" | "ab" => Ok(FileMode::Append),
            other => Err(NotebookError::File(format!(
                "mode must be 'r', 'w', or 'a', got {:?}",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileMode::Read => "r",
            FileMode::Write => "w",
            FileMode::Append => "a",
        }
    }
}

/// A writer whose output only becomes visible once committed.
pub trait CommitWrite: Write + Send {
    fn commit(self: Box<Self>) -> Result<()>;

    /// Drops the written bytes.
    fn discard(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl CommitWrite for SafeFile {
    fn commit(self: Box<Self>) -> Result<()> {
        Ok((*self).close()?)
    }

    fn discard(self: Box<Self>) -> Result<()> {
        Ok((*self).discard()?)
    }
}

impl CommitWrite for std::fs::File {
    fn commit(mut self: Box<Self>) -> Result<()> {
        self.flush()?;
        self.sync_all()?;
        Ok(())
    }
}

/// An open attached file.
pub enum FileStream {
    Reader(Box<dyn Read + Send>),
    Writer(Box<dyn CommitWrite>),
}

impl FileStream {
    pub fn reader(r: impl Read + Send + 'static) -> FileStream {
        FileStream::Reader(Box::new(r))
    }

    pub fn writer(w: impl CommitWrite + 'static) -> FileStream {
        FileStream::Writer(Box::new(w))
    }

    /// Commits a writer. Closing a reader just releases it.
    pub fn close(self) -> Result<()> {
        match self {
            FileStream::Reader(_) => Ok(()),
            FileStream::Writer(w) => w.commit(),
        }
    }

    /// Abandons a writer without touching the target.
    pub fn discard(self) -> Result<()> {
        match self {
            FileStream::Reader(_) => Ok(()),
            FileStream::Writer(w) => w.discard(),
        }
    }

    pub fn read_all(mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn read_text(self) -> Result<String> {
        String::from_utf8(self.read_all()?)
            .map_err(|e| NotebookError::File(format!("file is not UTF-8: {}", e)))
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileStream::Reader(r) => r.read(buf),
            FileStream::Writer(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "file is open for writing",
            )),
        }
    }
}

impl Write for FileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileStream::Writer(w) => w.write(buf),
            FileStream::Reader(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "file is open for reading",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileStream::Writer(w) => w.flush(),
            FileStream::Reader(_) => Ok(()),
        }
    }
}

/// Storage contract shared by every notebook backend.
///
/// One caller mutates a connection at a time; every method takes `&mut self`.
pub trait NotebookConnection: Send {
    /// Opens the notebook at `url`, creating empty storage if needed.
    fn connect(&mut self, url: &str) -> Result<()>;

    /// Flushes state and releases resources.
    fn close(&mut self) -> Result<()>;

    /// Flushes unsynced state.
    fn save(&mut self) -> Result<()>;

    // Nodes

    fn create_node(&mut self, nodeid: &str, attr: &NodeAttr) -> Result<()>;

    fn read_node(&mut self, nodeid: &str) -> Result<NodeAttr>;

    /// Rewrites a node's attributes. Never moves or renames its storage.
    fn update_node(&mut self, nodeid: &str, attr: &NodeAttr) -> Result<()>;

    /// Removes a node and its whole subtree.
    fn delete_node(&mut self, nodeid: &str) -> Result<()>;

    fn has_node(&mut self, nodeid: &str) -> Result<bool>;

    fn get_rootid(&mut self) -> Result<String>;

    /// Reparents `nodeid` under `parentid`.
    ///
    /// `index` positions the node among its new siblings in `childrenids`;
    /// `None` appends. Fails with [`NotebookError::Connection`] when
    /// `parentid` is the node itself or one of its descendants.
    fn move_node(&mut self, nodeid: &str, parentid: &str, index: Option<usize>) -> Result<()>;

    // Files

    fn open_file(&mut self, nodeid: &str, filename: &str, mode: FileMode) -> Result<FileStream>;

    /// Removes a file, or a directory tree when `filename` ends in `/`.
    /// Deleting something that does not exist succeeds.
    fn delete_file(&mut self, nodeid: &str, filename: &str) -> Result<()>;

    fn create_dir(&mut self, nodeid: &str, filename: &str) -> Result<()>;

    /// Lists a directory as full node-relative paths; directories end in `/`.
    fn list_dir(&mut self, nodeid: &str, filename: &str) -> Result<Vec<String>>;

    fn has_file(&mut self, nodeid: &str, filename: &str) -> Result<bool>;

    /// Renames a file, replacing anything at the destination.
    fn move_file(&mut self, nodeid1: &str, filename1: &str, nodeid2: &str, filename2: &str) -> Result<()> {
        if nodeid1 == nodeid2 && filename1.trim_start_matches('/') == filename2.trim_start_matches('/') {
            return if self.has_file(nodeid1, filename1)? {
                Ok(())
            } else {
                Err(NotebookError::UnknownFile(format!("'{}' '{}'", nodeid1, filename1)))
            };
        }
        self.copy_file(Some(nodeid1), filename1, Some(nodeid2), filename2)?;
        self.delete_file(nodeid1, filename1)
    }

    /// Copies a file or, for a `/`-terminated source, a directory tree.
    ///
    /// A `None` node id means the filename is a path on the local filesystem.
    fn copy_file(
        &mut self,
        nodeid1: Option<&str>,
        filename1: &str,
        nodeid2: Option<&str>,
        filename2: &str,
    ) -> Result<()> {
        copy_file_generic(self, nodeid1, filename1, nodeid2, filename2)
    }

    // Index

    fn index(&mut self, query: &IndexQuery) -> Result<IndexResult>;

    /// Walks the whole tree in preorder, reindexing as it goes.
    ///
    /// The walk is lazy. A caller that stops early leaves the index marked
    /// as needing a reindex.
    fn index_all(&mut self) -> Result<Box<dyn Iterator<Item = Result<String>> + '_>> {
        let ids = self.index(&IndexQuery::IndexAll)?.into_nodeids();
        Ok(Box::new(ids.into_iter().map(Ok)))
    }
}

/// File copy written only in terms of the connection contract.
pub fn copy_file_generic<C: NotebookConnection + ?Sized>(
    conn: &mut C,
    nodeid1: Option<&str>,
    filename1: &str,
    nodeid2: Option<&str>,
    filename2: &str,
) -> Result<()> {
    if filename1.ends_with('/') {
        match nodeid2 {
            Some(n2) => conn.create_dir(n2, filename2)?,
            None => std::fs::create_dir_all(filename2)?,
        }
        let entries = match nodeid1 {
            Some(n1) => conn.list_dir(n1, filename1)?,
            None => local_list_dir(Path::new(filename1))?
                .into_iter()
                .map(|name| format!("{}/{}", filename1.trim_end_matches('/'), name))
                .collect(),
        };
        for entry in entries {
            let rel = entry
                .strip_prefix(filename1)
                .or_else(|| entry.strip_prefix(filename1.trim_start_matches('/')))
                .unwrap_or(&entry)
                .trim_start_matches('/');
            let dest = if entry.ends_with('/') {
                format!("{}/", path_join(&[filename2, rel]))
            } else {
                path_join(&[filename2, rel])
            };
            copy_file_generic(conn, nodeid1, &entry, nodeid2, &dest)?;
        }
        return Ok(());
    }

    let mut input: Box<dyn Read> = match nodeid1 {
        Some(n1) => Box::new(conn.open_file(n1, filename1, FileMode::Read)?),
        None => Box::new(std::fs::File::open(filename1)?),
    };
    let mut data = Vec::new();
    input.read_to_end(&mut data)?;
    drop(input);

    match nodeid2 {
        Some(n2) => {
            let mut out = conn.open_file(n2, filename2, FileMode::Write)?;
            out.write_all(&data)?;
            out.close()
        }
        None => Ok(crate::safefile::write_atomic(filename2, &data)?),
    }
}

/// Directory entries of a local directory, with `/` on subdirectories.
fn local_list_dir(path: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(path)?.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.path().is_dir() {
            names.push(format!("{}/", name));
        } else {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Opens a connection chosen by the URL scheme.
///
/// `http://` and `https://` give an HTTP client, `mem:` an in-memory
/// notebook, and anything else (a bare path or `file://`) the filesystem.
pub fn open_connection(url: &str) -> Result<Box<dyn NotebookConnection>> {
    let mut conn: Box<dyn NotebookConnection> = match connection_scheme(url) {
        "http" | "https" => Box::new(HttpConnection::new()),
        "mem" => Box::new(MemConnection::new()),
        _ => Box::new(FsConnection::new()),
    };
    conn.connect(url)?;
    Ok(conn)
}

fn connection_scheme(url: &str) -> &str {
    if url.starts_with("mem:") {
        return "mem";
    }
    match url.find("://") {
        Some(i) => &url[..i],
        None => "file",
    }
}
