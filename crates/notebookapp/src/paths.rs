//! Filenames and paths inside a notebook directory.
//!
//! Attached files are addressed with forward-slash paths relative to their
//! node directory. This module converts those to host paths, derives node
//! directory names from titles, and builds the node URL scheme.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{NotebookError, Result};

pub const NODE_META_FILE: &str = "node.xml";
pub const PAGE_DATA_FILE: &str = "page.html";
pub const PREF_FILE: &str = "notebook.nbk";
pub const NOTEBOOK_META_DIR: &str = "__NOTEBOOK__";
pub const NOTEBOOK_ICON_DIR: &str = "icons";
pub const LOSTDIR: &str = "lost_found";
pub const ORPHANDIR: &str = "orphans";
pub const MAX_LEN_NODE_FILENAME: usize = 40;

static REGEX_SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[/\\]").unwrap());
static REGEX_BAD_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*?'&<>|`:;]").unwrap());
static REGEX_LEADING_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^__+").unwrap());
static REGEX_NODE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^nbk://([^/]*)/(.*)$").unwrap());

/// Turns a title into a filename safe on common filesystems.
///
/// Truncates, replaces slashes with `-`, drops shell-hostile characters,
/// trims spaces and dots, removes leading double underscores (reserved for
/// notebook metadata) and lowercases. An empty result becomes `default`.
pub fn valid_filename(filename: &str, default: &str, maxlen: usize) -> String {
    let truncated: String = filename.chars().take(maxlen).collect();
    let name = REGEX_SLASHES.replace_all(&truncated, "-");
    let name = REGEX_BAD_CHARS.replace_all(&name, "");
    let name = name.replace('\t', " ");
    let name = name.trim_matches(|c| c == ' ' || c == '\t' || c == '.');
    let name = REGEX_LEADING_UNDERSCORE.replace(name, "");

    if name.is_empty() {
        default.to_string()
    } else {
        name.to_lowercase()
    }
}

/// [`valid_filename`] with the defaults used for node directories.
pub fn valid_node_filename(title: &str) -> String {
    valid_filename(title, "folder", MAX_LEN_NODE_FILENAME)
}

/// Returns `dir/filename<ext>`, or the first free `dir/filename<sep><n><ext>`
/// counting from `number`.
pub fn unique_filename(dir: &Path, filename: &str, ext: &str, sep: &str, number: u32) -> PathBuf {
    let candidate = dir.join(format!("{}{}", filename, ext));
    if !candidate.exists() {
        return candidate;
    }
    let mut i = number;
    loop {
        let candidate = dir.join(format!("{}{}{}{}", filename, sep, i, ext));
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

/// Like [`unique_filename`] but checks against a list of taken names.
pub fn unique_filename_list<I, S>(taken: I, filename: &str, ext: &str, sep: &str, number: u32) -> String
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let taken: HashSet<String> = taken.into_iter().map(Into::into).collect();
    let candidate = format!("{}{}", filename, ext);
    if !taken.contains(&candidate) {
        return candidate;
    }
    let mut i = number;
    loop {
        let candidate = format!("{}{}{}{}", filename, sep, i, ext);
        if !taken.contains(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

/// A fresh directory for a child node titled `title` under `parent_dir`.
pub fn valid_unique_node_dir(parent_dir: &Path, title: &str) -> PathBuf {
    unique_filename(parent_dir, &valid_node_filename(title), "", " ", 2)
}

/// Joins node file path parts with `/`, skipping empty parts and trimming a
/// trailing slash from each part.
pub fn path_join(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| p.strip_suffix('/').unwrap_or(p))
        .collect::<Vec<_>>()
        .join("/")
}

/// Last component of a node file path.
///
/// `aaa/bbb` and `aaa/bbb/` give `bbb`, `/` gives the empty string.
pub fn path_basename(filename: &str) -> &str {
    let trimmed = filename.strip_suffix('/').unwrap_or(filename);
    match trimmed.rfind('/') {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}

/// Host path of an attached file. A leading `/` is tolerated.
pub fn node_filename(node_path: &Path, filename: &str) -> PathBuf {
    let relative = filename.trim_start_matches('/');
    let mut path = node_path.to_path_buf();
    for part in relative.split('/').filter(|p| !p.is_empty()) {
        path.push(part);
    }
    path
}

/// Rejects attached file paths that would escape the node directory.
pub fn check_filename(filename: &str) -> Result<()> {
    if filename.split('/').any(|part| part == "..") {
        return Err(NotebookError::File(format!(
            "file path may not contain '..': {:?}",
            filename
        )));
    }
    Ok(())
}

pub fn node_meta_file(node_path: &Path) -> PathBuf {
    node_path.join(NODE_META_FILE)
}

pub fn pref_file(notebook_path: &Path) -> PathBuf {
    notebook_path.join(PREF_FILE)
}

pub fn meta_dir(notebook_path: &Path) -> PathBuf {
    notebook_path.join(NOTEBOOK_META_DIR)
}

pub fn icon_dir(notebook_path: &Path) -> PathBuf {
    meta_dir(notebook_path).join(NOTEBOOK_ICON_DIR)
}

pub fn lost_dir(notebook_path: &Path) -> PathBuf {
    meta_dir(notebook_path).join(LOSTDIR)
}

pub fn orphan_dir(notebook_path: &Path) -> PathBuf {
    meta_dir(notebook_path).join(ORPHANDIR)
}

/// Normalizes a notebook location: a path to `notebook.nbk` names its
/// directory.
pub fn normalize_notebook_dirname(path: &Path) -> Result<PathBuf> {
    if path.is_dir() {
        Ok(path.to_path_buf())
    } else if path.is_file() {
        Ok(path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")))
    } else {
        Err(NotebookError::Connection(format!(
            "cannot find notebook '{}'",
            path.display()
        )))
    }
}

/// `nbk://<host>/<nodeid>`
pub fn node_url(nodeid: &str, host: &str) -> String {
    format!("nbk://{}/{}", host, nodeid)
}

pub fn is_node_url(url: &str) -> bool {
    REGEX_NODE_URL.is_match(url)
}

/// Splits a node URL into `(host, nodeid)`.
pub fn parse_node_url(url: &str) -> Result<(String, String)> {
    let caps = REGEX_NODE_URL
        .captures(url)
        .ok_or_else(|| NotebookError::Parse(format!("bad node URL: {:?}", url)))?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

/// Guesses a content type from a file extension.
pub fn guess_file_mimetype(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "text" => "text/plain",
        "html" | "htm" => "text/html",
        "xhtml" => "application/xhtml+xml",
        "xml" => "application/xml",
        "css" => "text/css",
        "csv" => "text/csv",
        "json" => "application/json",
        "js" => "application/javascript",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "wav" => "audio/x-wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "doc" => "application/msword",
        "odt" => "application/vnd.oasis.opendocument.text",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_valid_filename() {
        assert_eq!(valid_node_filename("Hello World"), "hello world");
        assert_eq!(valid_node_filename("a/b\\c"), "a-b-c");
        assert_eq!(valid_node_filename("what? *no* <way>"), "what no way");
        assert_eq!(valid_node_filename("  ..dots.. "), "dots");
        assert_eq!(valid_node_filename("__NOTEBOOK__"), "notebook__");
        assert_eq!(valid_node_filename("???"), "folder");
        assert_eq!(valid_node_filename("a\tb"), "a b");
    }

    #[test]
    fn test_valid_filename_truncates() {
        let long = "x".repeat(100);
        assert_eq!(valid_node_filename(&long).len(), MAX_LEN_NODE_FILENAME);
    }

    #[test]
    fn test_unique_filename() {
        let dir = TempDir::new().unwrap();
        assert_eq!(unique_filename(dir.path(), "page", "", " ", 2), dir.path().join("page"));
        fs::create_dir(dir.path().join("page")).unwrap();
        fs::create_dir(dir.path().join("page 2")).unwrap();
        assert_eq!(unique_filename(dir.path(), "page", "", " ", 2), dir.path().join("page 3"));
        assert_eq!(
            unique_filename(dir.path(), "icon", ".png", "-", 2),
            dir.path().join("icon.png")
        );
    }

    #[test]
    fn test_unique_filename_list() {
        let taken = vec!["a.png", "a-2.png"];
        assert_eq!(unique_filename_list(taken, "a", ".png", "-", 2), "a-3.png");
        assert_eq!(unique_filename_list(Vec::<String>::new(), "a", "", " ", 2), "a");
    }

    #[test]
    fn test_path_join() {
        assert_eq!(path_join(&["", "a"]), "a");
        assert_eq!(path_join(&["dir/", "file"]), "dir/file");
        assert_eq!(path_join(&["a", "", "b/"]), "a/b");
    }

    #[test]
    fn test_path_basename() {
        assert_eq!(path_basename("aaa/bbb"), "bbb");
        assert_eq!(path_basename("aaa/bbb/"), "bbb");
        assert_eq!(path_basename("aaa/"), "aaa");
        assert_eq!(path_basename("aaa"), "aaa");
        assert_eq!(path_basename(""), "");
        assert_eq!(path_basename("/"), "");
    }

    #[test]
    fn test_node_filename() {
        let base = Path::new("/nb/child");
        assert_eq!(node_filename(base, "/a/b.txt"), base.join("a").join("b.txt"));
        assert_eq!(node_filename(base, "dir/"), base.join("dir"));
        assert_eq!(node_filename(base, ""), base.to_path_buf());
    }

    #[test]
    fn test_check_filename() {
        assert!(check_filename("a/b.txt").is_ok());
        assert!(check_filename("../escape").is_err());
    }

    #[test]
    fn test_node_urls() {
        let url = node_url("abc", "");
        assert_eq!(url, "nbk:///abc");
        assert!(is_node_url(&url));
        assert!(!is_node_url("http://x/abc"));
        assert_eq!(parse_node_url("nbk://host/n1").unwrap(), ("host".into(), "n1".into()));
        assert!(parse_node_url("nbk:/bad").is_err());
    }

    #[test]
    fn test_mimetype() {
        assert_eq!(guess_file_mimetype("photo.JPG"), "image/jpeg");
        assert_eq!(guess_file_mimetype("noext"), "application/octet-stream");
    }
}
