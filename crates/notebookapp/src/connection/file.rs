//! Attached-file operations on a node directory.
//!
//! Callers resolve the node's directory first; every function here takes it
//! as `node_path` plus the node id for error messages. Conversion between
//! `/`-separated node paths and host paths happens only in this module.

use std::fs::{self, OpenOptions};
use std::io::BufReader;
use std::path::Path;

use super::{FileMode, FileStream};
use crate::error::{NotebookError, Result};
use crate::paths::{check_filename, node_filename, node_meta_file, path_join, NODE_META_FILE};
use crate::safefile::SafeFile;

pub fn open_file(node_path: &Path, nodeid: &str, filename: &str, mode: FileMode) -> Result<FileStream> {
    if filename.ends_with('/') || filename.is_empty() {
        return Err(NotebookError::File(format!(
            "filename '{}' cannot end with '/'",
            filename
        )));
    }
    check_filename(filename)?;

    let fullname = node_filename(node_path, filename);
    let opened = (|| -> std::io::Result<FileStream> {
        match mode {
            FileMode::Read => Ok(FileStream::reader(BufReader::new(fs::File::open(&fullname)?))),
            FileMode::Write => {
                if let Some(dir) = fullname.parent() {
                    fs::create_dir_all(dir)?;
                }
                Ok(FileStream::writer(SafeFile::create(&fullname)?))
            }
            FileMode::Append => {
                if let Some(dir) = fullname.parent() {
                    fs::create_dir_all(dir)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(&fullname)?;
                Ok(FileStream::writer(file))
            }
        }
    })();

    opened.map_err(|e| NotebookError::file(nodeid, filename, format!("cannot open file: {}", e)))
}

/// Idempotent: a missing file is not an error.
pub fn delete_file(node_path: &Path, nodeid: &str, filename: &str) -> Result<()> {
    check_filename(filename)?;
    let filepath = node_filename(node_path, filename);
    let result = if filepath.is_file() {
        fs::remove_file(&filepath)
    } else if filename.ends_with('/') && filepath.is_dir() && filepath != node_path {
        fs::remove_dir_all(&filepath)
    } else {
        Ok(())
    };
    result.map_err(|e| NotebookError::file(nodeid, filename, format!("error deleting: {}", e)))
}

pub fn create_dir(node_path: &Path, nodeid: &str, filename: &str) -> Result<()> {
    if !filename.ends_with('/') {
        return Err(NotebookError::File(format!(
            "filename '{}' does not end with '/'",
            filename
        )));
    }
    check_filename(filename)?;
    let fullname = node_filename(node_path, filename);
    if !fullname.is_dir() {
        fs::create_dir_all(&fullname)
            .map_err(|e| NotebookError::file(nodeid, filename, format!("cannot create dir: {}", e)))?;
    }
    Ok(())
}

/// Lists attached files under `filename`.
///
/// Entries are full node-relative paths. Hidden are the node metadata file,
/// names starting with `__`, and child node directories.
pub fn list_dir(node_path: &Path, nodeid: &str, filename: &str) -> Result<Vec<String>> {
    if !filename.ends_with('/') && !filename.is_empty() {
        return Err(NotebookError::File(format!(
            "filename '{}' does not end with '/'",
            filename
        )));
    }
    check_filename(filename)?;
    let path = node_filename(node_path, filename);
    let entries = fs::read_dir(&path)
        .map_err(|_| NotebookError::UnknownFile(format!("cannot find file '{}' '{}'", nodeid, filename)))?;

    let mut names: Vec<String> = entries
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name != NODE_META_FILE && !name.starts_with("__"))
        .collect();
    names.sort();

    let mut listing = Vec::new();
    for name in names {
        let fullname = path.join(&name);
        if node_meta_file(&fullname).exists() {
            continue;
        }
        let node_fullname = path_join(&[filename, &name]);
        if fullname.is_dir() {
            listing.push(format!("{}/", node_fullname));
        } else if !is_temp_file(&name) {
            listing.push(node_fullname);
        }
    }
    Ok(listing)
}

/// A trailing `/` asks for a directory, otherwise a regular file.
pub fn has_file(node_path: &Path, filename: &str) -> bool {
    let fullname = node_filename(node_path, filename);
    if filename.ends_with('/') || filename.is_empty() {
        fullname.is_dir()
    } else {
        fullname.is_file()
    }
}

/// Renames a file, replacing whatever is at the destination. Nothing is
/// removed unless the source exists.
pub fn move_file(
    path1: &Path,
    nodeid1: &str,
    filename1: &str,
    path2: &Path,
    filename2: &str,
) -> Result<()> {
    check_filename(filename1)?;
    check_filename(filename2)?;
    let filepath1 = node_filename(path1, filename1);
    let filepath2 = node_filename(path2, filename2);

    if !filepath1.exists() {
        return Err(NotebookError::UnknownFile(format!("'{}' '{}'", nodeid1, filename1)));
    }
    if filepath1 == filepath2 {
        return Ok(());
    }

    let moved = (|| -> std::io::Result<()> {
        // rename replaces a file target in place, but not a directory.
        if filepath2.is_dir() {
            fs::remove_dir_all(&filepath2)?;
        } else if filepath2.is_file() && filepath1.is_dir() {
            fs::remove_file(&filepath2)?;
        }
        if let Some(dir) = filepath2.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::rename(&filepath1, &filepath2)
    })();
    moved.map_err(|e| NotebookError::file(nodeid1, filename1, format!("could not move file: {}", e)))
}

/// Copies between node files or local paths. A directory source is copied
/// recursively.
pub fn copy_file(
    source: &Path,
    source_label: (&str, &str),
    dest: &Path,
) -> Result<()> {
    let (nodeid, filename) = source_label;
    let copied = if source.is_file() {
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| NotebookError::file(nodeid, filename, e))?;
        }
        fs::copy(source, dest).map(|_| ())
    } else if source.is_dir() {
        copy_tree(source, dest)
    } else {
        return Err(NotebookError::UnknownFile(format!("'{}' '{}'", nodeid, filename)));
    };
    copied.map_err(|e| NotebookError::file(nodeid, filename, format!("unable to copy file: {}", e)))
}

fn copy_tree(source: &Path, dest: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in walkdir::WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(std::io::Error::other)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn is_temp_file(name: &str) -> bool {
    name.ends_with(".tmp") && name.contains('_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn write(node: &Path, filename: &str, data: &str) {
        let mut out = open_file(node, "n", filename, FileMode::Write).unwrap();
        out.write_all(data.as_bytes()).unwrap();
        out.close().unwrap();
    }

    fn read(node: &Path, filename: &str) -> String {
        let mut s = String::new();
        open_file(node, "n", filename, FileMode::Read)
            .unwrap()
            .read_to_string(&mut s)
            .unwrap();
        s
    }

    #[test]
    fn test_write_read_append() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "sub/dir/file.txt", "hello");
        assert_eq!(read(dir.path(), "/sub/dir/file.txt"), "hello");

        let mut out = open_file(dir.path(), "n", "sub/dir/file.txt", FileMode::Append).unwrap();
        out.write_all(b" world").unwrap();
        out.close().unwrap();
        assert_eq!(read(dir.path(), "sub/dir/file.txt"), "hello world");
    }

    #[test]
    fn test_move_file_keeps_data() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "alpha");
        move_file(dir.path(), "n", "a.txt", dir.path(), "a.txt").unwrap();
        assert_eq!(read(dir.path(), "a.txt"), "alpha");

        write(dir.path(), "b.txt", "beta");
        assert!(matches!(
            move_file(dir.path(), "n", "missing.txt", dir.path(), "b.txt"),
            Err(NotebookError::UnknownFile(_))
        ));
        assert_eq!(read(dir.path(), "b.txt"), "beta");

        move_file(dir.path(), "n", "a.txt", dir.path(), "b.txt").unwrap();
        assert_eq!(read(dir.path(), "b.txt"), "alpha");
        assert!(!has_file(dir.path(), "a.txt"));
    }

    #[test]
    fn test_open_rejects_dir_names() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            open_file(dir.path(), "n", "dir/", FileMode::Read),
            Err(NotebookError::File(_))
        ));
        assert!(matches!(
            open_file(dir.path(), "n", "missing.txt", FileMode::Read),
            Err(NotebookError::File(_))
        ));
    }

    #[test]
    fn test_discarded_write_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let mut out = open_file(dir.path(), "n", "file.txt", FileMode::Write).unwrap();
        out.write_all(b"partial").unwrap();
        out.discard().unwrap();
        assert!(!has_file(dir.path(), "file.txt"));
        assert!(list_dir(dir.path(), "n", "/").unwrap().is_empty());
    }

    #[test]
    fn test_list_dir_hides_metadata_and_children() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(NODE_META_FILE), "<node/>").unwrap();
        fs::create_dir(dir.path().join("__NOTEBOOK__")).unwrap();
        fs::create_dir(dir.path().join("child")).unwrap();
        fs::write(dir.path().join("child").join(NODE_META_FILE), "<node/>").unwrap();
        write(dir.path(), "page.html", "x");
        create_dir(dir.path(), "n", "images/").unwrap();
        write(dir.path(), "images/a.png", "x");

        assert_eq!(list_dir(dir.path(), "n", "/").unwrap(), vec!["/images/", "/page.html"]);
        assert_eq!(list_dir(dir.path(), "n", "").unwrap(), vec!["images/", "page.html"]);
        assert_eq!(list_dir(dir.path(), "n", "images/").unwrap(), vec!["images/a.png"]);
        assert!(matches!(
            list_dir(dir.path(), "n", "nope/"),
            Err(NotebookError::UnknownFile(_))
        ));
        assert!(list_dir(dir.path(), "n", "images").is_err());
    }

    #[test]
    fn test_has_file_direction() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "x");
        create_dir(dir.path(), "n", "d/").unwrap();
        assert!(has_file(dir.path(), "a.txt"));
        assert!(!has_file(dir.path(), "a.txt/"));
        assert!(has_file(dir.path(), "d/"));
        assert!(!has_file(dir.path(), "d"));
    }

    #[test]
    fn test_create_dir_requires_slash() {
        let dir = TempDir::new().unwrap();
        assert!(create_dir(dir.path(), "n", "d").is_err());
        create_dir(dir.path(), "n", "a/b/c/").unwrap();
        assert!(dir.path().join("a").join("b").join("c").is_dir());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "x");
        write(dir.path(), "d/b.txt", "x");
        delete_file(dir.path(), "n", "a.txt").unwrap();
        delete_file(dir.path(), "n", "a.txt").unwrap();
        delete_file(dir.path(), "n", "d/").unwrap();
        assert!(!dir.path().join("d").exists());
        delete_file(dir.path(), "n", "d/").unwrap();
    }

    #[test]
    fn test_move_replaces_destination() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "new");
        write(dir.path(), "b.txt", "old");
        move_file(dir.path(), "n", "a.txt", dir.path(), "b.txt").unwrap();
        assert!(!has_file(dir.path(), "a.txt"));
        assert_eq!(read(dir.path(), "b.txt"), "new");
    }

    #[test]
    fn test_copy_tree() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.txt", "a");
        write(dir.path(), "src/deep/b.txt", "b");
        copy_file(&dir.path().join("src"), ("n", "src/"), &dir.path().join("dst")).unwrap();
        assert_eq!(read(dir.path(), "dst/deep/b.txt"), "b");
        assert!(copy_file(&dir.path().join("none"), ("n", "none"), &dir.path().join("x")).is_err());
    }

    #[test]
    fn test_parent_escape_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(open_file(dir.path(), "n", "../x", FileMode::Write).is_err());
    }
}
