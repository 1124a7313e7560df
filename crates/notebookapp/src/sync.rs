//! Copying nodes between two connections.
//!
//! Conflicts are settled by `modified_time`: the newer side wins and the
//! destination wins ties, so repeating a sync changes nothing.

use std::collections::HashSet;
use std::io::{Read, Write};

use tracing::{debug, info};

use crate::attr::NodeAttr;
use crate::connection::{FileMode, NotebookConnection};
use crate::error::{NotebookError, Result};
use crate::task::{stopped, Task};

/// What [`sync_node`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    /// The destination copy was as new or newer.
    Kept,
}

/// Brings `nodeid` in `dst` up to date with `attr` and the files in `src`.
///
/// `attr` is taken as the source's record of the node. Children are not
/// visited; see [`sync_tree`].
pub fn sync_node(
    nodeid: &str,
    src: &mut dyn NotebookConnection,
    dst: &mut dyn NotebookConnection,
    attr: &NodeAttr,
) -> Result<SyncOutcome> {
    if !dst.has_node(nodeid)? {
        dst.create_node(nodeid, attr)?;
        sync_files(src, nodeid, dst, nodeid, "")?;
        debug!(%nodeid, "sync created node");
        return Ok(SyncOutcome::Created);
    }

    let theirs = dst.read_node(nodeid)?;
    if attr.modified_time() > theirs.modified_time() {
        dst.update_node(nodeid, attr)?;
        sync_files(src, nodeid, dst, nodeid, "")?;
        debug!(%nodeid, "sync updated node");
        Ok(SyncOutcome::Updated)
    } else {
        Ok(SyncOutcome::Kept)
    }
}

/// Makes the files under `dir` of `dst_node` match those of `src_node`.
///
/// Destination files missing from the source are deleted and source
/// directories are followed recursively.
pub fn sync_files(
    src: &mut dyn NotebookConnection,
    src_node: &str,
    dst: &mut dyn NotebookConnection,
    dst_node: &str,
    dir: &str,
) -> Result<()> {
    let files = src.list_dir(src_node, dir)?;

    if !dir.is_empty() && !dst.has_file(dst_node, dir)? {
        dst.create_dir(dst_node, dir)?;
    }

    let wanted: HashSet<&str> = files.iter().map(String::as_str).collect();
    for existing in dst.list_dir(dst_node, dir)? {
        if !wanted.contains(existing.as_str()) {
            dst.delete_file(dst_node, &existing)?;
        }
    }

    for file in &files {
        if file.ends_with('/') {
            sync_files(src, src_node, dst, dst_node, file)?;
        } else {
            copy_file(src, src_node, file, dst, dst_node, file)?;
        }
    }
    Ok(())
}

/// Streams one file from one connection to another.
pub fn copy_file(
    src: &mut dyn NotebookConnection,
    src_node: &str,
    src_file: &str,
    dst: &mut dyn NotebookConnection,
    dst_node: &str,
    dst_file: &str,
) -> Result<()> {
    let mut input = src.open_file(src_node, src_file, FileMode::Read)?;
    let mut output = dst.open_file(dst_node, dst_file, FileMode::Write)?;
    let mut buf = [0u8; 4096];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                output.discard()?;
                return Err(NotebookError::file(src_node, src_file, err));
            }
        };
        if let Err(err) = output.write_all(&buf[..n]) {
            output.discard()?;
            return Err(NotebookError::file(dst_node, dst_file, err));
        }
    }
    input.close()?;
    output.close()
}

/// Counts from one [`sync_tree`] run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub kept: usize,
}

/// Syncs `nodeid` and everything below it, parents before children.
pub fn sync_tree(
    nodeid: &str,
    src: &mut dyn NotebookConnection,
    dst: &mut dyn NotebookConnection,
    task: Option<&Task>,
) -> Result<SyncStats> {
    let mut stats = SyncStats::default();
    let mut stack = vec![nodeid.to_string()];
    while let Some(id) = stack.pop() {
        if stopped(task) {
            info!(%nodeid, "sync stopped");
            break;
        }
        let attr = src.read_node(&id)?;
        match sync_node(&id, src, dst, &attr)? {
            SyncOutcome::Created => stats.created += 1,
            SyncOutcome::Updated => stats.updated += 1,
            SyncOutcome::Kept => stats.kept += 1,
        }
        stack.extend(attr.childrenids().into_iter().rev());
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemConnection;

    fn conn_with_root() -> MemConnection {
        let mut conn = MemConnection::new();
        conn.connect("mem:").unwrap();
        conn.create_node(
            "root",
            &NodeAttr::new()
                .with("title", "Root")
                .with("modified_time", 100i64)
                .with("parentids", Vec::<String>::new()),
        )
        .unwrap();
        conn
    }

    fn write(conn: &mut MemConnection, nodeid: &str, file: &str, data: &str) {
        let mut out = conn.open_file(nodeid, file, FileMode::Write).unwrap();
        out.write_all(data.as_bytes()).unwrap();
        out.close().unwrap();
    }

    fn read(conn: &mut MemConnection, nodeid: &str, file: &str) -> String {
        conn.open_file(nodeid, file, FileMode::Read).unwrap().read_text().unwrap()
    }

    #[test]
    fn test_newer_wins_and_ties_keep_destination() {
        let mut a = conn_with_root();
        let mut b = conn_with_root();

        let mut newer = a.read_node("root").unwrap();
        newer.insert("title", "y");
        newer.insert("modified_time", 101i64);
        a.update_node("root", &newer).unwrap();
        assert_eq!(sync_node("root", &mut a, &mut b, &newer).unwrap(), SyncOutcome::Updated);
        assert_eq!(b.read_node("root").unwrap().title(), "y");

        // Same time again: nothing to do.
        assert_eq!(sync_node("root", &mut a, &mut b, &newer).unwrap(), SyncOutcome::Kept);

        let mut older = newer.clone();
        older.insert("title", "old");
        older.insert("modified_time", 50i64);
        assert_eq!(sync_node("root", &mut a, &mut b, &older).unwrap(), SyncOutcome::Kept);
        assert_eq!(b.read_node("root").unwrap().title(), "y");
    }

    #[test]
    fn test_files_follow_source() {
        let mut a = conn_with_root();
        let mut b = conn_with_root();
        write(&mut a, "root", "page.html", "new");
        write(&mut a, "root", "img/a.png", "png");
        write(&mut b, "root", "page.html", "old");
        write(&mut b, "root", "stale.txt", "gone");

        let mut attr = a.read_node("root").unwrap();
        attr.insert("modified_time", 200i64);
        sync_node("root", &mut a, &mut b, &attr).unwrap();

        assert_eq!(read(&mut b, "root", "page.html"), "new");
        assert_eq!(read(&mut b, "root", "img/a.png"), "png");
        assert!(!b.has_file("root", "stale.txt").unwrap());
    }

    #[test]
    fn test_tree_creates_missing_nodes() {
        let mut a = conn_with_root();
        let mut b = conn_with_root();
        a.create_node(
            "child",
            &NodeAttr::new().with("title", "C").with("parentids", vec!["root".to_string()]),
        )
        .unwrap();
        write(&mut a, "child", "page.html", "hello");

        let stats = sync_tree("root", &mut a, &mut b, None).unwrap();
        assert_eq!(stats, SyncStats { created: 1, updated: 0, kept: 1 });
        assert_eq!(b.read_node("child").unwrap().title(), "C");
        assert_eq!(read(&mut b, "child", "page.html"), "hello");
        assert_eq!(b.read_node("root").unwrap().childrenids(), vec!["child"]);
    }

    #[test]
    fn test_stopped_task_syncs_nothing() {
        let mut a = conn_with_root();
        let mut b = MemConnection::new();
        let task = Task::new();
        task.stop();
        let stats = sync_tree("root", &mut a, &mut b, Some(&task)).unwrap();
        assert_eq!(stats, SyncStats::default());
    }
}
