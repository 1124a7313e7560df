//! Maps opaque node ids to directories.
//!
//! Node directories are sharded git-style by the first two characters of the
//! id: `abcdefg` lives at `ROOT/ab/cdefg`. Ids that cannot be sharded that way
//! are handled in two more classes:
//!
//! | Class | Ids | Location |
//! |-------|-----|----------|
//! | simple | 3..=255 chars of `[a-z0-9_\-., "']` | `ROOT/<id[..2]>/<id[2..]>` |
//! | other | too short to shard, or `X.`/`XY..` | `ROOT/00_extra/<id>` |
//! | nonstandard | anything else except `""` | `ROOT/<alt[..2]>/<alt[2..]>` |
//!
//! Nonstandard ids (uppercase, slashes, `.`/`..` or a leading `..`, over
//! 255 chars) are given a
//! fresh UUID alt id, persisted in the sidecar database `ROOT/00_index.db`
//! with one table per direction. Enumeration never yields alt ids.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::error::{NotebookError, Result};

const FANSIZE: usize = 2;
const MAX_NODEID_LEN: usize = 255;
const OTHERS_DIR: &str = "00_extra";
const INDEX_FILE: &str = "00_index.db";
const TABLE: &str = "nodes";
const ALT_TABLE: &str = "alt_nodes";
const BANNED_NODEIDS: &[&str] = &[".", ".."];

static VALID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^[a-z0-9_\-., "']+$"#).unwrap());

/// Storage class of a node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeIdKind {
    Simple,
    Other,
    Nonstandard,
}

/// Classifies a non-empty node id.
pub fn classify(nodeid: &str) -> NodeIdKind {
    let len = nodeid.chars().count();
    if len > MAX_NODEID_LEN
        || BANNED_NODEIDS.contains(&nodeid)
        || !VALID_REGEX.is_match(nodeid)
        || nodeid.starts_with("..")
    {
        // A `..` shard prefix would resolve to the store's parent.
        NodeIdKind::Nonstandard
    } else if len <= FANSIZE
        || (len == FANSIZE + 1 && nodeid.ends_with('.'))
        || (len == FANSIZE + 2 && nodeid.ends_with(".."))
    {
        NodeIdKind::Other
    } else {
        NodeIdKind::Simple
    }
}

pub struct NodeDirs {
    root: PathBuf,
    db: Mutex<Connection>,
}

impl NodeDirs {
    /// Opens the store at `root`, creating it if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<NodeDirs> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let db = Connection::open(root.join(INDEX_FILE))?;
        for table in [TABLE, ALT_TABLE] {
            db.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (key TEXT PRIMARY KEY, value TEXT)",
                table
            ))?;
        }
        Ok(NodeDirs {
            root,
            db: Mutex::new(db),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of `nodeid`, assigning an alt id if the id needs one.
    pub fn get_nodedir(&self, nodeid: &str) -> Result<PathBuf> {
        check_nodeid(nodeid)?;
        match classify(nodeid) {
            NodeIdKind::Simple => Ok(self.shard_path(nodeid)),
            NodeIdKind::Other => Ok(self.root.join(OTHERS_DIR).join(nodeid)),
            NodeIdKind::Nonstandard => {
                let alt = self.alt_nodeid(nodeid, true)?.unwrap_or_default();
                Ok(self.shard_path(&alt))
            }
        }
    }

    pub fn create_nodedir(&self, nodeid: &str) -> Result<PathBuf> {
        let dir = self.get_nodedir(nodeid)?;
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Removes the directory and any alt id entries for `nodeid`.
    pub fn delete_nodedir(&self, nodeid: &str) -> Result<()> {
        check_nodeid(nodeid)?;
        if let Some(dir) = self.lookup(nodeid)? {
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
        }
        if classify(nodeid) == NodeIdKind::Nonstandard {
            let db = self.db.lock();
            let alt: Option<String> = db
                .query_row(
                    &format!("SELECT value FROM \"{}\" WHERE key = ?1", TABLE),
                    params![nodeid],
                    |row| row.get(0),
                )
                .optional()?;
            db.execute(&format!("DELETE FROM \"{}\" WHERE key = ?1", TABLE), params![nodeid])?;
            if let Some(alt) = alt {
                db.execute(&format!("DELETE FROM \"{}\" WHERE key = ?1", ALT_TABLE), params![alt])?;
            }
        }
        Ok(())
    }

    pub fn has_nodedir(&self, nodeid: &str) -> Result<bool> {
        check_nodeid(nodeid)?;
        Ok(self.lookup(nodeid)?.is_some_and(|dir| dir.exists()))
    }

    /// All stored node ids: sharded ids, then other ids, then nonstandard ids.
    pub fn iter_nodeids(&self) -> Result<Vec<String>> {
        let alts = self.table_keys(ALT_TABLE)?;
        let mut nodeids = Vec::new();

        for prefix in sorted_dir_names(&self.root)? {
            if prefix.chars().count() != FANSIZE || !self.root.join(&prefix).is_dir() {
                continue;
            }
            for rest in sorted_dir_names(&self.root.join(&prefix))? {
                let nodeid = format!("{}{}", prefix, rest);
                if !alts.contains(&nodeid) {
                    nodeids.push(nodeid);
                }
            }
        }

        let others = self.root.join(OTHERS_DIR);
        if others.is_dir() {
            nodeids.extend(sorted_dir_names(&others)?);
        }

        nodeids.extend(self.table_keys(TABLE)?);
        Ok(nodeids)
    }

    /// Inverse of [`NodeDirs::get_nodedir`].
    pub fn nodeid_for_path(&self, path: &Path) -> Result<Option<String>> {
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return Ok(None);
        };
        let parts: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let [first, second] = parts.as_slice() else {
            return Ok(None);
        };
        if first == OTHERS_DIR {
            return Ok(Some(second.clone()));
        }
        let joined = format!("{}{}", first, second);
        let db = self.db.lock();
        let real: Option<String> = db
            .query_row(
                &format!("SELECT value FROM \"{}\" WHERE key = ?1", ALT_TABLE),
                params![joined],
                |row| row.get(0),
            )
            .optional()?;
        Ok(Some(real.unwrap_or(joined)))
    }

    fn shard_path(&self, id: &str) -> PathBuf {
        let split = id
            .char_indices()
            .nth(FANSIZE)
            .map(|(i, _)| i)
            .unwrap_or(id.len());
        self.root.join(&id[..split]).join(&id[split..])
    }

    /// Directory of `nodeid` without assigning an alt id.
    fn lookup(&self, nodeid: &str) -> Result<Option<PathBuf>> {
        match classify(nodeid) {
            NodeIdKind::Nonstandard => Ok(self
                .alt_nodeid(nodeid, false)?
                .map(|alt| self.shard_path(&alt))),
            _ => self.get_nodedir(nodeid).map(Some),
        }
    }

    fn alt_nodeid(&self, nodeid: &str, create: bool) -> Result<Option<String>> {
        let db = self.db.lock();
        let existing: Option<String> = db
            .query_row(
                &format!("SELECT value FROM \"{}\" WHERE key = ?1", TABLE),
                params![nodeid],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() || !create {
            return Ok(existing);
        }

        let alt = Uuid::new_v4().to_string();
        db.execute(
            &format!("INSERT OR REPLACE INTO \"{}\" (key, value) VALUES (?1, ?2)", TABLE),
            params![nodeid, alt],
        )?;
        db.execute(
            &format!("INSERT OR REPLACE INTO \"{}\" (key, value) VALUES (?1, ?2)", ALT_TABLE),
            params![alt, nodeid],
        )?;
        tracing::debug!("assigned alt id {} to nodeid {:?}", alt, nodeid);
        Ok(Some(alt))
    }

    fn table_keys(&self, table: &str) -> Result<Vec<String>> {
        let db = self.db.lock();
        let mut stmt = db.prepare(&format!("SELECT key FROM \"{}\" ORDER BY rowid", table))?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

fn check_nodeid(nodeid: &str) -> Result<()> {
    if nodeid.is_empty() {
        return Err(NotebookError::InvalidNodeId(nodeid.to_string()));
    }
    Ok(())
}

fn sorted_dir_names(dir: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}
