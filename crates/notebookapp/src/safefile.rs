//! Atomic replace-on-close file writes.
//!
//! A [`SafeFile`] writes into a sibling temp file named
//! `<basename>_<uuid>.tmp` in the target's directory. [`SafeFile::close`]
//! flushes, fsyncs and renames the temp file over the target;
//! [`SafeFile::discard`] (or dropping the value) removes the temp file and
//! leaves the target untouched.
//!
//! Temp files orphaned by a crashed process are swept the next time the same
//! target is opened for writing.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const TMP_SUFFIX: &str = ".tmp";

pub struct SafeFile {
    target: PathBuf,
    tmp: Option<PathBuf>,
    file: Option<File>,
}

impl SafeFile {
    /// Starts a write session for `target`.
    pub fn create(target: impl AsRef<Path>) -> io::Result<SafeFile> {
        let target = target.as_ref().to_path_buf();
        let dir = parent_dir(&target);
        let basename = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no filename"))?;

        sweep_stale_temps(&dir, &basename);

        let tmp = dir.join(format!(
            "{}_{}{}",
            basename,
            Uuid::new_v4().simple(),
            TMP_SUFFIX
        ));
        let file = File::create(&tmp)?;

        Ok(SafeFile {
            target,
            tmp: Some(tmp),
            file: Some(file),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Path of the temp file while the session is open.
    pub fn tmp_path(&self) -> Option<&Path> {
        self.tmp.as_deref()
    }

    /// Commits the written bytes to the target.
    pub fn close(mut self) -> io::Result<()> {
        let (Some(mut file), Some(tmp)) = (self.file.take(), self.tmp.take()) else {
            return Ok(());
        };

        let synced = file.flush().and_then(|_| file.sync_all());
        drop(file);
        if let Err(e) = synced {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        if let Err(first) = fs::rename(&tmp, &self.target) {
            // Some platforms refuse to rename onto an existing file.
            if self.target.exists() {
                fs::remove_file(&self.target)?;
                if let Err(e) = fs::rename(&tmp, &self.target) {
                    let _ = fs::remove_file(&tmp);
                    return Err(e);
                }
            } else {
                let _ = fs::remove_file(&tmp);
                return Err(first);
            }
        }
        Ok(())
    }

    /// Throws away the written bytes. The target is left as it was.
    pub fn discard(mut self) -> io::Result<()> {
        self.file.take();
        match self.tmp.take() {
            Some(tmp) => fs::remove_file(tmp),
            None => Ok(()),
        }
    }
}

impl Write for SafeFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "safe file is closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for SafeFile {
    fn drop(&mut self) {
        self.file.take();
        if let Some(tmp) = self.tmp.take() {
            let _ = fs::remove_file(tmp);
        }
    }
}

/// Writes `data` to `path` atomically.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> io::Result<()> {
    let mut out = SafeFile::create(path)?;
    out.write_all(data)?;
    out.close()
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Returns true when `name` looks like a temp file created for `basename`.
fn is_temp_for(name: &str, basename: &str) -> bool {
    let Some(rest) = name.strip_prefix(basename) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix('_') else {
        return false;
    };
    let Some(id) = rest.strip_suffix(TMP_SUFFIX) else {
        return false;
    };
    Uuid::try_parse(id).is_ok()
}

fn sweep_stale_temps(dir: &Path, basename: &str) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_temp_for(&name, basename) {
            tracing::debug!("removing stale temp file {}", entry.path().display());
            let _ = fs::remove_file(entry.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn test_close_commits() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("node.xml");
        let mut out = SafeFile::create(&target).unwrap();
        out.write_all(b"hello").unwrap();
        assert!(!target.exists());
        out.close().unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");
        assert!(temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_close_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("node.xml");
        fs::write(&target, "old").unwrap();
        write_atomic(&target, b"new").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[test]
    fn test_discard_leaves_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("node.xml");
        fs::write(&target, "original").unwrap();

        let mut out = SafeFile::create(&target).unwrap();
        out.write_all(b"partial").unwrap();
        out.discard().unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
        assert!(temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_drop_acts_as_discard() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("node.xml");
        fs::write(&target, "original").unwrap();
        {
            let mut out = SafeFile::create(&target).unwrap();
            out.write_all(b"partial").unwrap();
        }
        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
        assert!(temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_stale_temp_swept_on_next_write() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("node.xml");
        let stale = dir
            .path()
            .join(format!("node.xml_{}.tmp", Uuid::new_v4().simple()));
        fs::write(&stale, "left behind by a crash").unwrap();
        let unrelated = dir.path().join("other.tmp");
        fs::write(&unrelated, "keep").unwrap();

        write_atomic(&target, b"data").unwrap();

        assert!(!stale.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_is_temp_for() {
        let id = Uuid::new_v4().simple().to_string();
        assert!(is_temp_for(&format!("page.html_{}.tmp", id), "page.html"));
        assert!(!is_temp_for("page.html_x.tmp", "page.html"));
        assert!(!is_temp_for(&format!("other_{}.tmp", id), "page.html"));
    }
}
