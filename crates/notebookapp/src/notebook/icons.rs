//! Icon store under `__NOTEBOOK__/icons/`, kept as files on the root node.

use std::collections::HashSet;
use std::path::Path;

use super::Notebook;
use crate::error::{NotebookError, Result};
use crate::paths::{path_basename, path_join, unique_filename_list};

pub(super) const ICON_DIR: &str = "__NOTEBOOK__/icons/";

fn icon_path(basename: &str) -> String {
    path_join(&[ICON_DIR, basename])
}

/// Splits `dir/name.png` into `("name", ".png")`.
fn split_icon_name(filename: &Path) -> Result<(String, String)> {
    let stem = filename
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| NotebookError::File(format!("no icon name in '{}'", filename.display())))?;
    let ext = filename
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    Ok((stem, ext))
}

impl Notebook {
    /// Installed icon file names, sorted.
    pub fn icons(&mut self) -> Result<Vec<String>> {
        let rootid = self.rootid.clone();
        if !self.conn.has_file(&rootid, ICON_DIR)? {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = self
            .conn
            .list_dir(&rootid, ICON_DIR)?
            .iter()
            .filter(|entry| !entry.ends_with('/'))
            .map(|entry| path_basename(entry).to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Node-relative path of an installed icon.
    pub fn icon_file(&mut self, basename: &str) -> Result<Option<String>> {
        let rootid = self.rootid.clone();
        let path = icon_path(basename);
        if basename.is_empty() || !self.conn.has_file(&rootid, &path)? {
            return Ok(None);
        }
        Ok(Some(path))
    }

    /// Copies a local image into the store, returning its new name.
    ///
    /// Name clashes get `-2`, `-3`, ... before the extension.
    pub fn install_icon(&mut self, filename: &Path) -> Result<String> {
        let (stem, ext) = split_icon_name(filename)?;
        let name = unique_filename_list(self.icons()?, &stem, &ext, "-", 2);
        self.copy_icon(filename, &name)?;
        Ok(name)
    }

    /// Installs a closed/open icon pair as `name.ext` and `name-open.ext`,
    /// numbering both alike when either name is taken.
    pub fn install_icons(&mut self, filename: &Path, filename_open: &Path) -> Result<(String, String)> {
        let (stem, ext) = split_icon_name(filename)?;
        let taken: HashSet<String> = self.icons()?.into_iter().collect();

        let mut number: Option<u32> = None;
        let (closed, open) = loop {
            let base = match number {
                Some(n) => format!("{}-{}", stem, n),
                None => stem.clone(),
            };
            let closed = format!("{}{}", base, ext);
            let open = format!("{}-open{}", base, ext);
            if !taken.contains(&closed) && !taken.contains(&open) {
                break (closed, open);
            }
            number = Some(number.map_or(2, |n| n + 1));
        };

        self.copy_icon(filename, &closed)?;
        self.copy_icon(filename_open, &open)?;
        Ok((closed, open))
    }

    pub fn uninstall_icon(&mut self, basename: &str) -> Result<()> {
        if basename.is_empty() {
            return Ok(());
        }
        let rootid = self.rootid.clone();
        self.conn.delete_file(&rootid, &icon_path(basename))
    }

    fn copy_icon(&mut self, source: &Path, basename: &str) -> Result<()> {
        if !source.is_file() {
            return Err(NotebookError::UnknownFile(source.display().to_string()));
        }
        let rootid = self.rootid.clone();
        self.conn.create_dir(&rootid, ICON_DIR)?;
        self.conn
            .copy_file(None, &source.to_string_lossy(), Some(&rootid), &icon_path(basename))
    }
}
