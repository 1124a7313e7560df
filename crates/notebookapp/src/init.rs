//! # Initialization
//!
//! Resolves configuration and opens notebooks for a UI client.
//!
//! ## Resolving the notebook
//!
//! 1. A location given explicitly (`--notebook`) wins.
//! 2. Otherwise `default_notebook` from the configuration.
//! 3. Otherwise there is no notebook and commands that need one fail.
//!
//! ## Config directories
//!
//! The user config directory is `NOTEBOOK_CONFIG_DIR` if set (mostly for
//! tests), else the OS config directory from [`ProjectDirs`]. For a local
//! notebook its `__NOTEBOOK__/` directory is searched as well and wins.

use std::path::{Path, PathBuf};

use clapfig::{Clapfig, SearchMode, SearchPath};
use directories::ProjectDirs;
use tracing::debug;

use crate::config::{NotebookConfig, CONFIG_FILE};
use crate::error::Result;
use crate::notebook::Notebook;
use crate::paths::meta_dir;

pub const CONFIG_DIR_ENV: &str = "NOTEBOOK_CONFIG_DIR";

/// Configuration plus the notebook location it resolved.
#[derive(Debug, Clone)]
pub struct NotebookContext {
    pub config: NotebookConfig,
    pub config_dir: PathBuf,
    pub notebook: Option<String>,
}

impl NotebookContext {
    /// Opens the resolved notebook.
    pub fn open(&self) -> Result<Notebook> {
        let url = self.require_notebook()?;
        open_notebook(url, &self.config)
    }

    pub fn require_notebook(&self) -> Result<&str> {
        self.notebook.as_deref().ok_or_else(|| {
            crate::error::NotebookError::Connection(
                "no notebook given and no default_notebook configured".into(),
            )
        })
    }
}

pub fn user_config_dir() -> PathBuf {
    std::env::var(CONFIG_DIR_ENV)
        .ok()
        .map(PathBuf::from)
        .or_else(|| ProjectDirs::from("org", "notebook", "notebook").map(|d| d.config_dir().to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// True if `url` names a notebook on the local filesystem.
pub fn is_local(url: &str) -> bool {
    url.starts_with("file://") || !(url.contains("://") || url.starts_with("mem:"))
}

fn local_path(url: &str) -> &Path {
    Path::new(url.strip_prefix("file://").unwrap_or(url))
}

/// Loads the configuration, including a local notebook's own overrides.
pub fn load_config(config_dir: &Path, notebook: Option<&str>) -> NotebookConfig {
    let mut search_paths = vec![SearchPath::Path(config_dir.to_path_buf())];
    if let Some(url) = notebook.filter(|url| is_local(url)) {
        search_paths.push(SearchPath::Path(meta_dir(local_path(url))));
    }

    Clapfig::builder()
        .app_name("notebook")
        .file_name(CONFIG_FILE)
        .search_paths(search_paths)
        .search_mode(SearchMode::Merge)
        .load()
        .unwrap_or_default()
}

/// Builds the context for one run.
///
/// `notebook` is the location given on the command line, if any.
pub fn initialize(notebook: Option<&str>) -> NotebookContext {
    let config_dir = user_config_dir();
    let base = load_config(&config_dir, None);
    let notebook = notebook.map(str::to_string).or_else(|| {
        base.default_notebook
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
    });
    let config = match &notebook {
        Some(url) if is_local(url) => load_config(&config_dir, Some(url)),
        _ => base,
    };
    debug!(config_dir = %config_dir.display(), notebook = ?notebook, "initialized");

    NotebookContext {
        config,
        config_dir,
        notebook,
    }
}

/// Opens a notebook and applies the configuration to it.
pub fn open_notebook(url: &str, config: &NotebookConfig) -> Result<Notebook> {
    let mut notebook = Notebook::load(url)?;
    notebook.enable_fulltext(config.fulltext)?;
    Ok(notebook)
}

/// Creates a notebook and applies the configuration to it.
pub fn create_notebook(url: &str, title: &str, config: &NotebookConfig) -> Result<Notebook> {
    let mut notebook = Notebook::create(url, title)?;
    notebook.enable_fulltext(config.fulltext)?;
    Ok(notebook)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_local() {
        assert!(is_local("/tmp/nb"));
        assert!(is_local("notes"));
        assert!(is_local("file:///tmp/nb"));
        assert!(!is_local("http://localhost:8000/notebook/"));
        assert!(!is_local("mem:"));
    }

    #[test]
    fn test_notebook_config_overrides_user_config() {
        let config_dir = TempDir::new().unwrap();
        std::fs::write(
            config_dir.path().join(CONFIG_FILE),
            "fulltext = false\nserver_port = 9000\n",
        )
        .unwrap();

        let nb_dir = TempDir::new().unwrap();
        let meta = meta_dir(nb_dir.path());
        std::fs::create_dir_all(&meta).unwrap();
        std::fs::write(meta.join(CONFIG_FILE), "server_port = 9100\n").unwrap();

        let url = nb_dir.path().to_string_lossy().into_owned();
        let config = load_config(config_dir.path(), Some(&url));
        assert!(!config.fulltext);
        assert_eq!(config.server_port, 9100);
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let config_dir = TempDir::new().unwrap();
        let config = load_config(config_dir.path(), Some("http://localhost:8000/notebook/"));
        assert_eq!(config, NotebookConfig::default());
    }

    #[test]
    fn test_create_then_open() {
        let dir = TempDir::new().unwrap();
        let url = dir.path().join("nb").to_string_lossy().into_owned();
        let config = NotebookConfig::default();
        let nb = create_notebook(&url, "Mine", &config).unwrap();
        let rootid = nb.rootid().to_string();
        nb.close().unwrap();

        let mut nb = open_notebook(&url, &config).unwrap();
        assert_eq!(nb.rootid(), rootid);
        assert_eq!(nb.root().unwrap().title(), "Mine");
    }

    #[test]
    fn test_context_requires_notebook() {
        let ctx = NotebookContext {
            config: NotebookConfig::default(),
            config_dir: PathBuf::from("."),
            notebook: None,
        };
        assert!(ctx.require_notebook().is_err());
    }
}
