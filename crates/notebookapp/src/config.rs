//! # Configuration
//!
//! Application settings are managed by [`clapfig`], which layers TOML files,
//! environment variables and compiled defaults. These are settings of the
//! program, not of a notebook: notebook-wide preferences live in the
//! notebook's own `notebook.nbk` (see [`crate::notebook::NotebookPrefs`]).
//!
//! ## Storage Hierarchy
//!
//! Configuration is resolved in priority order:
//! 1. **Environment variables**: `NOTEBOOK__FULLTEXT`, `NOTEBOOK__SERVER_PORT`, etc.
//! 2. **Notebook Config**: `<notebook>/__NOTEBOOK__/notebook.toml`, for a local notebook.
//! 3. **User Config**: `notebook.toml` in the OS config directory (via `directories`).
//! 4. **Compiled Defaults**: built-in fallbacks via `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `fulltext` | `true` | Keep a full-text table in the index when sqlite supports it |
//! | `server_host` | `127.0.0.1` | Address `start-http-server` binds to |
//! | `server_port` | `8000` | Port used when none is given |
//! | `default_notebook` | unset | Notebook opened when `--notebook` is absent |

use std::path::PathBuf;

use confique::Config;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "notebook.toml";

/// Configuration for the notebook tools, stored in `notebook.toml`.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NotebookConfig {
    /// Index page text for full-text search.
    #[config(default = true)]
    pub fulltext: bool,

    /// Host the HTTP server binds to. Anything but loopback exposes the
    /// notebook without authentication.
    #[config(default = "127.0.0.1")]
    pub server_host: String,

    #[config(default = 8000)]
    pub server_port: u16,

    /// Notebook to open when none is named on the command line.
    pub default_notebook: Option<PathBuf>,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            fulltext: true,
            server_host: "127.0.0.1".to_string(),
            server_port: 8000,
            default_notebook: None,
        }
    }
}

impl NotebookConfig {
    /// `http://host:port/notebook/` for the configured server.
    pub fn server_url(&self, port: Option<u16>) -> String {
        format!(
            "http://{}:{}/notebook/",
            self.server_host,
            port.unwrap_or(self.server_port)
        )
    }
}
