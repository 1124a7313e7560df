//! # CLI Behavior
//!
//! This is **one possible UI client** for notebooks, not the application
//! itself. It is the only place that knows about terminal I/O, exit codes and
//! output formatting.
//!
//! ## Choosing a notebook
//!
//! Commands that work on a notebook use `--notebook <path-or-url>` when
//! given, else `default_notebook` from `notebook.toml`. A URL of the form
//! `http://host:port/notebook/` works anywhere a path does.
//!
//! ## Node arguments
//!
//! Node ids are printed by `tree` and `new`. The words `root` and `trash`
//! stand for the notebook's root and trash nodes.
//!
//! ## Logging
//!
//! Log output goes to stderr, filtered by `NOTEBOOK_LOG` (an `EnvFilter`
//! directive, default `warn`). `-v` raises the default to `debug`.
//!
//! ## Module Structure
//!
//! - `setup`: argument parsing via clap
//! - `commands`: per-command handlers that call the library and print
//! - `render`: output formatting

mod commands;
mod render;
pub mod setup;

pub use commands::run;
