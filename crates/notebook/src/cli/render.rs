//! # Rendering
//!
//! Turns library values into terminal text. Styling goes through `console`,
//! which drops colors when stdout is not a terminal.

use std::time::Duration;

use console::Style;
use notebookapp::notebook::Node;
use notebookapp::sync::SyncStats;
use notebookapp::timestamp::to_local;
use serde::Serialize;

const INDENT: &str = "  ";

/// One line of `notebook tree`.
#[derive(Debug, Clone, Serialize)]
pub struct TreeEntry {
    pub nodeid: String,
    pub title: String,
    pub kind: &'static str,
    pub depth: usize,
}

impl TreeEntry {
    pub fn new(node: &Node, depth: usize) -> TreeEntry {
        TreeEntry {
            nodeid: node.nodeid().to_string(),
            title: node.title().to_string(),
            kind: kind(node),
            depth,
        }
    }
}

fn kind(node: &Node) -> &'static str {
    if node.is_trash() {
        "trash"
    } else if node.is_page() {
        "page"
    } else if node.is_dir() {
        "folder"
    } else {
        "file"
    }
}

pub fn render_tree(entries: &[TreeEntry]) -> String {
    let folder = Style::new().bold();
    let trash = Style::new().dim();
    let id = Style::new().dim();

    let mut out = String::new();
    for entry in entries {
        let title = match entry.kind {
            "folder" => folder.apply_to(&entry.title).to_string(),
            "trash" => trash.apply_to(&entry.title).to_string(),
            _ => entry.title.clone(),
        };
        out.push_str(&format!(
            "{}{}  {}\n",
            INDENT.repeat(entry.depth),
            title,
            id.apply_to(&entry.nodeid)
        ));
    }
    out
}

/// `"3 hours ago"` style age of `timestamp` relative to `now`.
pub fn relative_time(timestamp: i64, now: i64) -> String {
    let age = Duration::from_secs(now.saturating_sub(timestamp).max(0) as u64);
    timeago::Formatter::new().convert(age)
}

fn absolute_time(timestamp: i64) -> String {
    to_local(timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

pub fn render_node(node: &Node, files: &[String], now: i64) -> String {
    let label = Style::new().bold();
    let mut lines = vec![
        ("title", node.title().to_string()),
        ("id", node.nodeid().to_string()),
        ("type", format!("{} ({})", kind(node), node.content_type())),
    ];
    if let Some(parent) = node.parent_id() {
        lines.push(("parent", parent));
    }
    lines.push(("children", node.childrenids().len().to_string()));
    for (key, time) in [("created", node.created_time()), ("modified", node.modified_time())] {
        lines.push((key, format!("{} ({})", absolute_time(time), relative_time(time, now))));
    }
    if let Some(icon) = node.icon() {
        lines.push(("icon", icon.to_string()));
    }
    if !files.is_empty() {
        lines.push(("files", files.join(", ")));
    }

    lines
        .into_iter()
        .map(|(key, value)| format!("{:<9} {}\n", label.apply_to(format!("{}:", key)), value))
        .collect()
}

/// `(nodeid, title)` pairs, one per line.
pub fn render_matches(matches: &[(String, String)]) -> String {
    if matches.is_empty() {
        return "No matches.\n".to_string();
    }
    let id = Style::new().dim();
    matches
        .iter()
        .map(|(nodeid, title)| format!("{}  {}\n", title, id.apply_to(nodeid)))
        .collect()
}

pub fn render_sync(stats: &SyncStats) -> String {
    format!(
        "Synced: {} created, {} updated, {} unchanged.\n",
        stats.created, stats.updated, stats.kept
    )
}

pub fn success(message: &str) -> String {
    format!("{}\n", Style::new().green().apply_to(message))
}
