//! Notebook-wide preferences, stored in `notebook.nbk` at the notebook root.
//!
//! | Key | Type | Default |
//! |-----|------|---------|
//! | `version` | integer | current format version |
//! | `default_font` | string | `Sans 10` |
//! | `index_dir` | string | unset: the index lives in `__NOTEBOOK__/` |
//! | `quick_pick_icons` | array of strings | empty |
//! | `external_apps` | array of `{key, title, prog}` dicts | empty |
//!
//! Keys this version does not know are kept and written back unchanged.

use std::collections::BTreeMap;

use crate::attr::AttrValue;
use crate::error::Result;
use crate::meta::{format_prefs, parse_prefs};
use crate::NOTEBOOK_FORMAT_VERSION;

pub const DEFAULT_FONT: &str = "Sans 10";

/// An external program the notebook can hand files to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalApp {
    pub key: String,
    pub title: String,
    pub prog: String,
}

impl ExternalApp {
    fn from_value(value: &AttrValue) -> Option<ExternalApp> {
        let AttrValue::Dict(map) = value else {
            return None;
        };
        let field = |name: &str| map.get(name).and_then(AttrValue::as_str).unwrap_or("").to_string();
        Some(ExternalApp {
            key: field("key"),
            title: field("title"),
            prog: field("prog"),
        })
    }

    fn to_value(&self) -> AttrValue {
        let mut map = BTreeMap::new();
        map.insert("key".to_string(), AttrValue::from(self.key.as_str()));
        map.insert("title".to_string(), AttrValue::from(self.title.as_str()));
        map.insert("prog".to_string(), AttrValue::from(self.prog.as_str()));
        AttrValue::Dict(map)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotebookPrefs {
    pub version: i64,
    pub default_font: String,
    /// Directory holding `index.sqlite` instead of `__NOTEBOOK__/`.
    pub index_dir: Option<String>,
    pub quick_pick_icons: Vec<String>,
    pub external_apps: Vec<ExternalApp>,
    extra: BTreeMap<String, AttrValue>,
}

impl Default for NotebookPrefs {
    fn default() -> Self {
        Self {
            version: NOTEBOOK_FORMAT_VERSION,
            default_font: DEFAULT_FONT.to_string(),
            index_dir: None,
            quick_pick_icons: Vec::new(),
            external_apps: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl NotebookPrefs {
    /// Fails with [`crate::error::NotebookError::VersionMismatch`] when the
    /// file was written by a newer format.
    pub fn parse(text: &str) -> Result<NotebookPrefs> {
        let (version, mut map) = parse_prefs(text)?;
        let mut prefs = NotebookPrefs {
            version,
            ..NotebookPrefs::default()
        };

        if let Some(font) = map.remove("default_font").as_ref().and_then(AttrValue::as_str) {
            prefs.default_font = font.to_string();
        }
        prefs.index_dir = map
            .remove("index_dir")
            .as_ref()
            .and_then(AttrValue::as_str)
            .filter(|dir| !dir.is_empty())
            .map(str::to_string);
        if let Some(icons) = map.remove("quick_pick_icons").as_ref().and_then(AttrValue::as_string_list) {
            prefs.quick_pick_icons = icons;
        }
        if let Some(AttrValue::Array(apps)) = map.remove("external_apps") {
            prefs.external_apps = apps.iter().filter_map(ExternalApp::from_value).collect();
        }
        map.remove("version");
        prefs.extra = map;
        Ok(prefs)
    }

    pub fn format(&self) -> String {
        let mut map = self.extra.clone();
        map.insert("default_font".into(), AttrValue::from(self.default_font.as_str()));
        if let Some(dir) = &self.index_dir {
            map.insert("index_dir".into(), AttrValue::from(dir.as_str()));
        }
        map.insert("quick_pick_icons".into(), AttrValue::from(self.quick_pick_icons.clone()));
        map.insert(
            "external_apps".into(),
            AttrValue::Array(self.external_apps.iter().map(ExternalApp::to_value).collect()),
        );
        format_prefs(self.version, &map)
    }

    /// Settings this version does not interpret.
    pub fn extra(&self) -> &BTreeMap<String, AttrValue> {
        &self.extra
    }

    pub fn external_app(&self, key: &str) -> Option<&ExternalApp> {
        self.external_apps.iter().find(|app| app.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotebookError;

    #[test]
    fn test_round_trip_keeps_unknown_keys() {
        let mut prefs = NotebookPrefs::default();
        prefs.index_dir = Some("/var/cache/nb".into());
        prefs.quick_pick_icons = vec!["star.png".into(), "flag.png".into()];
        prefs.external_apps.push(ExternalApp {
            key: "web_browser".into(),
            title: "Web Browser".into(),
            prog: "firefox".into(),
        });
        prefs.extra.insert("window_size".into(), AttrValue::from("800x600"));

        let parsed = NotebookPrefs::parse(&prefs.format()).unwrap();
        assert_eq!(parsed, prefs);
        assert_eq!(parsed.external_app("web_browser").unwrap().prog, "firefox");
    }

    #[test]
    fn test_defaults_for_sparse_file() {
        let text = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<notebook>\n<version>4</version>\n</notebook>\n";
        let prefs = NotebookPrefs::parse(text).unwrap();
        assert_eq!(prefs.version, 4);
        assert_eq!(prefs.default_font, DEFAULT_FONT);
        assert!(prefs.index_dir.is_none());
        assert!(prefs.quick_pick_icons.is_empty());
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let text = "<notebook>\n<version>99</version>\n</notebook>\n";
        assert!(matches!(
            NotebookPrefs::parse(text),
            Err(NotebookError::VersionMismatch { found: 99, .. })
        ));
    }
}
