//! Node metadata (`node.xml`) and notebook preference (`notebook.nbk`) files.
//!
//! Node files carry a version header, the node id, and the attribute bundle
//! as a plist `<dict>`:
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <node>
//! <version>5</version>
//! <id>b810760f-...</id>
//! <dict>
//!   <key>title</key><string>Page</string>
//!   ...
//! </dict>
//! </node>
//! ```
//!
//! Older notebooks stored one `<attr key="...">text</attr>` element per
//! attribute. That layout is still read, using the attribute registry to
//! restore types. Writes always produce the `<dict>` layout.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::attr::{read_legacy_value, AttrValue, NodeAttr};
use crate::error::{NotebookError, Result};
use crate::plist::{self, xml::Element};
use crate::safefile::SafeFile;
use crate::NOTEBOOK_FORMAT_VERSION;

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Header fields stored outside the attribute dict.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaHeader {
    pub version: Option<i64>,
    pub nodeid: Option<String>,
}

/// Parses the text of a node metadata file.
///
/// The header's version and id are copied into the returned attributes.
/// Fails with [`NotebookError::VersionMismatch`] on a version newer than
/// this build understands.
pub fn parse_node_meta(text: &str) -> Result<(NodeAttr, MetaHeader)> {
    let root = plist::parse_document(text)?;
    if root.name != "node" {
        return Err(NotebookError::Parse(format!(
            "root tag is not 'node': {:?}",
            root.name
        )));
    }

    let mut attr = NodeAttr::new();
    let mut header = MetaHeader::default();
    for child in root.elements() {
        match child.name.as_str() {
            "dict" => {
                if let AttrValue::Dict(map) = plist::load(child)? {
                    attr = NodeAttr::from(map);
                }
            }
            "version" => header.version = Some(parse_int(child)?),
            "id" => header.nodeid = Some(child.text()),
            "attr" => {
                let key = child.attr("key").ok_or_else(|| {
                    NotebookError::Parse("<attr> element without a key".into())
                })?;
                attr.insert(key, read_legacy_value(key, &child.text()));
            }
            _ => {}
        }
    }

    if header.nodeid.is_none() {
        header.nodeid = attr.nodeid().map(str::to_string);
    }
    if let Some(version) = header.version {
        if version > NOTEBOOK_FORMAT_VERSION {
            return Err(NotebookError::VersionMismatch {
                found: version,
                supported: NOTEBOOK_FORMAT_VERSION,
            });
        }
        attr.insert("version", version);
    }
    if let Some(nodeid) = &header.nodeid {
        attr.insert("nodeid", nodeid.as_str());
    }

    Ok((attr, header))
}

/// Reads a node metadata file from disk.
pub fn read_node_meta(path: &Path) -> Result<(NodeAttr, MetaHeader)> {
    let text = fs::read_to_string(path)?;
    parse_node_meta(&text).map_err(|e| match e {
        NotebookError::Parse(msg) => {
            NotebookError::Parse(format!("error reading '{}': {}", path.display(), msg))
        }
        other => other,
    })
}

/// Renders a node metadata file, leaving out the `skip` keys.
pub fn format_node_meta(nodeid: &str, attr: &NodeAttr, skip: &[&str]) -> String {
    let version = attr.get_i64("version").unwrap_or(NOTEBOOK_FORMAT_VERSION);
    let dict: BTreeMap<String, AttrValue> = attr
        .iter()
        .filter(|(k, _)| !skip.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut out = String::from(XML_HEADER);
    out.push_str("<node>\n");
    out.push_str(&format!("<version>{}</version>\n", version));
    out.push_str(&format!("<id>{}</id>\n", plist::escape(nodeid)));
    plist::dump(&AttrValue::Dict(dict), &mut out, 2, 0, false);
    out.push_str("</node>\n");
    out
}

/// Writes a node metadata file atomically.
pub fn write_node_meta(path: &Path, nodeid: &str, attr: &NodeAttr, skip: &[&str]) -> Result<()> {
    if let Some(stored) = attr.nodeid() {
        if stored != nodeid {
            return Err(NotebookError::Connection(format!(
                "nodeid mismatch writing metadata: {:?} != {:?}",
                stored, nodeid
            )));
        }
    }
    let text = format_node_meta(nodeid, attr, skip);
    let mut out = SafeFile::create(path)?;
    out.write_all(text.as_bytes())?;
    out.close()?;
    Ok(())
}

/// Parses a preference file into its version and settings dict.
///
/// A missing version means the current one.
pub fn parse_prefs(text: &str) -> Result<(i64, BTreeMap<String, AttrValue>)> {
    let root = plist::parse_document(text)?;
    if root.name != "notebook" {
        return Err(NotebookError::Parse(
            "notebook preference data is corrupt".into(),
        ));
    }

    let version = match root.find("version") {
        Some(elem) => parse_int(elem)?,
        None => NOTEBOOK_FORMAT_VERSION,
    };
    if version > NOTEBOOK_FORMAT_VERSION {
        return Err(NotebookError::VersionMismatch {
            found: version,
            supported: NOTEBOOK_FORMAT_VERSION,
        });
    }

    let mut prefs = BTreeMap::new();
    if let Some(dict) = root.find("pref").and_then(|p| p.find("dict")) {
        if let AttrValue::Dict(map) = plist::load(dict)? {
            prefs = map;
        }
    }
    Ok((version, prefs))
}

pub fn format_prefs(version: i64, prefs: &BTreeMap<String, AttrValue>) -> String {
    let mut out = String::from(XML_HEADER);
    out.push_str("<notebook>\n");
    out.push_str(&format!("<version>{}</version>\n", version));
    out.push_str("<pref>\n");
    plist::dump(&AttrValue::Dict(prefs.clone()), &mut out, 2, 0, false);
    out.push_str("</pref>\n");
    out.push_str("</notebook>\n");
    out
}

pub fn read_prefs(path: &Path) -> Result<(i64, BTreeMap<String, AttrValue>)> {
    let text = fs::read_to_string(path)?;
    parse_prefs(&text)
}

pub fn write_prefs(path: &Path, version: i64, prefs: &BTreeMap<String, AttrValue>) -> Result<()> {
    let mut out = SafeFile::create(path)?;
    out.write_all(format_prefs(version, prefs).as_bytes())?;
    out.close()?;
    Ok(())
}

/// Reads only the format version of a notebook directory or preference file.
pub fn notebook_version(path: &Path) -> Result<i64> {
    let file = if path.is_dir() {
        crate::paths::pref_file(path)
    } else {
        path.to_path_buf()
    };
    let text = fs::read_to_string(&file)?;
    let root = plist::parse_document(&text)?;
    if root.name != "notebook" {
        return Err(NotebookError::Parse(
            "notebook preference data is corrupt".into(),
        ));
    }
    match root.find("version") {
        Some(elem) => parse_int(elem),
        None => Ok(NOTEBOOK_FORMAT_VERSION),
    }
}

fn parse_int(elem: &Element) -> Result<i64> {
    let text = elem.text();
    text.trim()
        .parse()
        .map_err(|_| NotebookError::Parse(format!("unknown version string {:?}", text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> NodeAttr {
        NodeAttr::new()
            .with("nodeid", "n1")
            .with("version", NOTEBOOK_FORMAT_VERSION)
            .with("title", "A <tricky> & \"quoted\" title")
            .with("content_type", crate::CONTENT_TYPE_PAGE)
            .with("order", 3i64)
            .with("expanded", true)
            .with("icon", AttrValue::Null)
            .with("parentids", vec!["p".to_string()])
            .with("childrenids", Vec::<String>::new())
    }

    #[test]
    fn test_roundtrip() {
        let attr = sample();
        let text = format_node_meta("n1", &attr, &[]);
        let (back, header) = parse_node_meta(&text).unwrap();
        assert_eq!(back, attr);
        assert_eq!(header.nodeid.as_deref(), Some("n1"));
        assert_eq!(header.version, Some(NOTEBOOK_FORMAT_VERSION));
    }

    #[test]
    fn test_skip_keys() {
        let text = format_node_meta("n1", &sample(), &["parentids", "childrenids"]);
        assert!(!text.contains("parentids"));
        let (back, _) = parse_node_meta(&text).unwrap();
        assert!(back.get("parentids").is_none());
        assert_eq!(back.title(), "A <tricky> & \"quoted\" title");
    }

    #[test]
    fn test_layout() {
        let attr = NodeAttr::new().with("title", "x");
        let text = format_node_meta("id1", &attr, &[]);
        assert_eq!(
            text,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<node>\n<version>5</version>\n<id>id1</id>\n<dict>\n  <key>title</key><string>x</string>\n</dict>\n</node>\n"
        );
    }

    #[test]
    fn test_legacy_layout() {
        let text = "<?xml version=\"1.0\"?>\n<node>\n<version>2</version>\n\
            <attr key=\"title\">Old page</attr>\n\
            <attr key=\"nodeid\">old1</attr>\n\
            <attr key=\"expanded\">0</attr>\n\
            <attr key=\"order\">4</attr>\n\
            <attr key=\"info_sort\">3</attr>\n\
            <attr key=\"custom\">7</attr>\n</node>\n";
        let (attr, header) = parse_node_meta(text).unwrap();
        assert_eq!(header.nodeid.as_deref(), Some("old1"));
        assert_eq!(attr.title(), "Old page");
        assert_eq!(attr.get_bool("expanded"), Some(false));
        assert_eq!(attr.get_i64("order"), Some(4));
        assert_eq!(attr.get_str("info_sort"), Some("created_time"));
        assert_eq!(attr.get_str("custom"), Some("7"));
        assert_eq!(attr.get_i64("version"), Some(2));
    }

    #[test]
    fn test_newer_version_rejected() {
        let text = "<node><version>9</version><id>x</id><dict></dict></node>";
        assert!(matches!(
            parse_node_meta(text),
            Err(NotebookError::VersionMismatch { found: 9, .. })
        ));
    }

    #[test]
    fn test_wrong_root_rejected() {
        assert!(matches!(
            parse_node_meta("<notebook></notebook>"),
            Err(NotebookError::Parse(_))
        ));
        assert!(parse_node_meta("<node><dict><key>a</key>").is_err());
    }

    #[test]
    fn test_write_rejects_mismatched_id() {
        let dir = TempDir::new().unwrap();
        let attr = NodeAttr::new().with("nodeid", "a");
        assert!(write_node_meta(&dir.path().join("node.xml"), "b", &attr, &[]).is_err());
    }

    #[test]
    fn test_write_read_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("node.xml");
        write_node_meta(&path, "n1", &sample(), &[]).unwrap();
        let (attr, _) = read_node_meta(&path).unwrap();
        assert_eq!(attr, sample());
    }

    #[test]
    fn test_prefs_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notebook.nbk");
        let mut prefs = BTreeMap::new();
        prefs.insert("default_font".to_string(), AttrValue::from("Sans 10"));
        prefs.insert(
            "quick_pick_icons".to_string(),
            AttrValue::from(vec!["note.png".to_string()]),
        );
        write_prefs(&path, NOTEBOOK_FORMAT_VERSION, &prefs).unwrap();

        let (version, back) = read_prefs(&path).unwrap();
        assert_eq!(version, NOTEBOOK_FORMAT_VERSION);
        assert_eq!(back, prefs);
        assert_eq!(notebook_version(dir.path()).unwrap(), NOTEBOOK_FORMAT_VERSION);
    }

    #[test]
    fn test_prefs_missing_version_is_current() {
        let (version, prefs) = parse_prefs("<notebook><pref><dict></dict></pref></notebook>").unwrap();
        assert_eq!(version, NOTEBOOK_FORMAT_VERSION);
        assert!(prefs.is_empty());
    }

    #[test]
    fn test_prefs_newer_version_rejected() {
        assert!(matches!(
            parse_prefs("<notebook><version>6</version></notebook>"),
            Err(NotebookError::VersionMismatch { found: 6, supported: 5 })
        ));
    }
}
