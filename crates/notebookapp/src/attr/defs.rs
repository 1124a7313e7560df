//! Attribute definitions and registry.
//!
//! A definition names a node attribute, the type its value has, and how to
//! produce a default for it. The registry is used when reading the legacy
//! `<attr key="..">text</attr>` layout, where every value arrives as text and
//! has to be coerced by key, and when a fresh node needs its defaults filled in.

use uuid::Uuid;

use super::value::{AttrValue, NodeAttr};
use crate::timestamp::get_timestamp;

/// Value type of a registered attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    String,
    Integer,
    Float,
    /// Integer seconds since the notebook epoch.
    Timestamp,
    Bool,
}

impl AttrType {
    /// Column type used for the attribute's index table.
    pub fn sql_type(self) -> &'static str {
        match self {
            AttrType::String => "TEXT",
            AttrType::Integer | AttrType::Timestamp => "INTEGER",
            AttrType::Float => "FLOAT",
            AttrType::Bool => "BOOLEAN",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AttrType::String => "string",
            AttrType::Integer => "integer",
            AttrType::Float => "float",
            AttrType::Timestamp => "timestamp",
            AttrType::Bool => "bool",
        }
    }

    pub fn from_name(name: &str) -> Option<AttrType> {
        match name {
            "string" | "text" => Some(AttrType::String),
            "integer" | "int" => Some(AttrType::Integer),
            "float" | "real" => Some(AttrType::Float),
            "timestamp" => Some(AttrType::Timestamp),
            "bool" => Some(AttrType::Bool),
            _ => None,
        }
    }

    /// Coerces the textual form of a value into this type.
    ///
    /// Booleans are stored as `0`/`1` in the legacy layout. Text that does not
    /// parse is kept as a string rather than dropped.
    pub fn parse_text(self, text: &str) -> AttrValue {
        let trimmed = text.trim();
        match self {
            AttrType::String => AttrValue::String(text.to_string()),
            AttrType::Integer | AttrType::Timestamp => trimmed
                .parse::<i64>()
                .map(AttrValue::Integer)
                .unwrap_or_else(|_| AttrValue::String(text.to_string())),
            AttrType::Float => trimmed
                .parse::<f64>()
                .map(AttrValue::Real)
                .unwrap_or_else(|_| AttrValue::String(text.to_string())),
            AttrType::Bool => match trimmed {
                "1" | "True" | "true" => AttrValue::Bool(true),
                "0" | "False" | "false" | "" => AttrValue::Bool(false),
                other => match other.parse::<i64>() {
                    Ok(n) => AttrValue::Bool(n != 0),
                    Err(_) => AttrValue::String(text.to_string()),
                },
            },
        }
    }
}

/// Definition of one attribute.
#[derive(Debug, Clone)]
pub struct AttrDef {
    /// Key under which the value is stored.
    pub key: &'static str,
    /// Human readable name.
    pub name: &'static str,
    pub datatype: AttrType,
    pub default: Option<fn() -> AttrValue>,
    /// Custom reader for the legacy text layout.
    pub read: Option<fn(&str) -> AttrValue>,
}

impl AttrDef {
    const fn new(key: &'static str, datatype: AttrType, name: &'static str) -> Self {
        Self {
            key,
            name,
            datatype,
            default: None,
            read: None,
        }
    }

    const fn default(mut self, f: fn() -> AttrValue) -> Self {
        self.default = Some(f);
        self
    }

    const fn read(mut self, f: fn(&str) -> AttrValue) -> Self {
        self.read = Some(f);
        self
    }

    /// Reads the legacy textual form of this attribute.
    pub fn read_text(&self, text: &str) -> AttrValue {
        match self.read {
            Some(read) => read(text),
            None => self.datatype.parse_text(text),
        }
    }
}

fn new_nodeid() -> AttrValue {
    AttrValue::String(Uuid::new_v4().to_string())
}

fn default_content_type() -> AttrValue {
    AttrValue::String(crate::CONTENT_TYPE_DIR.to_string())
}

fn default_order() -> AttrValue {
    AttrValue::Integer(i64::MAX)
}

fn now() -> AttrValue {
    AttrValue::Integer(get_timestamp())
}

fn yes() -> AttrValue {
    AttrValue::Bool(true)
}

fn sort_by_order() -> AttrValue {
    AttrValue::String("order".to_string())
}

fn ascending() -> AttrValue {
    AttrValue::Integer(1)
}

/// Older notebooks stored the child sort as a small integer.
pub fn read_info_sort(text: &str) -> AttrValue {
    let key = match text.trim() {
        "0" | "1" => "order",
        "2" => "title",
        "3" => "created_time",
        "4" => "modified_time",
        other => other,
    };
    AttrValue::String(key.to_string())
}

/// Registry of known node attributes.
pub const ATTR_DEFS: &[AttrDef] = &[
    AttrDef::new("nodeid", AttrType::String, "Node ID").default(new_nodeid),
    AttrDef::new("content_type", AttrType::String, "Content type").default(default_content_type),
    AttrDef::new("title", AttrType::String, "Title"),
    AttrDef::new("order", AttrType::Integer, "Order").default(default_order),
    AttrDef::new("created_time", AttrType::Timestamp, "Created time").default(now),
    AttrDef::new("modified_time", AttrType::Timestamp, "Modified time").default(now),
    AttrDef::new("expanded", AttrType::Bool, "Expanded").default(yes),
    AttrDef::new("expanded2", AttrType::Bool, "Expanded2").default(yes),
    AttrDef::new("info_sort", AttrType::String, "Folder sort")
        .default(sort_by_order)
        .read(read_info_sort),
    AttrDef::new("info_sort_dir", AttrType::Integer, "Folder sort direction").default(ascending),
    AttrDef::new("icon", AttrType::String, "Icon"),
    AttrDef::new("icon_open", AttrType::String, "Icon open"),
    AttrDef::new("payload_filename", AttrType::String, "Filename"),
    AttrDef::new("duplicate_of", AttrType::String, "Duplicate of"),
];

/// Look up an attribute definition by key.
pub fn get_def(key: &str) -> Option<&'static AttrDef> {
    ATTR_DEFS.iter().find(|def| def.key == key)
}

/// Reads a legacy text value. Unknown keys stay opaque strings.
pub fn read_legacy_value(key: &str, text: &str) -> AttrValue {
    match get_def(key) {
        Some(def) => def.read_text(text),
        None => AttrValue::String(text.to_string()),
    }
}

/// Fills in every registered default that `attr` is missing.
pub fn apply_defaults(attr: &mut NodeAttr) {
    for def in ATTR_DEFS {
        if let Some(default) = def.default {
            if !attr.contains_key(def.key) {
                attr.insert(def.key, default());
            }
        }
    }
}
