//! # Node Attributes
//!
//! Every node carries a typed attribute bundle. This module provides:
//!
//! - **Values**: [`AttrValue`], the runtime form of one typed value
//! - **Bundles**: [`NodeAttr`], the sorted key/value map of one node, with
//!   accessors for the schema keys every node has
//! - **Definitions**: the registry of known attributes, their types and
//!   defaults, used to coerce legacy text values and to fill in new nodes
//!
//! ## Schema keys
//!
//! | Key | Type | Notes |
//! |-----|------|-------|
//! | `nodeid` | string | stable identity, stored redundantly in the node file |
//! | `version` | integer | notebook format version at write time |
//! | `parentids` | array | derived from the directory tree on read |
//! | `childrenids` | array | derived from the directory tree on read |
//! | `content_type` | string | page, dir, trash or unknown |
//! | `created_time`, `modified_time` | timestamp | notebook epoch seconds |
//!
//! Keys outside the registry round-trip unchanged.

mod defs;
mod value;

pub use defs::{
    apply_defaults, get_def, read_info_sort, read_legacy_value, AttrDef, AttrType, ATTR_DEFS,
};
pub use value::{AttrValue, NodeAttr};
