//! Typed index queries.
//!
//! On the HTTP wire a query is a JSON list whose first element names it,
//! e.g. `["search", "title", "foo"]` or `["node_path", "n1"]`.

use serde_json::{json, Value};

use crate::attr::{AttrType, AttrValue};
use crate::error::{NotebookError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum IndexQuery {
    /// Creates the schema, rebuilding it on a version change.
    Init,
    /// Drops the database and starts empty.
    Clear,
    IndexNeeded,
    SetIndexNeeded(bool),
    /// Reindexes the whole tree; answers the visited ids.
    IndexAll,
    Compact,
    HasFulltext,
    EnableFulltext(bool),
    /// Ids from the root down to the node, or nothing if unknown.
    NodePath(String),
    /// `(nodeid, basename)` of each indexed child.
    ListChildren(String),
    HasChildren(String),
    HasNode(String),
    /// Title substring search, answering `(nodeid, title)` pairs.
    SearchTitles(String),
    SearchFulltext(String),
    GetAttr { nodeid: String, key: String },
    IndexAttr {
        key: String,
        datatype: AttrType,
        index_value: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexResult {
    Unit,
    Bool(bool),
    NodeIds(Vec<String>),
    NodePath(Option<Vec<String>>),
    Pairs(Vec<(String, String)>),
    Value(Option<AttrValue>),
}

impl IndexQuery {
    pub fn to_wire(&self) -> Value {
        match self {
            IndexQuery::Init => json!(["init"]),
            IndexQuery::Clear => json!(["clear"]),
            IndexQuery::IndexNeeded => json!(["index_needed"]),
            IndexQuery::SetIndexNeeded(v) => json!(["set_index_needed", v]),
            IndexQuery::IndexAll => json!(["index_all"]),
            IndexQuery::Compact => json!(["compact"]),
            IndexQuery::HasFulltext => json!(["has_fulltext"]),
            IndexQuery::EnableFulltext(v) => json!(["enable_fulltext", v]),
            IndexQuery::NodePath(n) => json!(["node_path", n]),
            IndexQuery::ListChildren(n) => json!(["list_children", n]),
            IndexQuery::HasChildren(n) => json!(["has_children", n]),
            IndexQuery::HasNode(n) => json!(["has_node", n]),
            IndexQuery::SearchTitles(q) => json!(["search", "title", q]),
            IndexQuery::SearchFulltext(q) => json!(["search_fulltext", q]),
            IndexQuery::GetAttr { nodeid, key } => json!(["get_attr", nodeid, key]),
            IndexQuery::IndexAttr {
                key,
                datatype,
                index_value,
            } => json!(["index_attr", key, datatype.name(), index_value]),
        }
    }

    pub fn from_wire(value: &Value) -> Result<IndexQuery> {
        let items = value
            .as_array()
            .ok_or_else(|| bad_query(value, "query must be a list"))?;
        let name = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| bad_query(value, "query has no name"))?;
        let text = |i: usize| -> Result<String> {
            items
                .get(i)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| bad_query(value, "missing text argument"))
        };
        let flag = |i: usize| -> Result<bool> {
            items
                .get(i)
                .and_then(Value::as_bool)
                .ok_or_else(|| bad_query(value, "missing boolean argument"))
        };

        let query = match name {
            "init" => IndexQuery::Init,
            "clear" | "clear_index" => IndexQuery::Clear,
            "index_needed" => IndexQuery::IndexNeeded,
            "set_index_needed" => IndexQuery::SetIndexNeeded(flag(1)?),
            "index_all" => IndexQuery::IndexAll,
            "compact" => IndexQuery::Compact,
            "has_fulltext" => IndexQuery::HasFulltext,
            "enable_fulltext" => IndexQuery::EnableFulltext(flag(1)?),
            "node_path" => IndexQuery::NodePath(text(1)?),
            "list_children" => IndexQuery::ListChildren(text(1)?),
            "has_children" => IndexQuery::HasChildren(text(1)?),
            "has_node" => IndexQuery::HasNode(text(1)?),
            "search" => {
                let field = text(1)?;
                if field != "title" {
                    return Err(bad_query(value, "only title search is supported"));
                }
                IndexQuery::SearchTitles(text(2)?)
            }
            "search_fulltext" => IndexQuery::SearchFulltext(text(1)?),
            "get_attr" => IndexQuery::GetAttr {
                nodeid: text(1)?,
                key: text(2)?,
            },
            "index_attr" => {
                let type_name = text(2)?;
                IndexQuery::IndexAttr {
                    key: text(1)?,
                    datatype: AttrType::from_name(&type_name)
                        .ok_or_else(|| bad_query(value, "unknown attribute type"))?,
                    index_value: items.get(3).and_then(Value::as_bool).unwrap_or(false),
                }
            }
            _ => return Err(bad_query(value, "unknown query")),
        };
        Ok(query)
    }
}

fn bad_query(value: &Value, why: &str) -> NotebookError {
    NotebookError::Parse(format!("{}: {}", why, value))
}

impl IndexResult {
    pub fn to_wire(&self) -> Value {
        match self {
            IndexResult::Unit => Value::Null,
            IndexResult::Bool(v) => json!(v),
            IndexResult::NodeIds(ids) => json!(ids),
            IndexResult::NodePath(path) => json!(path),
            IndexResult::Pairs(pairs) => Value::Array(
                pairs
                    .iter()
                    .map(|(a, b)| json!([a, b]))
                    .collect(),
            ),
            IndexResult::Value(v) => v.as_ref().map(AttrValue::to_json).unwrap_or(Value::Null),
        }
    }

    /// Decodes a wire answer; the query says which shape to expect.
    pub fn from_wire(query: &IndexQuery, value: &Value) -> Result<IndexResult> {
        let bad = || NotebookError::Parse(format!("unexpected index answer: {}", value));
        let strings = |v: &Value| -> Result<Vec<String>> {
            v.as_array()
                .ok_or_else(bad)?
                .iter()
                .map(|s| s.as_str().map(str::to_string).ok_or_else(bad))
                .collect()
        };

        let result = match query {
            IndexQuery::Init
            | IndexQuery::Clear
            | IndexQuery::SetIndexNeeded(_)
            | IndexQuery::Compact
            | IndexQuery::EnableFulltext(_)
            | IndexQuery::IndexAttr { .. } => IndexResult::Unit,
            IndexQuery::IndexNeeded
            | IndexQuery::HasFulltext
            | IndexQuery::HasChildren(_)
            | IndexQuery::HasNode(_) => IndexResult::Bool(value.as_bool().ok_or_else(bad)?),
            IndexQuery::IndexAll | IndexQuery::SearchFulltext(_) => {
                IndexResult::NodeIds(strings(value)?)
            }
            IndexQuery::NodePath(_) => match value {
                Value::Null => IndexResult::NodePath(None),
                other => IndexResult::NodePath(Some(strings(other)?)),
            },
            IndexQuery::ListChildren(_) | IndexQuery::SearchTitles(_) => {
                let mut pairs = Vec::new();
                for item in value.as_array().ok_or_else(bad)? {
                    let pair = strings(item)?;
                    let [a, b] = <[String; 2]>::try_from(pair).map_err(|_| bad())?;
                    pairs.push((a, b));
                }
                IndexResult::Pairs(pairs)
            }
            IndexQuery::GetAttr { .. } => match value {
                Value::Null => IndexResult::Value(None),
                other => IndexResult::Value(Some(AttrValue::from_json(other))),
            },
        };
        Ok(result)
    }

    pub fn as_bool(&self) -> bool {
        matches!(self, IndexResult::Bool(true))
    }

    pub fn into_nodeids(self) -> Vec<String> {
        match self {
            IndexResult::NodeIds(ids) => ids,
            IndexResult::NodePath(Some(ids)) => ids,
            IndexResult::Pairs(pairs) => pairs.into_iter().map(|(id, _)| id).collect(),
            _ => Vec::new(),
        }
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        match self {
            IndexResult::Pairs(pairs) => pairs,
            _ => Vec::new(),
        }
    }

    pub fn into_node_path(self) -> Option<Vec<String>> {
        match self {
            IndexResult::NodePath(path) => path,
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<AttrValue> {
        match self {
            IndexResult::Value(v) => v,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(
            IndexQuery::SearchTitles("foo".into()).to_wire(),
            json!(["search", "title", "foo"])
        );
        assert_eq!(
            IndexQuery::from_wire(&json!(["node_path", "n1"])).unwrap(),
            IndexQuery::NodePath("n1".into())
        );
        assert_eq!(
            IndexQuery::from_wire(&json!(["index_attr", "icon", "string"])).unwrap(),
            IndexQuery::IndexAttr {
                key: "icon".into(),
                datatype: AttrType::String,
                index_value: false
            }
        );
    }

    #[test]
    fn test_bad_queries() {
        assert!(IndexQuery::from_wire(&json!({"q": 1})).is_err());
        assert!(IndexQuery::from_wire(&json!([])).is_err());
        assert!(IndexQuery::from_wire(&json!(["bogus"])).is_err());
        assert!(IndexQuery::from_wire(&json!(["search", "body", "x"])).is_err());
        assert!(IndexQuery::from_wire(&json!(["node_path"])).is_err());
    }

    #[test]
    fn test_result_shapes() {
        let q = IndexQuery::SearchTitles("a".into());
        let wire = json!([["n1", "abc"], ["n2", "bab"]]);
        let result = IndexResult::from_wire(&q, &wire).unwrap();
        assert_eq!(result.to_wire(), wire);
        assert_eq!(result.into_nodeids(), vec!["n1", "n2"]);

        let q = IndexQuery::NodePath("x".into());
        assert_eq!(
            IndexResult::from_wire(&q, &Value::Null).unwrap(),
            IndexResult::NodePath(None)
        );
        assert!(IndexResult::from_wire(&IndexQuery::HasNode("x".into()), &json!("yes")).is_err());
    }
}
