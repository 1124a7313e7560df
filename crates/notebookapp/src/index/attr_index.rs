use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};

use crate::attr::{AttrType, AttrValue, NodeAttr};

/// Mirrors one node attribute into its own `Attr_<name>` table.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrIndex {
    name: String,
    datatype: AttrType,
    index_value: bool,
}

impl AttrIndex {
    pub fn new(name: &str, datatype: AttrType, index_value: bool) -> AttrIndex {
        AttrIndex {
            name: name.to_string(),
            datatype,
            index_value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> AttrType {
        self.datatype
    }

    pub fn table_name(&self) -> String {
        format!("Attr_{}", self.name)
    }

    /// Creates the table if needed. Returns true when it was created.
    pub fn init(&self, con: &Connection) -> rusqlite::Result<bool> {
        let existed = table_exists(con, &self.table_name())?;
        con.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\"
                (nodeid TEXT, value {sqltype}, UNIQUE(nodeid) ON CONFLICT REPLACE);
             CREATE INDEX IF NOT EXISTS \"IdxAttr_{name}_nodeid\" ON \"{table}\" (nodeid);",
            table = self.table_name(),
            sqltype = self.datatype.sql_type(),
            name = self.name,
        ))?;
        if self.index_value {
            con.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS \"IdxAttr_{name}_value\" ON \"{table}\" (value);",
                table = self.table_name(),
                name = self.name,
            ))?;
        }
        Ok(!existed)
    }

    pub fn add_node(&self, con: &Connection, nodeid: &str, attr: &NodeAttr) -> rusqlite::Result<()> {
        match attr.get(&self.name).and_then(to_sql) {
            Some(value) => {
                con.execute(
                    &format!("INSERT INTO \"{}\" VALUES (?1, ?2)", self.table_name()),
                    params![nodeid, value],
                )?;
            }
            None => self.remove_node(con, nodeid)?,
        }
        Ok(())
    }

    pub fn remove_node(&self, con: &Connection, nodeid: &str) -> rusqlite::Result<()> {
        con.execute(
            &format!("DELETE FROM \"{}\" WHERE nodeid = ?1", self.table_name()),
            params![nodeid],
        )?;
        Ok(())
    }

    pub fn get(&self, con: &Connection, nodeid: &str) -> rusqlite::Result<Option<AttrValue>> {
        let value: Option<SqlValue> = con
            .query_row(
                &format!("SELECT value FROM \"{}\" WHERE nodeid = ?1", self.table_name()),
                params![nodeid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(|v| from_sql(self.datatype, v)))
    }
}

pub(crate) fn table_exists(con: &Connection, name: &str) -> rusqlite::Result<bool> {
    con.query_row(
        "SELECT 1 FROM sqlite_master WHERE name = ?1",
        params![name],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
}

fn to_sql(value: &AttrValue) -> Option<SqlValue> {
    match value {
        AttrValue::Null => None,
        AttrValue::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        AttrValue::Integer(i) => Some(SqlValue::Integer(*i)),
        AttrValue::Real(f) => Some(SqlValue::Real(*f)),
        AttrValue::String(s) => Some(SqlValue::Text(s.clone())),
        AttrValue::Date(d) => Some(SqlValue::Text(d.to_rfc3339())),
        AttrValue::Data(bytes) => Some(SqlValue::Blob(bytes.clone())),
        AttrValue::Array(_) | AttrValue::Dict(_) => Some(SqlValue::Text(value.to_json().to_string())),
    }
}

fn from_sql(datatype: AttrType, value: SqlValue) -> AttrValue {
    match (datatype, value) {
        (_, SqlValue::Null) => AttrValue::Null,
        (AttrType::Bool, SqlValue::Integer(i)) => AttrValue::Bool(i != 0),
        (_, SqlValue::Integer(i)) => AttrValue::Integer(i),
        (_, SqlValue::Real(f)) => AttrValue::Real(f),
        (_, SqlValue::Text(s)) => AttrValue::String(s),
        (_, SqlValue::Blob(b)) => AttrValue::Data(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_table_roundtrip() {
        let con = Connection::open_in_memory().unwrap();
        let icon = AttrIndex::new("icon", AttrType::String, false);
        assert!(icon.init(&con).unwrap());
        assert!(!icon.init(&con).unwrap());

        let attr = NodeAttr::new().with("icon", "note.png");
        icon.add_node(&con, "n1", &attr).unwrap();
        assert_eq!(icon.get(&con, "n1").unwrap(), Some(AttrValue::from("note.png")));

        icon.add_node(&con, "n1", &NodeAttr::new()).unwrap();
        assert_eq!(icon.get(&con, "n1").unwrap(), None);
    }

    #[test]
    fn test_bool_values() {
        let con = Connection::open_in_memory().unwrap();
        let expanded = AttrIndex::new("expanded", AttrType::Bool, true);
        expanded.init(&con).unwrap();
        expanded
            .add_node(&con, "n1", &NodeAttr::new().with("expanded", true))
            .unwrap();
        assert_eq!(expanded.get(&con, "n1").unwrap(), Some(AttrValue::Bool(true)));
        expanded.remove_node(&con, "n1").unwrap();
        assert_eq!(expanded.get(&con, "n1").unwrap(), None);
    }
}
