//! Property-list encoding of attribute values.
//!
//! This is Apple's XML property list vocabulary extended with a `<null/>`
//! element. Node metadata and notebook preferences both embed a `<dict>` in
//! this encoding.

pub mod xml;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;

use crate::attr::AttrValue;
use crate::error::{NotebookError, Result};
pub use xml::{escape, parse_document, Element};

/// Serializes `value`. An `indent` of 0 writes everything on one line.
pub fn dumps(value: &AttrValue, indent: usize) -> String {
    let mut out = String::new();
    dump(value, &mut out, indent, 0, false);
    out
}

/// Appends the encoding of `value` to `out`.
pub fn dump(value: &AttrValue, out: &mut String, indent: usize, depth: usize, suppress: bool) {
    if indent > 0 && !suppress {
        pad(out, depth);
    }

    match value {
        AttrValue::Dict(map) => {
            out.push_str("<dict>");
            if indent > 0 {
                out.push('\n');
            }
            for (key, val) in map {
                pad(out, if indent > 0 { depth + indent } else { 0 });
                out.push_str("<key>");
                out.push_str(&escape(key));
                out.push_str("</key>");
                dump(val, out, indent, depth + indent, true);
            }
            if indent > 0 {
                pad(out, depth);
            }
            out.push_str("</dict>");
        }
        AttrValue::Array(items) => {
            out.push_str("<array>");
            if indent > 0 {
                out.push('\n');
            }
            for item in items {
                dump(item, out, indent, depth + indent, false);
            }
            if indent > 0 {
                pad(out, depth);
            }
            out.push_str("</array>");
        }
        AttrValue::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s));
            out.push_str("</string>");
        }
        AttrValue::Bool(true) => out.push_str("<true/>"),
        AttrValue::Bool(false) => out.push_str("<false/>"),
        AttrValue::Integer(n) => {
            out.push_str(&format!("<integer>{}</integer>", n));
        }
        AttrValue::Real(f) => {
            out.push_str(&format!("<real>{:?}</real>", f));
        }
        AttrValue::Null => out.push_str("<null/>"),
        AttrValue::Data(bytes) => {
            out.push_str("<data>");
            out.push_str(&BASE64.encode(bytes));
            out.push_str("</data>");
        }
        AttrValue::Date(dt) => {
            out.push_str(&format!("<date>{}</date>", dt.format("%Y-%m-%dT%H:%M:%SZ")));
        }
    }

    if indent > 0 {
        out.push('\n');
    }
}

fn pad(out: &mut String, n: usize) {
    out.extend(std::iter::repeat(' ').take(n));
}

/// Decodes one property-list element.
pub fn load(elem: &Element) -> Result<AttrValue> {
    let value = match elem.name.as_str() {
        "dict" => {
            let mut map = BTreeMap::new();
            let mut items = elem.elements();
            while let Some(key) = items.next() {
                if key.name != "key" {
                    return Err(NotebookError::Parse(format!(
                        "expected <key> in dict, found <{}>",
                        key.name
                    )));
                }
                let val = items.next().ok_or_else(|| {
                    NotebookError::Parse(format!("dict key {:?} has no value", key.text()))
                })?;
                map.insert(key.text(), load(val)?);
            }
            AttrValue::Dict(map)
        }
        "array" => AttrValue::Array(elem.elements().map(load).collect::<Result<Vec<_>>>()?),
        "string" => AttrValue::String(elem.text()),
        "integer" => {
            let text = elem.text();
            AttrValue::Integer(text.trim().parse().map_err(|_| {
                NotebookError::Parse(format!("bad integer {:?}", text))
            })?)
        }
        "real" => {
            let text = elem.text();
            AttrValue::Real(
                text.trim()
                    .parse()
                    .map_err(|_| NotebookError::Parse(format!("bad real {:?}", text)))?,
            )
        }
        "true" => AttrValue::Bool(true),
        "false" => AttrValue::Bool(false),
        "null" => AttrValue::Null,
        "data" => {
            let text: String = elem.text().split_whitespace().collect();
            AttrValue::Data(
                BASE64
                    .decode(text.as_bytes())
                    .map_err(|e| NotebookError::Parse(format!("bad data: {}", e)))?,
            )
        }
        "date" => parse_date(&elem.text())?,
        "plist" => match elem.elements().next() {
            Some(inner) => load(inner)?,
            None => AttrValue::Null,
        },
        other => {
            return Err(NotebookError::Parse(format!(
                "unknown plist type: {:?}",
                other
            )))
        }
    };
    Ok(value)
}

/// Parses a standalone property-list document.
pub fn loads(text: &str) -> Result<AttrValue> {
    load(&parse_document(text)?)
}

/// ISO 8601 `YYYY-MM-DDTHH:MM:SSZ`; trailing units may be omitted.
fn parse_date(text: &str) -> Result<AttrValue> {
    let bad = || NotebookError::Parse(format!("bad date {:?}", text));
    let nums: Vec<u32> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| bad()))
        .collect::<Result<_>>()?;
    let part = |i: usize, default: u32| nums.get(i).copied().unwrap_or(default);
    let year = nums.first().copied().ok_or_else(bad)? as i32;
    let naive = NaiveDate::from_ymd_opt(year, part(1, 1), part(2, 1))
        .and_then(|d| d.and_hms_opt(part(3, 0), part(4, 0), part(5, 0)))
        .ok_or_else(bad)?;
    Ok(AttrValue::Date(Utc.from_utc_datetime(&naive)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AttrValue {
        let mut map = BTreeMap::new();
        map.insert("version".to_string(), AttrValue::from(vec![
            AttrValue::Integer(1),
            AttrValue::Integer(0),
            AttrValue::Integer(3),
        ]));
        map.insert("kind".to_string(), AttrValue::from("nice & <fancy>"));
        map.insert("measure".to_string(), AttrValue::Real(3.03));
        map.insert("use_feature".to_string(), AttrValue::Bool(true));
        map.insert("nothing".to_string(), AttrValue::Null);
        map.insert("blob".to_string(), AttrValue::Data(vec![0, 1, 2, 255]));
        AttrValue::Dict(map)
    }

    #[test]
    fn test_roundtrip_compact() {
        let value = sample();
        assert_eq!(loads(&dumps(&value, 0)).unwrap(), value);
    }

    #[test]
    fn test_roundtrip_indented() {
        let value = sample();
        let text = dumps(&value, 4);
        assert!(text.contains("\n    <key>kind</key><string>nice &amp; &lt;fancy&gt;</string>\n"));
        assert_eq!(loads(&text).unwrap(), value);
    }

    #[test]
    fn test_load_mixed() {
        let value = loads("<dict><key>aaa</key><integer>444</integer>\n <key>11</key><true/></dict>").unwrap();
        let AttrValue::Dict(map) = value else {
            panic!("expected dict");
        };
        assert_eq!(map["aaa"], AttrValue::Integer(444));
        assert_eq!(map["11"], AttrValue::Bool(true));
    }

    #[test]
    fn test_empty_string_element() {
        assert_eq!(loads("<string/>").unwrap(), AttrValue::from(""));
        assert_eq!(loads("<string></string>").unwrap(), AttrValue::from(""));
    }

    #[test]
    fn test_unknown_type_fails() {
        assert!(matches!(loads("<blah/>"), Err(NotebookError::Parse(_))));
    }

    #[test]
    fn test_dict_key_without_value_fails() {
        assert!(loads("<dict><key>a</key></dict>").is_err());
    }

    #[test]
    fn test_date() {
        let value = loads("<date>2010-05-03T10:20:30Z</date>").unwrap();
        let AttrValue::Date(dt) = &value else {
            panic!("expected date");
        };
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2010-05-03 10:20:30");
        assert_eq!(loads(&dumps(&value, 0)).unwrap(), value);
    }

    #[test]
    fn test_plist_wrapper() {
        assert_eq!(
            loads("<plist version=\"1.0\"><integer>7</integer></plist>").unwrap(),
            AttrValue::Integer(7)
        );
    }
}
