//! A small XML reader, built with `nom`.
//!
//! Covers what the notebook files use: a prolog, elements with attributes,
//! character data with the predefined and numeric entities, CDATA sections,
//! comments and processing instructions. Namespaces and DTD internals are
//! not interpreted.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_until, take_while, take_while1};
use nom::character::complete::{char as nomchar, multispace0, multispace1};
use nom::combinator::{all_consuming, map, map_res, value};
use nom::multi::many0;
use nom::sequence::{delimited, preceded, terminated, tuple};
use nom::IResult;

use crate::error::{NotebookError, Result};

type PResult<'a, T> = IResult<&'a str, T>;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements, skipping character data.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element called `name`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Concatenated character data of the direct children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let XmlNode::Text(t) = child {
                out.push_str(t);
            }
        }
        out
    }
}

/// Parses a whole document and returns its root element.
pub fn parse_document(input: &str) -> Result<Element> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    match all_consuming(delimited(misc, element, misc))(input) {
        Ok((_, root)) => Ok(root),
        Err(nom::Err::Incomplete(_)) => Err(NotebookError::Parse("premature end of XML".into())),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            let near: String = e.input.chars().take(30).collect();
            Err(NotebookError::Parse(format!(
                "malformed XML ({:?}) near {:?}",
                e.code, near
            )))
        }
    }
}

/// Escapes character data for element content and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Resolves entity references in character data.
pub fn unescape(text: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];
        let end = rest
            .find(';')
            .ok_or_else(|| format!("unterminated entity in {:?}", text))?;
        let entity = &rest[..end];
        let c = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| format!("unknown entity &{};", entity))?
            }
        };
        out.push(c);
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn name(i: &str) -> PResult<&str> {
    take_while1(|c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))(i)
}

fn comment(i: &str) -> PResult<()> {
    value((), tuple((tag("<!--"), take_until("-->"), tag("-->"))))(i)
}

fn processing_instruction(i: &str) -> PResult<()> {
    value((), tuple((tag("<?"), take_until("?>"), tag("?>"))))(i)
}

fn doctype(i: &str) -> PResult<()> {
    value((), tuple((tag("<!DOCTYPE"), take_until(">"), tag(">"))))(i)
}

/// Whitespace, comments, processing instructions and doctype outside the root.
fn misc(i: &str) -> PResult<()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            comment,
            processing_instruction,
            doctype,
        ))),
    )(i)
}

fn quoted(i: &str) -> PResult<&str> {
    alt((
        delimited(nomchar('"'), take_while(|c: char| c != '"'), nomchar('"')),
        delimited(nomchar('\''), take_while(|c: char| c != '\''), nomchar('\'')),
    ))(i)
}

fn attribute(i: &str) -> PResult<(String, String)> {
    map_res(
        tuple((
            preceded(multispace1, name),
            delimited(multispace0, nomchar('='), multispace0),
            quoted,
        )),
        |(key, _, raw)| unescape(raw).map(|v| (key.to_string(), v)),
    )(i)
}

fn text(i: &str) -> PResult<String> {
    map_res(take_while1(|c: char| c != '<'), unescape)(i)
}

fn cdata(i: &str) -> PResult<String> {
    map(
        delimited(tag("<![CDATA["), take_until("]]>"), tag("]]>")),
        str::to_string,
    )(i)
}

fn content(i: &str) -> PResult<Option<XmlNode>> {
    alt((
        map(element, |e| Some(XmlNode::Element(e))),
        map(cdata, |t| Some(XmlNode::Text(t))),
        value(None, comment),
        value(None, processing_instruction),
        map(text, |t| Some(XmlNode::Text(t))),
    ))(i)
}

fn element(i: &str) -> PResult<Element> {
    let (i, open) = preceded(nomchar('<'), name)(i)?;
    let (i, attrs) = many0(attribute)(i)?;
    let (i, _) = multispace0(i)?;

    if let Ok((i, _)) = tag::<_, _, nom::error::Error<&str>>("/>")(i) {
        return Ok((
            i,
            Element {
                name: open.to_string(),
                attrs,
                children: Vec::new(),
            },
        ));
    }

    let (i, _) = nomchar('>')(i)?;
    let (i, children) = many0(content)(i)?;
    let (rest, close) = delimited(tag("</"), name, terminated(multispace0, nomchar('>')))(i)?;
    if close != open {
        return Err(nom::Err::Failure(nom::error::Error::new(
            i,
            nom::error::ErrorKind::Tag,
        )));
    }

    Ok((
        rest,
        Element {
            name: open.to_string(),
            attrs,
            children: children.into_iter().flatten().collect(),
        },
    ))
}
