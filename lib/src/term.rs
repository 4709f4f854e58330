//! Terms of the metadata graph: plain resources, slice resources and literals.
//!
//! A slice resource names a byte range of another resource using the
//! textual form `base[offset:length]`. Slices are plain resources as far as
//! the graph is concerned; [`SliceResource`] only adds parsing and ordering.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::consts::{XSD_INT, XSD_LONG};
use crate::errors::Aff4Error;

lazy_static! {
    static ref SLICE: Regex = Regex::new(r"^(?P<base>.+)\[(?P<offset>\d+):(?P<length>\d+)\]$")
        .expect("slice pattern is valid");
}

/// A literal value with an optional datatype URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

/// Object position of a quad.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Object {
    Resource(String),
    Literal(Literal),
}

impl Object {
    pub fn resource(uri: impl Into<String>) -> Self {
        Object::Resource(uri.into())
    }

    /// Untyped literal.
    pub fn literal(value: impl Into<String>) -> Self {
        Object::Literal(Literal {
            value: value.into(),
            datatype: None,
        })
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Object::Literal(Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
        })
    }

    pub fn long(value: u64) -> Self {
        Object::typed(value.to_string(), XSD_LONG)
    }

    pub fn int(value: u32) -> Self {
        Object::typed(value.to_string(), XSD_INT)
    }

    pub fn as_resource(&self) -> Option<&str> {
        match self {
            Object::Resource(uri) => Some(uri),
            Object::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Object::Resource(_) => None,
            Object::Literal(lit) => Some(lit),
        }
    }

    /// Numeric value of a literal, regardless of its declared datatype.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_literal().and_then(|l| l.value.trim().parse().ok())
    }
}

/// Write `uri` as `<uri>`, escaping `\`, `>`, CR and LF so that no two
/// distinct resources render alike.
pub(crate) fn write_resource(f: &mut impl fmt::Write, uri: &str) -> fmt::Result {
    f.write_char('<')?;
    for c in uri.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '>' => f.write_str("\\>")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('>')
}

impl fmt::Display for Object {
    /// Resources render as `<uri>`; literals are quoted with `\`, `"`, CR and
    /// LF escaped, followed by `^^<datatype>` when typed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Resource(uri) => write_resource(f, uri),
            Object::Literal(lit) => {
                f.write_str("\"")?;
                for c in lit.value.chars() {
                    match c {
                        '\\' => f.write_str("\\\\")?,
                        '"' => f.write_str("\\\"")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")?;
                if let Some(dt) = &lit.datatype {
                    f.write_str("^^")?;
                    write_resource(f, dt)?;
                }
                Ok(())
            }
        }
    }
}

impl From<SliceResource> for Object {
    fn from(slice: SliceResource) -> Self {
        Object::Resource(slice.to_string())
    }
}

impl From<Literal> for Object {
    fn from(lit: Literal) -> Self {
        Object::Literal(lit)
    }
}

/// A byte range `[offset, offset + length)` of resource `base`.
///
/// Equality, hashing and ordering consider only `(base, offset)`: two slices
/// starting at the same place of the same resource name the same point.
#[derive(Debug, Clone)]
pub struct SliceResource {
    pub base: String,
    pub offset: u64,
    pub length: u64,
}

impl SliceResource {
    pub fn new(base: impl Into<String>, offset: u64, length: u64) -> Self {
        Self {
            base: base.into(),
            offset,
            length,
        }
    }

    /// Parse `base[offset:length]`.
    pub fn parse(text: &str) -> Result<Self, Aff4Error> {
        let caps = SLICE
            .captures(text)
            .ok_or_else(|| Aff4Error::InvalidResource(text.to_string()))?;
        let number = |name: &str| {
            caps[name]
                .parse::<u64>()
                .map_err(|_| Aff4Error::InvalidResource(text.to_string()))
        };
        Ok(Self {
            base: caps["base"].to_string(),
            offset: number("offset")?,
            length: number("length")?,
        })
    }

    /// One past the last byte covered.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

impl fmt::Display for SliceResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}:{}]", self.base, self.offset, self.length)
    }
}

impl FromStr for SliceResource {
    type Err = Aff4Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SliceResource::parse(s)
    }
}

impl PartialEq for SliceResource {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base && self.offset == other.offset
    }
}

impl Eq for SliceResource {}

impl Hash for SliceResource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.base.hash(state);
        self.offset.hash(state);
    }
}

impl PartialOrd for SliceResource {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SliceResource {
    fn cmp(&self, other: &Self) -> Ordering {
        self.base
            .cmp(&other.base)
            .then(self.offset.cmp(&other.offset))
    }
}
