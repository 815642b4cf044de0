use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{LoadError, Result};

/// PostgreSQL truncates identifiers beyond `NAMEDATALEN - 1` bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// An abstract destination, e.g. `/public/users`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub struct DestinationPath {
    segments: Vec<String>,
}

impl DestinationPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits on `/`. One leading and one trailing separator are ignored, so
    /// `/` is the root path and `a//b` keeps its empty middle segment.
    pub fn parse(path: &str) -> Self {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Self { segments: vec![] };
        }
        Self::new(trimmed.split('/'))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl From<String> for DestinationPath {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

impl From<DestinationPath> for String {
    fn from(path: DestinationPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for DestinationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

/// A raw SQL identifier, quoted only when rendered.
///
/// Quoting is not idempotent: a name that already carries double quotes is
/// treated as a name containing quote characters and escaped again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() || raw.contains('\0') || raw.len() > MAX_IDENTIFIER_LEN {
            return None;
        }
        Some(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&quote(&self.0))
    }
}

/// Wraps `raw` in double quotes, doubling any embedded quote.
pub fn quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\"\""))
}

/// A table reference that can be interpolated into SQL as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentifier {
    schema: Option<Ident>,
    table: Ident,
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table),
            None => write!(f, "{}", self.table),
        }
    }
}

/// Resolves a destination into a table reference.
///
/// `[table]` is unqualified, `[schema, table]` is qualified; anything else,
/// or any segment that is not a usable identifier, is `NotATable`.
pub fn resolve(path: &DestinationPath) -> Result<TableIdentifier> {
    let not_a_table = || LoadError::NotATable {
        path: path.segments().to_vec(),
    };
    let idents = path
        .segments()
        .iter()
        .map(|segment| Ident::new(segment.as_str()))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(not_a_table)?;

    match <[Ident; 1]>::try_from(idents) {
        Ok([table]) => Ok(TableIdentifier { schema: None, table }),
        Err(idents) => match <[Ident; 2]>::try_from(idents) {
            Ok([schema, table]) => Ok(TableIdentifier {
                schema: Some(schema),
                table,
            }),
            Err(_) => Err(not_a_table()),
        },
    }
}
