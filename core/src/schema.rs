use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{LoadError, Result};
use crate::table::Ident;

/// Logical column types understood by the upstream row model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Null,
    Boolean,
    LocalTime,
    OffsetTime,
    LocalDate,
    OffsetDate,
    LocalDateTime,
    OffsetDateTime,
    Interval,
    Number,
    String,
}

impl ScalarType {
    pub const ALL: [ScalarType; 11] = [
        ScalarType::Null,
        ScalarType::Boolean,
        ScalarType::LocalTime,
        ScalarType::OffsetTime,
        ScalarType::LocalDate,
        ScalarType::OffsetDate,
        ScalarType::LocalDateTime,
        ScalarType::OffsetDateTime,
        ScalarType::Interval,
        ScalarType::Number,
        ScalarType::String,
    ];

    /// Column type used in `CREATE TABLE`, or `None` when the type has no
    /// PostgreSQL counterpart.
    pub fn ddl(self) -> Option<&'static str> {
        match self {
            ScalarType::Null => Some("smallint"),
            ScalarType::Boolean => Some("boolean"),
            ScalarType::LocalTime => Some("time"),
            ScalarType::OffsetTime => Some("time with time zone"),
            ScalarType::LocalDate => Some("date"),
            ScalarType::OffsetDate => None,
            ScalarType::LocalDateTime => Some("timestamp"),
            ScalarType::OffsetDateTime => Some("timestamp with time zone"),
            ScalarType::Interval => Some("interval"),
            ScalarType::Number => Some("numeric"),
            ScalarType::String => Some("text"),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ScalarType::Null => "null",
            ScalarType::Boolean => "boolean",
            ScalarType::LocalTime => "local_time",
            ScalarType::OffsetTime => "offset_time",
            ScalarType::LocalDate => "local_date",
            ScalarType::OffsetDate => "offset_date",
            ScalarType::LocalDateTime => "local_date_time",
            ScalarType::OffsetDateTime => "offset_date_time",
            ScalarType::Interval => "interval",
            ScalarType::Number => "number",
            ScalarType::String => "string",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub scalar: ScalarType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar,
        }
    }
}

/// A column with a usable identifier and a DDL mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    name: Ident,
    ddl: &'static str,
}

impl ColumnDef {
    pub fn name(&self) -> &Ident {
        &self.name
    }

    pub fn ddl(&self) -> &'static str {
        self.ddl
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.ddl)
    }
}

/// Why a column spec was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnIssue {
    /// Empty, contains NUL, or longer than PostgreSQL keeps.
    InvalidName(ColumnSpec),
    UnsupportedType(ColumnSpec),
}

/// Either a complete result or every error found producing it.
///
/// Unlike `Result`, combining two invalid values keeps both error lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated<T, E> {
    Valid(T),
    Invalid(Vec<E>),
}

impl<T, E> Validated<T, E> {
    pub fn invalid(error: E) -> Self {
        Validated::Invalid(vec![error])
    }

    /// Associative merge: errors from both sides are kept in order.
    pub fn combine<U, V>(
        self,
        other: Validated<U, E>,
        f: impl FnOnce(T, U) -> V,
    ) -> Validated<V, E> {
        match (self, other) {
            (Validated::Valid(a), Validated::Valid(b)) => Validated::Valid(f(a, b)),
            (Validated::Valid(_), Validated::Invalid(errors)) => Validated::Invalid(errors),
            (Validated::Invalid(errors), Validated::Valid(_)) => Validated::Invalid(errors),
            (Validated::Invalid(mut left), Validated::Invalid(right)) => {
                left.extend(right);
                Validated::Invalid(left)
            }
        }
    }

    pub fn into_result(self) -> std::result::Result<T, Vec<E>> {
        match self {
            Validated::Valid(value) => Ok(value),
            Validated::Invalid(errors) => Err(errors),
        }
    }
}

impl<T, E> FromIterator<Validated<T, E>> for Validated<Vec<T>, E> {
    fn from_iter<I: IntoIterator<Item = Validated<T, E>>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Validated::Valid(Vec::new()), |acc, item| {
                acc.combine(item, |mut values, value| {
                    values.push(value);
                    values
                })
            })
    }
}

/// Checks the name and the type of one column; both problems are kept.
pub fn map_column(column: &ColumnSpec) -> Validated<ColumnDef, ColumnIssue> {
    let name = match Ident::new(column.name.as_str()) {
        Some(name) => Validated::Valid(name),
        None => Validated::invalid(ColumnIssue::InvalidName(column.clone())),
    };
    let ddl = match column.scalar.ddl() {
        Some(ddl) => Validated::Valid(ddl),
        None => Validated::invalid(ColumnIssue::UnsupportedType(column.clone())),
    };
    name.combine(ddl, |name, ddl| ColumnDef { name, ddl })
}

/// Maps every column to its DDL definition, reporting all offending
/// columns at once.
///
/// Unsupported types take precedence over invalid names when both occur.
pub fn map_columns(columns: &[ColumnSpec]) -> Result<Vec<ColumnDef>> {
    if columns.is_empty() {
        return Err(LoadError::EmptySchema);
    }
    columns
        .iter()
        .map(map_column)
        .collect::<Validated<Vec<_>, _>>()
        .into_result()
        .map_err(issues_to_error)
}

fn issues_to_error(issues: Vec<ColumnIssue>) -> LoadError {
    let mut bad_names = Vec::new();
    let mut unsupported = Vec::new();
    for issue in issues {
        match issue {
            ColumnIssue::InvalidName(column) => bad_names.push(column),
            ColumnIssue::UnsupportedType(column) => unsupported.push(column),
        }
    }
    if unsupported.is_empty() {
        LoadError::InvalidColumnNames(bad_names)
    } else {
        LoadError::UnsupportedColumnTypes(unsupported)
    }
}
