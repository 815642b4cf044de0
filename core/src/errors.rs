use std::io;
use thiserror::Error;
use tokio_postgres::error::SqlState;

use crate::schema::ColumnSpec;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Destination {path:?} does not denote a table")]
    NotATable { path: Vec<String> },

    #[error("Unsupported column types: {}", describe_columns(.0))]
    UnsupportedColumnTypes(Vec<ColumnSpec>),

    #[error("Invalid column names: {}", describe_columns(.0))]
    InvalidColumnNames(Vec<ColumnSpec>),

    #[error("At least one column must be supplied")]
    EmptySchema,

    #[error("Table {table} already exists")]
    TableAlreadyExists {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("Copy protocol error: {context}")]
    CopyProtocol {
        context: String,
        #[source]
        source: BoxError,
    },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Relation already exists: {message}")]
    DuplicateTable {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("Statement failed: {message}")]
    Statement {
        message: String,
        code: Option<SqlState>,
        #[source]
        source: BoxError,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Failed to load configuration from {origin}: {error}")]
    LoadFailed {
        origin: String,
        #[source]
        error: BoxError,
    },
}

pub type Result<T> = std::result::Result<T, LoadError>;

impl From<tokio_postgres::Error> for DbError {
    fn from(err: tokio_postgres::Error) -> Self {
        let message = err
            .as_db_error()
            .map(|db| db.message().to_string())
            .unwrap_or_else(|| err.to_string());
        if err.code() == Some(&SqlState::DUPLICATE_TABLE) {
            DbError::DuplicateTable {
                message,
                source: Box::new(err),
            }
        } else {
            DbError::Statement {
                message,
                code: err.code().cloned(),
                source: Box::new(err),
            }
        }
    }
}

impl DbError {
    pub fn is_duplicate_table(&self) -> bool {
        matches!(self, DbError::DuplicateTable { .. })
    }

    /// Whether the server (or the lack of one) suggests the same statement
    /// could succeed later.
    ///
    /// Connection exceptions (08), transaction rollbacks such as
    /// serialization failures (40), insufficient resources (53) and operator
    /// intervention (57) are transient, as are client or transport errors
    /// that carry no SQLSTATE. Any other class, notably data (22), integrity
    /// (23) and syntax/access (42) errors, repeats on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::DuplicateTable { .. } => false,
            DbError::Statement { code: None, .. } => true,
            DbError::Statement { code: Some(code), .. } => {
                matches!(code.code().get(..2), Some("08" | "40" | "53" | "57"))
            }
        }
    }
}

fn is_connection_error(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
    )
}

impl LoadError {
    pub fn copy_protocol(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        LoadError::CopyProtocol {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Whether a caller may reasonably run the same load again.
    ///
    /// Only `CopyProtocol` errors caused by a transient database condition or
    /// a dropped input connection qualify. The loader itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoadError::NotATable { .. } => false,
            LoadError::UnsupportedColumnTypes(_) => false,
            LoadError::InvalidColumnNames(_) => false,
            LoadError::EmptySchema => false,
            LoadError::TableAlreadyExists { .. } => false,
            LoadError::CopyProtocol { source, .. } => {
                if let Some(err) = source.downcast_ref::<DbError>() {
                    err.is_transient()
                } else if let Some(err) = source.downcast_ref::<io::Error>() {
                    is_connection_error(err.kind())
                } else {
                    false
                }
            }
        }
    }

    /// Renders the full `source()` chain, innermost last.
    pub fn cause(&self) -> String {
        let mut causes = Vec::new();
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            causes.push(err.to_string());
            current = std::error::Error::source(err);
        }
        causes.join(": ")
    }
}

fn describe_columns(columns: &[ColumnSpec]) -> String {
    columns
        .iter()
        .map(|column| format!("{} ({})", column.name, column.scalar))
        .collect::<Vec<_>>()
        .join(", ")
}
