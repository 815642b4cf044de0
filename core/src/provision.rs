use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::errors::{LoadError, Result};
use crate::schema::ColumnDef;
use crate::sink::Session;
use crate::table::TableIdentifier;

/// How the destination table is prepared before rows are copied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Create the table; fail if it exists.
    Create,
    /// Drop any existing table and create it afresh.
    Replace,
    /// Keep an existing table's schema but remove its rows.
    Truncate,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteMode::Create => "create",
            WriteMode::Replace => "replace",
            WriteMode::Truncate => "truncate",
        })
    }
}

impl WriteMode {
    /// DDL statements for this mode, in execution order.
    pub fn statements(self, table: &TableIdentifier, columns: &[ColumnDef]) -> Vec<String> {
        match self {
            WriteMode::Create => vec![create_table(table, columns, false)],
            WriteMode::Replace => vec![drop_table(table), create_table(table, columns, false)],
            WriteMode::Truncate => vec![create_table(table, columns, true), truncate_table(table)],
        }
    }
}

pub fn create_table(table: &TableIdentifier, columns: &[ColumnDef], if_not_exists: bool) -> String {
    let columns = columns
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if if_not_exists {
        format!("CREATE TABLE IF NOT EXISTS {table} ({columns})")
    } else {
        format!("CREATE TABLE {table} ({columns})")
    }
}

pub fn drop_table(table: &TableIdentifier) -> String {
    format!("DROP TABLE IF EXISTS {table}")
}

pub fn truncate_table(table: &TableIdentifier) -> String {
    format!("TRUNCATE {table}")
}

/// Runs the DDL for `mode` against `session`.
///
/// A duplicate-table error under `Create` becomes `TableAlreadyExists`; any
/// other failure is a `CopyProtocol` error.
pub async fn provision<S: Session>(
    session: &mut S,
    table: &TableIdentifier,
    columns: &[ColumnDef],
    mode: WriteMode,
) -> Result<()> {
    for statement in mode.statements(table, columns) {
        debug!(statement = %statement, "executing statement");
        session.execute(&statement).await.map_err(|err| {
            if mode == WriteMode::Create && err.is_duplicate_table() {
                LoadError::TableAlreadyExists {
                    table: table.to_string(),
                    source: err,
                }
            } else {
                LoadError::copy_protocol(format!("failed to execute `{statement}`"), err)
            }
        })?;
        debug!(statement = %statement, "statement executed");
    }
    Ok(())
}
