#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use pgsink_core::errors::DbError;
use pgsink_core::sink::{CopyIn, Session};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use tokio_postgres::error::SqlState;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemTable {
    pub columns: String,
    pub rows: Vec<String>,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, MemTable>,
    statements: Vec<String>,
    journal: Vec<String>,
    cancelled: usize,
    commits: usize,
}

/// A tiny in-memory stand-in for PostgreSQL that understands exactly the
/// statements the loader issues.
#[derive(Clone, Default)]
pub struct MemoryDb {
    state: Arc<Mutex<State>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, columns: &str, rows: &[&str]) -> Self {
        self.state.lock().unwrap().tables.insert(
            name.to_string(),
            MemTable {
                columns: columns.to_string(),
                rows: rows.iter().map(|row| row.to_string()).collect(),
            },
        );
        self
    }

    pub fn begin(&self) -> MemTx {
        let tables = self.state.lock().unwrap().tables.clone();
        MemTx {
            db: self.clone(),
            tables: Arc::new(Mutex::new(tables)),
            fail_on_chunk: None,
        }
    }

    pub fn table(&self, name: &str) -> Option<MemTable> {
        self.state.lock().unwrap().tables.get(name).cloned()
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    /// Ordered record of input pulls and copy writes.
    pub fn journal(&self) -> Vec<String> {
        self.state.lock().unwrap().journal.clone()
    }

    pub fn note(&self, entry: impl Into<String>) {
        self.state.lock().unwrap().journal.push(entry.into());
    }

    pub fn cancelled_copies(&self) -> usize {
        self.state.lock().unwrap().cancelled
    }

    pub fn commits(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    fn log(&self, statement: &str) {
        self.state
            .lock()
            .unwrap()
            .statements
            .push(statement.to_string());
    }
}

fn statement_error(code: SqlState, message: impl Into<String>) -> DbError {
    DbError::Statement {
        message: message.into(),
        source: code.code().to_string().into(),
        code: Some(code),
    }
}

fn malformed(statement: &str) -> DbError {
    statement_error(SqlState::SYNTAX_ERROR, format!("malformed statement: {statement}"))
}

fn undefined_table(name: &str) -> DbError {
    statement_error(SqlState::UNDEFINED_TABLE, format!("relation {name} does not exist"))
}

/// Splits `<name> (<columns>)`.
fn split_create(rest: &str) -> Result<(String, String), DbError> {
    let (name, columns) = rest.split_once(" (").ok_or_else(|| malformed(rest))?;
    let columns = columns.strip_suffix(')').ok_or_else(|| malformed(rest))?;
    Ok((name.to_string(), columns.to_string()))
}

/// A transaction over a private copy of the tables, published on commit.
pub struct MemTx {
    db: MemoryDb,
    tables: Arc<Mutex<BTreeMap<String, MemTable>>>,
    fail_on_chunk: Option<(usize, SqlState)>,
}

impl MemTx {
    /// Makes the copy session fail with `code` when it receives chunk `index`.
    pub fn failing_on_chunk(mut self, index: usize, code: SqlState) -> Self {
        self.fail_on_chunk = Some((index, code));
        self
    }
}

#[async_trait]
impl Session for MemTx {
    type Copy = MemCopy;

    async fn execute(&mut self, statement: &str) -> Result<(), DbError> {
        self.db.log(statement);
        let mut tables = self.tables.lock().unwrap();
        if let Some(rest) = statement.strip_prefix("CREATE TABLE IF NOT EXISTS ") {
            let (name, columns) = split_create(rest)?;
            tables.entry(name).or_insert(MemTable {
                columns,
                rows: vec![],
            });
        } else if let Some(rest) = statement.strip_prefix("CREATE TABLE ") {
            let (name, columns) = split_create(rest)?;
            if tables.contains_key(&name) {
                return Err(DbError::DuplicateTable {
                    message: format!("relation {name} already exists"),
                    source: "42P07".into(),
                });
            }
            tables.insert(
                name,
                MemTable {
                    columns,
                    rows: vec![],
                },
            );
        } else if let Some(name) = statement.strip_prefix("DROP TABLE IF EXISTS ") {
            tables.remove(name);
        } else if let Some(name) = statement.strip_prefix("TRUNCATE ") {
            match tables.get_mut(name) {
                Some(table) => table.rows.clear(),
                None => return Err(undefined_table(name)),
            }
        } else {
            return Err(statement_error(
                SqlState::FEATURE_NOT_SUPPORTED,
                format!("unsupported statement: {statement}"),
            ));
        }
        Ok(())
    }

    async fn copy_in(&mut self, statement: &str) -> Result<MemCopy, DbError> {
        self.db.log(statement);
        let (name, _) = statement
            .strip_prefix("COPY ")
            .and_then(|rest| rest.split_once(" ("))
            .ok_or_else(|| malformed(statement))?;
        if !self.tables.lock().unwrap().contains_key(name) {
            return Err(undefined_table(name));
        }
        Ok(MemCopy {
            db: self.db.clone(),
            tables: self.tables.clone(),
            table: name.to_string(),
            buffer: Vec::new(),
            chunks: 0,
            fail_on_chunk: self.fail_on_chunk.clone(),
            active: true,
        })
    }

    async fn commit(self) -> Result<(), DbError> {
        let tables = self.tables.lock().unwrap().clone();
        let mut state = self.db.state.lock().unwrap();
        state.tables = tables;
        state.commits += 1;
        Ok(())
    }
}

pub struct MemCopy {
    db: MemoryDb,
    tables: Arc<Mutex<BTreeMap<String, MemTable>>>,
    table: String,
    buffer: Vec<u8>,
    chunks: usize,
    fail_on_chunk: Option<(usize, SqlState)>,
    active: bool,
}

#[async_trait]
impl CopyIn for MemCopy {
    async fn send(&mut self, chunk: Bytes) -> Result<(), DbError> {
        if let Some((index, code)) = &self.fail_on_chunk
            && *index == self.chunks
        {
            self.active = false;
            let message = if code.code().starts_with("22") {
                "invalid input syntax for type numeric"
            } else {
                "server closed the connection unexpectedly"
            };
            return Err(statement_error(code.clone(), message));
        }
        self.chunks += 1;
        self.db.note(format!("send {}", chunk.len()));
        self.buffer.extend_from_slice(&chunk);
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn finish(self) -> Result<u64, DbError> {
        let text = String::from_utf8(self.buffer).map_err(|err| {
            statement_error(SqlState::CHARACTER_NOT_IN_REPERTOIRE, err.to_string())
        })?;
        let rows: Vec<String> = text.lines().map(str::to_string).collect();
        let count = rows.len() as u64;
        let mut tables = self.tables.lock().unwrap();
        let table = tables
            .get_mut(&self.table)
            .ok_or_else(|| undefined_table(&self.table))?;
        table.rows.extend(rows);
        Ok(count)
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn cancel(self) {
        self.db.state.lock().unwrap().cancelled += 1;
    }
}

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    pub fn message(&self) -> &str {
        self.field("message").unwrap_or_default()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Layer that records every event it sees.
#[derive(Clone, Default)]
pub struct CapturedEvents(Arc<Mutex<Vec<CapturedEvent>>>);

impl CapturedEvents {
    pub fn all(&self) -> Vec<CapturedEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.all()
            .into_iter()
            .filter(|event| event.message() == message)
            .collect()
    }
}

#[derive(Default)]
struct FieldMap(BTreeMap<String, String>);

impl Visit for FieldMap {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.0
            .insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for CapturedEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = FieldMap::default();
        event.record(&mut fields);
        self.0.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            fields: fields.0,
        });
    }
}
