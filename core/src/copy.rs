use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

use crate::errors::{DbError, LoadError, Result};
use crate::schema::ColumnDef;
use crate::sink::{CopyIn, Session};
use crate::table::TableIdentifier;

pub fn copy_statement(table: &TableIdentifier, columns: &[ColumnDef]) -> String {
    let names = columns
        .iter()
        .map(|column| column.name().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("COPY {table} ({names}) FROM STDIN WITH (FORMAT csv, HEADER FALSE, ENCODING 'UTF8')")
}

/// Running total of bytes accepted by the copy session.
///
/// Written by the streamer only; clones share the same total.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `bytes` and returns the new total.
    pub fn add(&self, bytes: u64) -> u64 {
        self.0.fetch_add(bytes, Ordering::Relaxed) + bytes
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Owns an open copy until it is finished.
///
/// If the guard is dropped first (error, or the enclosing future was
/// dropped) and the copy is still active, the copy is cancelled.
pub struct CopyGuard<C: CopyIn> {
    copy: Option<C>,
    table: String,
}

impl<C: CopyIn> CopyGuard<C> {
    pub fn new(copy: C, table: &TableIdentifier) -> Self {
        Self {
            copy: Some(copy),
            table: table.to_string(),
        }
    }

    pub async fn send(&mut self, chunk: Bytes) -> std::result::Result<(), DbError> {
        let Some(copy) = self.copy.as_mut() else {
            return Err(DbError::Statement {
                message: "copy session already closed".to_string(),
                code: None,
                source: "copy guard released".into(),
            });
        };
        copy.send(chunk).await
    }

    pub async fn finish(mut self) -> std::result::Result<u64, DbError> {
        match self.copy.take() {
            Some(copy) => copy.finish().await,
            None => Ok(0),
        }
    }
}

impl<C: CopyIn> Drop for CopyGuard<C> {
    fn drop(&mut self) {
        if let Some(copy) = self.copy.take()
            && copy.is_active()
        {
            warn!(table = %self.table, "cancelling active copy");
            copy.cancel();
        }
    }
}

/// Streams pre-encoded CSV chunks into a table.
pub struct CopyStreamer<'a> {
    table: &'a TableIdentifier,
    columns: &'a [ColumnDef],
    counter: ByteCounter,
}

impl<'a> CopyStreamer<'a> {
    pub fn new(
        table: &'a TableIdentifier,
        columns: &'a [ColumnDef],
        counter: ByteCounter,
    ) -> Self {
        Self {
            table,
            columns,
            counter,
        }
    }

    pub fn statement(&self) -> String {
        copy_statement(self.table, self.columns)
    }

    /// Copies every chunk in order and returns the server's row count.
    ///
    /// The next chunk is only pulled after the previous one was flushed.
    pub async fn run<S, I>(&self, session: &mut S, chunks: I) -> Result<u64>
    where
        S: Session,
        I: Stream<Item = io::Result<Bytes>>,
    {
        let statement = self.statement();
        debug!(statement = %statement, "copy started");
        let copy = session
            .copy_in(&statement)
            .await
            .map_err(|err| LoadError::copy_protocol("failed to start copy", err))?;
        let mut guard = CopyGuard::new(copy, self.table);

        futures::pin_mut!(chunks);
        while let Some(chunk) = chunks.next().await {
            let chunk =
                chunk.map_err(|err| LoadError::copy_protocol("failed to read input chunk", err))?;
            let len = chunk.len() as u64;
            guard
                .send(chunk)
                .await
                .map_err(|err| LoadError::copy_protocol("failed to write chunk", err))?;
            let total = self.counter.add(len);
            trace!(chunk_bytes = len, total_bytes = total, "chunk written");
        }

        guard
            .finish()
            .await
            .map_err(|err| LoadError::copy_protocol("failed to finish copy", err))
    }
}
