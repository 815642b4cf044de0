use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Instant;
use tracing::debug;

use crate::copy::{ByteCounter, CopyStreamer};
use crate::errors::{LoadError, Result};
use crate::provision::{WriteMode, provision};
use crate::schema::{ColumnDef, ColumnSpec, map_columns};
use crate::sink::Session;
use crate::table::{DestinationPath, TableIdentifier, resolve};
use crate::telemetry::{LoadEvent, LoadState};

/// Everything needed to run one load, apart from the data itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoadRequest {
    pub destination: DestinationPath,
    pub columns: Vec<ColumnSpec>,
    pub mode: WriteMode,
}

impl LoadRequest {
    pub fn new(destination: DestinationPath, columns: Vec<ColumnSpec>, mode: WriteMode) -> Self {
        Self {
            destination,
            columns,
            mode,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub table: String,
    pub mode: WriteMode,
    pub bytes_written: u64,
    pub rows_copied: u64,
    pub elapsed_millis: u64,
    pub started_at: DateTime<Utc>,
}

struct Tracker {
    state: LoadState,
}

impl Tracker {
    fn advance(&mut self, next: LoadState) {
        debug!(from = %self.state, to = %next, "load state changed");
        self.state = next;
    }

    fn reject(&mut self, error: &LoadError) {
        self.advance(LoadState::Failed);
        LoadEvent::Rejected { error }.emit();
    }
}

/// Loads `chunks` into the table named by `request`, inside `session`.
///
/// Resolution and column validation happen before any statement is issued.
/// Provisioning, the copy, and the commit then run in `session`; on failure
/// the session is dropped uncommitted, which rolls everything back.
pub async fn load<S, I>(session: S, request: &LoadRequest, chunks: I) -> Result<LoadSummary>
where
    S: Session,
    I: Stream<Item = io::Result<Bytes>>,
{
    let mut tracker = Tracker {
        state: LoadState::Idle,
    };

    tracker.advance(LoadState::ResolvingTable);
    let table = resolve(&request.destination)
        .inspect_err(|error| tracker.reject(error))?;
    LoadEvent::Started {
        table: &table,
        mode: request.mode,
    }
    .emit();

    tracker.advance(LoadState::ValidatingColumns);
    let columns = map_columns(&request.columns)
        .inspect_err(|error| tracker.reject(error))?;

    let started_at = Utc::now();
    let clock = Instant::now();
    let counter = ByteCounter::new();

    let result = execute(
        session,
        &table,
        &columns,
        request.mode,
        chunks,
        &counter,
        &mut tracker,
    )
    .await;

    match result {
        Ok(rows_copied) => {
            tracker.advance(LoadState::Done);
            let summary = LoadSummary {
                table: table.to_string(),
                mode: request.mode,
                bytes_written: counter.get(),
                rows_copied,
                elapsed_millis: u64::try_from(clock.elapsed().as_millis())
                    .unwrap_or(u64::MAX),
                started_at,
            };
            LoadEvent::Completed { summary: &summary }.emit();
            Ok(summary)
        }
        Err(error) => {
            let state = tracker.state;
            tracker.advance(LoadState::Failed);
            LoadEvent::Failed {
                table: &table,
                state,
                error: &error,
            }
            .emit();
            Err(error)
        }
    }
}

async fn execute<S, I>(
    mut session: S,
    table: &TableIdentifier,
    columns: &[ColumnDef],
    mode: WriteMode,
    chunks: I,
    counter: &ByteCounter,
    tracker: &mut Tracker,
) -> Result<u64>
where
    S: Session,
    I: Stream<Item = io::Result<Bytes>>,
{
    tracker.advance(LoadState::Provisioning);
    provision(&mut session, table, columns, mode).await?;

    tracker.advance(LoadState::Copying);
    let rows = CopyStreamer::new(table, columns, counter.clone())
        .run(&mut session, chunks)
        .await?;

    tracker.advance(LoadState::Finalizing);
    session
        .commit()
        .await
        .map_err(|err| LoadError::copy_protocol("failed to commit load", err))?;
    Ok(rows)
}
