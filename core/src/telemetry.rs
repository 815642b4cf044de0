use std::fmt;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::errors::LoadError;
use crate::loader::LoadSummary;
use crate::provision::WriteMode;
use crate::table::TableIdentifier;

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pgsink_core=info,runner_container=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Where a load is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    ResolvingTable,
    ValidatingColumns,
    Provisioning,
    Copying,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadState::Idle => "idle",
            LoadState::ResolvingTable => "resolving_table",
            LoadState::ValidatingColumns => "validating_columns",
            LoadState::Provisioning => "provisioning",
            LoadState::Copying => "copying",
            LoadState::Finalizing => "finalizing",
            LoadState::Done => "done",
            LoadState::Failed => "failed",
        })
    }
}

/// Load-level events. Chunk and statement events are logged where they
/// happen, in `copy` and `provision`.
pub enum LoadEvent<'a> {
    Started {
        table: &'a TableIdentifier,
        mode: WriteMode,
    },
    /// Rejected before any statement was issued.
    Rejected { error: &'a LoadError },
    /// Failed after the transaction started doing work.
    Failed {
        table: &'a TableIdentifier,
        state: LoadState,
        error: &'a LoadError,
    },
    Completed { summary: &'a LoadSummary },
}

impl LoadEvent<'_> {
    pub fn emit(&self) {
        match self {
            LoadEvent::Started { table, mode } => {
                info!(table = %table, mode = %mode, "load started");
            }
            LoadEvent::Rejected { error } => {
                warn!(error = %error, "load rejected");
            }
            LoadEvent::Failed {
                table,
                state,
                error,
            } => {
                error!(
                    table = %table,
                    state = %state,
                    error = %error,
                    cause = %error.cause(),
                    "load failed"
                );
            }
            LoadEvent::Completed { summary } => {
                info!(
                    table = %summary.table,
                    bytes = summary.bytes_written,
                    rows = summary.rows_copied,
                    elapsed_ms = summary.elapsed_millis,
                    "load completed"
                );
            }
        }
    }
}
