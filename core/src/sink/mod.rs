pub mod postgres;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::DbError;

/// An open unit of work against the destination database.
///
/// Statements run inside the session become visible only after
/// [`commit`](Session::commit). Dropping an uncommitted session rolls it back.
#[async_trait]
pub trait Session: Send {
    type Copy: CopyIn;

    /// Runs a single DDL statement.
    async fn execute(&mut self, statement: &str) -> Result<(), DbError>;

    /// Starts a `COPY ... FROM STDIN` session.
    async fn copy_in(&mut self, statement: &str) -> Result<Self::Copy, DbError>;

    async fn commit(self) -> Result<(), DbError>
    where
        Self: Sized;
}

/// The client side of an open `COPY ... FROM STDIN`.
#[async_trait]
pub trait CopyIn: Send {
    /// Writes one chunk, resolving once the bytes have been flushed.
    async fn send(&mut self, chunk: Bytes) -> Result<(), DbError>;

    /// Signals end-of-copy and returns the number of rows the server loaded.
    async fn finish(self) -> Result<u64, DbError>
    where
        Self: Sized;

    /// False once the copy has finished or failed on its own.
    fn is_active(&self) -> bool;

    /// Aborts an active copy so the server discards what it received.
    fn cancel(self)
    where
        Self: Sized;
}
