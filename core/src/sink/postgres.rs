use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, Stream};
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tokio_postgres::{Client, CopyInSink, NoTls, Transaction};
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::errors::{DbError, LoadError};
use crate::loader::{self, LoadRequest, LoadSummary};
use crate::sink::{CopyIn, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyState {
    Active,
    Failed,
}

/// `COPY ... FROM STDIN` over a tokio-postgres connection.
///
/// Dropping the sink before `finish` makes the client send `CopyFail`.
pub struct PgCopyIn {
    sink: Pin<Box<CopyInSink<Bytes>>>,
    state: CopyState,
}

#[async_trait]
impl CopyIn for PgCopyIn {
    async fn send(&mut self, chunk: Bytes) -> Result<(), DbError> {
        if let Err(err) = self.sink.send(chunk).await {
            self.state = CopyState::Failed;
            return Err(err.into());
        }
        Ok(())
    }

    async fn finish(mut self) -> Result<u64, DbError> {
        Ok(self.sink.as_mut().finish().await?)
    }

    fn is_active(&self) -> bool {
        self.state == CopyState::Active
    }

    fn cancel(self) {
        debug!("sending CopyFail");
        drop(self.sink);
    }
}

#[async_trait]
impl<'a> Session for Transaction<'a> {
    type Copy = PgCopyIn;

    async fn execute(&mut self, statement: &str) -> Result<(), DbError> {
        Transaction::batch_execute(self, statement).await?;
        Ok(())
    }

    async fn copy_in(&mut self, statement: &str) -> Result<PgCopyIn, DbError> {
        let sink: CopyInSink<Bytes> = Transaction::copy_in(self, statement).await?;
        Ok(PgCopyIn {
            sink: Box::pin(sink),
            state: CopyState::Active,
        })
    }

    async fn commit(self) -> Result<(), DbError> {
        Transaction::commit(self).await?;
        Ok(())
    }
}

/// Opens a connection and drives it on a background task.
pub async fn connect(config: &DatabaseConfig) -> Result<Client, DbError> {
    info!("connecting to database");
    let mut pg: tokio_postgres::Config = config.url.parse()?;
    if let Some(name) = &config.application_name {
        pg.application_name(name);
    }
    if let Some(secs) = config.connect_timeout_secs {
        pg.connect_timeout(Duration::from_secs(secs));
    }
    let (client, connection) = pg.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(error = %err, "database connection closed with error");
        }
    });
    client
        .batch_execute("SET client_min_messages TO WARNING")
        .await?;
    Ok(client)
}

/// Runs one load inside a fresh transaction on `client`.
pub async fn load<I>(
    client: &mut Client,
    request: &LoadRequest,
    chunks: I,
) -> crate::errors::Result<LoadSummary>
where
    I: Stream<Item = io::Result<Bytes>>,
{
    let tx = client
        .transaction()
        .await
        .map_err(|err| LoadError::copy_protocol("failed to open transaction", DbError::from(err)))?;
    loader::load(tx, request, chunks).await
}
