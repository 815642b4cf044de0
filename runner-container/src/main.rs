use anyhow::{Context, Result};
use pgsink_core::config::load_config;
use pgsink_core::sink::postgres;
use pgsink_core::source::reader;
use pgsink_core::telemetry::init_tracing;
use tracing::error;

/// Exit code for failures a caller may retry (EX_TEMPFAIL).
const EXIT_RETRYABLE: i32 = 75;

/// Loads CSV rows from stdin into PostgreSQL.
///
/// What it does at a high-level:
///     Load config from the path given as the first argument, or from PGSINK_CONFIG.
///     Connect, then run a single load inside one transaction:
///         - provision the destination table per write mode
///         - COPY stdin into it
///     Print the load summary as JSON. Nothing is retried.
#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = load_config(config_path.as_deref()).await?;
    config.validate()?;

    let mut client = postgres::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    let request = config.load.request();
    let chunks = reader::chunks(tokio::io::stdin(), config.load.chunk_size);

    match postgres::load(&mut client, &request, chunks).await {
        Ok(summary) => {
            println!("{}", serde_json::to_string(&summary)?);
            Ok(())
        }
        Err(e) if e.is_retryable() => {
            error!(error = %e, "load failed, caller may retry");
            std::process::exit(EXIT_RETRYABLE);
        }
        Err(e) => Err(e).context("Load failed"),
    }
}
