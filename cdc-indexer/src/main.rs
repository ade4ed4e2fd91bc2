//! CDC Indexer Main Entry Point
//!
//! Consumes Debezium change events from Kafka and applies them to the
//! OpenSearch index until SIGINT or SIGTERM.

use cdc_indexer::{Dependencies, IndexingError, Settings};
use dotenv::dotenv;
use std::env;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
fn init_tracing() -> Result<(), IndexingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cdc_indexer=info,cdc_indexer_repository=info"));

    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        // Structured output for log shippers
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()
            .map_err(|e| IndexingError::config(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .try_init()
            .map_err(|e| IndexingError::config(e.to_string()))?;
    }

    info!(
        service_name = "cdc-indexer",
        service_version = env!("CARGO_PKG_VERSION"),
        json = json,
        "Tracing initialized"
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing()?;

    info!("Starting CDC indexer");

    let settings = Settings::from_env();

    let deps = match Dependencies::new(&settings).await {
        Ok(deps) => {
            info!(
                readers = deps.supervisor.reader_count(),
                "Dependencies initialized successfully"
            );
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    match deps.supervisor.run().await {
        Ok(()) => {
            info!("CDC indexer stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "CDC indexer failed");
            Err(e.into())
        }
    }
}
