//! Checkpointed ingestion of a PMC XML archive into Qdrant.
//!
//! Reads `config.json` from the working directory (every field optional),
//! applies `QDRANT_HOST`, `QDRANT_API_KEY` and `EMBEDDINGS_URL` overrides,
//! then runs one full pass over the configured archive. Safe to re-run: the
//! checkpoint file and deterministic point ids make repeats no-ops.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pmc_ragsmith::embeddings::HttpEmbeddingProvider;
use pmc_ragsmith::stores::QdrantStore;
use pmc_ragsmith::{IngestConfig, IngestError, IngestionOrchestrator};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(kind = err.kind(), error = %err, "ingestion failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), IngestError> {
    let mut config = IngestConfig::load("config.json");
    config.apply_env();
    config.validate()?;

    let qdrant_url = config.qdrant_url.clone().ok_or_else(|| {
        IngestError::Configuration("QDRANT_HOST is not set and config.json has no qdrant_url".into())
    })?;
    let embeddings_url = config.embeddings_url.clone().ok_or_else(|| {
        IngestError::Configuration(
            "EMBEDDINGS_URL is not set and config.json has no embeddings_url".into(),
        )
    })?;

    let store = Arc::new(QdrantStore::new(&qdrant_url, config.qdrant_api_key.clone())?);
    let provider = Arc::new(HttpEmbeddingProvider::new(&embeddings_url)?);

    let orchestrator = IngestionOrchestrator::new(config, store, provider)?;
    let stats = orchestrator.run().await?;
    info!(
        processed = stats.processed,
        skipped = stats.skipped,
        failed = stats.failed,
        points_uploaded = stats.points_uploaded,
        "done"
    );
    Ok(())
}
