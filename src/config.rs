//! Runtime configuration for the ingestion pipeline.
//!
//! The configuration is constructed once at process start and handed to each
//! component by value; nothing reads ambient global state. File values can be
//! overridden from the environment for credentials and endpoints.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{error, warn};

use crate::types::IngestError;

/// Options recognized by the ingestion pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Expected embedding vector length.
    pub embedding_dim: usize,
    /// Number of points per upsert request.
    pub batch_size: usize,
    /// Location of the gzip-compressed tar archive to ingest.
    pub archive_path: PathBuf,
    /// Location of the processed-member checkpoint file.
    pub checkpoint_path: PathBuf,
    /// Target collection in the vector store.
    pub collection: String,
    /// Vector store endpoint. Overridable via `QDRANT_HOST`.
    pub qdrant_url: Option<String>,
    /// Vector store credential. Overridable via `QDRANT_API_KEY`.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider endpoint. Overridable via `EMBEDDINGS_URL`.
    pub embeddings_url: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            embedding_dim: 768,
            batch_size: 64,
            archive_path: PathBuf::from("data.tar.gz"),
            checkpoint_path: PathBuf::from("checkpoint.json"),
            collection: "pmc-embeddings".to_string(),
            qdrant_url: None,
            qdrant_api_key: None,
            embeddings_url: None,
        }
    }
}

impl IngestConfig {
    /// Loads configuration from a JSON file, falling back to defaults when
    /// the file is missing or unreadable.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %path.display(), %err, "config file not found, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(err) => {
                error!(path = %path.display(), %err, "invalid JSON in config file, using defaults");
                Self::default()
            }
        }
    }

    /// Applies environment overrides for endpoints and credentials.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("QDRANT_HOST") {
            self.qdrant_url = Some(url);
        }
        if let Ok(key) = std::env::var("QDRANT_API_KEY") {
            self.qdrant_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("EMBEDDINGS_URL") {
            self.embeddings_url = Some(url);
        }
    }

    /// Rejects value combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::Configuration("chunk_size must be > 0".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embedding_dim == 0 {
            return Err(IngestError::Configuration(
                "embedding_dim must be > 0".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(IngestError::Configuration("batch_size must be > 0".into()));
        }
        Ok(())
    }
}
