//! Error taxonomy shared across the ingestion pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Closed set of failure kinds surfaced by the pipeline.
///
/// Variants fall into two families. Fatal kinds abort a whole run
/// ([`Archive`](IngestError::Archive), [`Configuration`](IngestError::Configuration),
/// [`Connectivity`](IngestError::Connectivity), [`Storage`](IngestError::Storage)).
/// Everything else is caught at the smallest enclosing scope — one member or
/// one chunk — logged with its context, and the run continues.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The archive container itself could not be opened or read.
    #[error("archive error: {0}")]
    Archive(String),

    /// An archive entry would resolve outside the extraction directory.
    #[error("unsafe archive path '{name}' escapes '{}'", .dest.display())]
    UnsafePath { name: String, dest: PathBuf },

    /// Malformed XML in a single document.
    #[error("parse error in '{name}': {detail}")]
    Parse { name: String, detail: String },

    /// A document's bytes were not valid text.
    #[error("encoding error in '{name}': {detail}")]
    Encoding { name: String, detail: String },

    /// Per-item data failed a pipeline invariant (vector size, missing title).
    #[error("validation error: {0}")]
    Validation(String),

    /// The embedding provider or vector store could not be reached.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// A systemic misconfiguration (embedding dimension, chunker bounds).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The vector store rejected a request.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem failure outside the archive container.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Whether this error aborts the whole run rather than a single member.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Archive(_)
                | IngestError::Configuration(_)
                | IngestError::Connectivity(_)
                | IngestError::Storage(_)
        )
    }

    /// Short stable label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Archive(_) => "archive",
            IngestError::UnsafePath { .. } => "unsafe_path",
            IngestError::Parse { .. } => "parse",
            IngestError::Encoding { .. } => "encoding",
            IngestError::Validation(_) => "validation",
            IngestError::Connectivity(_) => "connectivity",
            IngestError::Configuration(_) => "configuration",
            IngestError::Storage(_) => "storage",
            IngestError::Io(_) => "io",
        }
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        IngestError::Connectivity(err.to_string())
    }
}
