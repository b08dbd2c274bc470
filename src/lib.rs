//! ```text
//! data.tar.gz ──► archive::walk_archive ──► gate (xml-only, links, seen names)
//!                                │
//!                                ▼
//!                  extract::extract_article ──► body text + ArticleMetadata
//!                                │
//!                                ▼
//!                  chunking::TextChunker ──► Chunk batch
//!                                │
//!                                ▼
//!                  embeddings::EmbeddingBatcher ──► aligned vectors
//!                                │
//!                                ▼
//!                  pipeline::VectorUpsertPipeline ──► stores::VectorStore
//!                                │                      (Qdrant / in-memory)
//!                                ▼
//!                  checkpoint::CheckpointStore (after every member)
//!
//! Stored vectors ──► retrieval::Retriever ──► ranked passages
//! ```
//!
//! The whole walk is resumable and idempotent: member names are
//! checkpointed, point ids are deterministic, and re-running over the same
//! archive writes nothing new.
pub mod archive;
pub mod checkpoint;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod extract;
pub mod ingestion;
pub mod pipeline;
pub mod retrieval;
pub mod stores;
pub mod types;

pub use config::IngestConfig;
pub use ingestion::{IngestStats, IngestionOrchestrator};
pub use retrieval::Retriever;
pub use types::IngestError;
