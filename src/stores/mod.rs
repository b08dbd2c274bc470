//! Vector store seam and the typed records written through it.
//!
//! The [`VectorStore`] trait is the narrow interface the pipeline consumes:
//! collection lifecycle, batched upsert, retrieval by id (the content-level
//! dedup check), similarity search, and a point count. Implementations:
//!
//! - [`qdrant::QdrantStore`] — REST client for a hosted Qdrant instance.
//! - [`memory::MemoryVectorStore`] — deterministic in-process store for
//!   tests and offline runs.

pub mod memory;
pub mod qdrant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extract::ArticleMetadata;
use crate::types::IngestError;

pub use memory::MemoryVectorStore;
pub use qdrant::QdrantStore;

/// Namespace for deterministic point ids. Fixed forever: changing it would
/// re-key every stored point.
const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x5f2c_9b1a_84d3_4e79_a1c6_02ee_7a40_913d);

/// Number of characters of chunk text stored in the payload preview.
pub const TEXT_PREVIEW_CHARS: usize = 300;

/// Deterministic point id for `(base_id, chunk_index)`.
///
/// Same inputs always produce the same UUID, so re-uploading a document
/// overwrites its existing points instead of duplicating them.
pub fn point_id(base_id: &str, chunk_index: usize) -> Uuid {
    Uuid::new_v5(
        &POINT_NAMESPACE,
        format!("{base_id}_chunk_{chunk_index}").as_bytes(),
    )
}

/// Typed payload stored with every point.
///
/// Chunk metadata plus the pipeline's own fields; because the extra fields
/// are struct members, a metadata key can never collide with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    pub chunk_index: usize,
    pub text_preview: String,
}

impl PointPayload {
    /// Builds a payload from chunk metadata plus the pipeline fields.
    ///
    /// Fails when the metadata carries no usable title; points without one
    /// are dropped, not uploaded.
    pub fn build(
        metadata: &ArticleMetadata,
        chunk_index: usize,
        content: &str,
    ) -> Result<Self, IngestError> {
        let title = metadata
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .ok_or_else(|| {
                IngestError::Validation(format!("missing 'title' for chunk {chunk_index}"))
            })?;
        Ok(Self {
            file: metadata.file.clone(),
            title: title.to_string(),
            journal: metadata.journal.clone(),
            year: metadata.year.clone(),
            doi: metadata.doi.clone(),
            pmid: metadata.pmid.clone(),
            chunk_index,
            text_preview: preview(content),
        })
    }
}

fn preview(content: &str) -> String {
    content.chars().take(TEXT_PREVIEW_CHARS).collect()
}

/// One record ready to be written to the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// A point read back from the store.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievedPoint {
    pub id: Uuid,
    pub payload: serde_json::Value,
}

/// A similarity search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
    pub payload: serde_json::Value,
}

/// Distance metric used when creating a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
    Dot,
    Euclid,
}

/// Narrow interface over the external vector database.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn collection_exists(&self, collection: &str) -> Result<bool, IngestError>;

    async fn create_collection(
        &self,
        collection: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<(), IngestError>;

    /// Writes one batch of points; existing ids are overwritten.
    async fn upsert(&self, collection: &str, points: Vec<UploadPoint>) -> Result<(), IngestError>;

    /// Fetches points by id; unknown ids are simply absent from the result.
    async fn retrieve(
        &self,
        collection: &str,
        ids: &[Uuid],
    ) -> Result<Vec<RetrievedPoint>, IngestError>;

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, IngestError>;

    async fn count(&self, collection: &str) -> Result<usize, IngestError>;
}

/// Creates the collection on first use; a no-op when it already exists.
pub async fn ensure_collection(
    store: &dyn VectorStore,
    collection: &str,
    dimension: usize,
) -> Result<(), IngestError> {
    if !store.collection_exists(collection).await? {
        store
            .create_collection(collection, dimension, Distance::Cosine)
            .await?;
    }
    Ok(())
}
