//! Question-to-passages retrieval over an ingested collection.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::embeddings::{EmbeddingBatcher, EmbeddingProvider};
use crate::stores::VectorStore;
use crate::types::IngestError;

/// One ranked passage returned by [`Retriever::search`].
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: Uuid,
    pub score: f32,
    pub title: Option<String>,
    pub text_preview: Option<String>,
    /// Full stored payload, for callers that need journal, year, doi, etc.
    pub payload: Value,
}

/// Embeds a question with the same provider used at ingest time and runs a
/// similarity search against the collection.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    batcher: EmbeddingBatcher,
    collection: String,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        dimension: usize,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            batcher: EmbeddingBatcher::new(provider, dimension),
            collection: collection.into(),
        }
    }

    pub async fn search(
        &self,
        question: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, IngestError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(IngestError::Validation("empty search question".into()));
        }

        let mut vectors = self.batcher.embed_chunks(&[question.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| IngestError::Validation("provider returned no vector".into()))?;

        let hits = self.store.search(&self.collection, &vector, limit).await?;
        info!(collection = %self.collection, hits = hits.len(), "similarity search complete");

        Ok(hits
            .into_iter()
            .map(|hit| {
                let title = string_field(&hit.payload, "title");
                let text_preview = string_field(&hit.payload, "text_preview");
                SearchHit {
                    id: hit.id,
                    score: hit.score,
                    title,
                    text_preview,
                    payload: hit.payload,
                }
            })
            .collect())
    }
}

fn string_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}
