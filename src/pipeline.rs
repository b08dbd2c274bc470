//! Point construction and batched upsert for one document.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::chunking::Chunk;
use crate::stores::{PointPayload, UploadPoint, VectorStore, point_id};
use crate::types::IngestError;

/// What happened to one document's chunks during upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub uploaded: usize,
    pub dropped: usize,
}

/// Builds one upload point from a chunk and its aligned vector.
///
/// Validation failures are scoped to this chunk: a wrong-sized vector or a
/// missing title makes this point unbuildable without implicating the rest
/// of the document.
pub fn build_point(
    chunk: &Chunk,
    vector: Vec<f32>,
    base_id: &str,
    chunk_index: usize,
    dimension: usize,
) -> Result<UploadPoint, IngestError> {
    if vector.len() != dimension {
        return Err(IngestError::Validation(format!(
            "invalid vector size for chunk {chunk_index}: got {}, expected {dimension}",
            vector.len()
        )));
    }
    let payload = PointPayload::build(&chunk.metadata, chunk_index, &chunk.content)?;
    Ok(UploadPoint {
        id: point_id(base_id, chunk_index),
        vector,
        payload,
    })
}

/// Writes one document's chunks to the vector store in fixed-size batches.
#[derive(Clone)]
pub struct VectorUpsertPipeline {
    store: Arc<dyn VectorStore>,
    collection: String,
    dimension: usize,
    batch_size: usize,
}

impl VectorUpsertPipeline {
    pub fn new(
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        dimension: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            dimension,
            batch_size: batch_size.max(1),
        }
    }

    /// Deterministic id of the document's first chunk, the key used for the
    /// content-level dedup check.
    pub fn first_chunk_id(&self, base_id: &str) -> Uuid {
        point_id(base_id, 0)
    }

    /// Builds and writes all points for one document.
    ///
    /// Chunks that fail validation are logged with the document's context
    /// and dropped; the survivors are uploaded in `batch_size` batches. A
    /// store-level write failure aborts the whole call. Zero surviving
    /// points is a logged no-op, not an error.
    pub async fn upsert_document(
        &self,
        base_id: &str,
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<UpsertOutcome, IngestError> {
        let mut outcome = UpsertOutcome::default();
        let mut points = Vec::with_capacity(chunks.len());

        for (index, (chunk, vector)) in chunks.iter().zip(vectors).enumerate() {
            match build_point(chunk, vector, base_id, index, self.dimension) {
                Ok(point) => points.push(point),
                Err(err) => {
                    warn!(
                        document = base_id,
                        chunk_index = index,
                        kind = err.kind(),
                        error = %err,
                        "dropping chunk that failed point construction"
                    );
                    outcome.dropped += 1;
                }
            }
        }

        if points.is_empty() {
            info!(document = base_id, "no valid points to upload");
            return Ok(outcome);
        }

        for batch in points.chunks(self.batch_size) {
            self.store
                .upsert(&self.collection, batch.to_vec())
                .await
                .map_err(|err| {
                    warn!(document = base_id, error = %err, "batch upsert failed");
                    err
                })?;
            outcome.uploaded += batch.len();
        }
        Ok(outcome)
    }
}
