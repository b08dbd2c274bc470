//! In-process vector store used by tests and offline runs.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{Distance, RetrievedPoint, ScoredPoint, UploadPoint, VectorStore};
use crate::types::IngestError;

#[derive(Debug, Default)]
struct Collection {
    dimension: usize,
    points: HashMap<Uuid, (Vec<f32>, serde_json::Value)>,
}

/// Deterministic [`VectorStore`] backed by a hash map.
///
/// Behaves like the real store where the pipeline can observe it: upserts
/// overwrite by id, retrieval drops unknown ids, search ranks by cosine
/// similarity. Also counts upsert calls so tests can assert batching and
/// idempotence.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    collections: Mutex<HashMap<String, Collection>>,
    upsert_calls: Mutex<usize>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `upsert` calls received so far.
    pub fn upsert_calls(&self) -> usize {
        *self.upsert_calls.lock()
    }

    /// Payloads of every stored point in `collection`, unordered.
    pub fn payloads(&self, collection: &str) -> Vec<serde_json::Value> {
        self.collections
            .lock()
            .get(collection)
            .map(|collection| {
                collection
                    .points
                    .values()
                    .map(|(_, payload)| payload.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool, IngestError> {
        Ok(self.collections.lock().contains_key(collection))
    }

    async fn create_collection(
        &self,
        collection: &str,
        dimension: usize,
        _distance: Distance,
    ) -> Result<(), IngestError> {
        self.collections.lock().insert(
            collection.to_string(),
            Collection {
                dimension,
                points: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<UploadPoint>) -> Result<(), IngestError> {
        *self.upsert_calls.lock() += 1;
        let mut collections = self.collections.lock();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| IngestError::Storage(format!("unknown collection '{collection}'")))?;
        for point in points {
            if point.vector.len() != target.dimension {
                return Err(IngestError::Storage(format!(
                    "vector size {} does not match collection dimension {}",
                    point.vector.len(),
                    target.dimension
                )));
            }
            let payload = serde_json::to_value(&point.payload)
                .map_err(|err| IngestError::Storage(err.to_string()))?;
            target.points.insert(point.id, (point.vector, payload));
        }
        Ok(())
    }

    async fn retrieve(
        &self,
        collection: &str,
        ids: &[Uuid],
    ) -> Result<Vec<RetrievedPoint>, IngestError> {
        let collections = self.collections.lock();
        let target = collections
            .get(collection)
            .ok_or_else(|| IngestError::Storage(format!("unknown collection '{collection}'")))?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                target.points.get(id).map(|(_, payload)| RetrievedPoint {
                    id: *id,
                    payload: payload.clone(),
                })
            })
            .collect())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, IngestError> {
        let collections = self.collections.lock();
        let target = collections
            .get(collection)
            .ok_or_else(|| IngestError::Storage(format!("unknown collection '{collection}'")))?;
        let mut hits: Vec<ScoredPoint> = target
            .points
            .iter()
            .map(|(id, (stored, payload))| ScoredPoint {
                id: *id,
                score: cosine(vector, stored),
                payload: payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<usize, IngestError> {
        let collections = self.collections.lock();
        Ok(collections
            .get(collection)
            .map(|target| target.points.len())
            .unwrap_or(0))
    }
}
