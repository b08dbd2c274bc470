//! Qdrant REST implementation of the vector store seam.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use url::Url;
use uuid::Uuid;

use super::{Distance, RetrievedPoint, ScoredPoint, UploadPoint, VectorStore};
use crate::types::IngestError;

/// REST client for one Qdrant deployment.
#[derive(Debug, Clone)]
pub struct QdrantStore {
    client: Client,
    base: Url,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

impl QdrantStore {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, IngestError> {
        let base = Url::parse(base_url).map_err(|err| {
            IngestError::Configuration(format!("invalid Qdrant URL '{base_url}': {err}"))
        })?;
        Ok(Self {
            client: Client::new(),
            base,
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, IngestError> {
        self.base.join(path).map_err(|err| {
            IngestError::Configuration(format!("invalid Qdrant path '{path}': {err}"))
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    /// Maps non-success responses to [`IngestError::Storage`], keeping the
    /// status and response body for diagnosis.
    async fn checked(response: Response, operation: &str) -> Result<Response, IngestError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(IngestError::Storage(format!(
            "{operation} failed with {status}: {body}"
        )))
    }
}

impl Distance {
    fn as_qdrant(self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
            Distance::Dot => "Dot",
            Distance::Euclid => "Euclid",
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool, IngestError> {
        let url = self.endpoint(&format!("collections/{collection}/exists"))?;
        let response = self.authorized(self.client.get(url)).send().await?;
        let response = Self::checked(response, "collection existence check").await?;
        let envelope: ApiEnvelope<ExistsResult> = response.json().await?;
        Ok(envelope.result.exists)
    }

    async fn create_collection(
        &self,
        collection: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<(), IngestError> {
        let url = self.endpoint(&format!("collections/{collection}"))?;
        let body = json!({
            "vectors": { "size": dimension, "distance": distance.as_qdrant() }
        });
        let response = self.authorized(self.client.put(url)).json(&body).send().await?;
        Self::checked(response, "collection creation").await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<UploadPoint>) -> Result<(), IngestError> {
        let url = self.endpoint(&format!("collections/{collection}/points?wait=true"))?;
        let body = json!({
            "points": points
                .iter()
                .map(|point| json!({
                    "id": point.id,
                    "vector": point.vector,
                    "payload": point.payload,
                }))
                .collect::<Vec<_>>()
        });
        let response = self.authorized(self.client.put(url)).json(&body).send().await?;
        Self::checked(response, "point upsert").await?;
        Ok(())
    }

    async fn retrieve(
        &self,
        collection: &str,
        ids: &[Uuid],
    ) -> Result<Vec<RetrievedPoint>, IngestError> {
        let url = self.endpoint(&format!("collections/{collection}/points"))?;
        let body = json!({ "ids": ids, "with_payload": true });
        let response = self.authorized(self.client.post(url)).json(&body).send().await?;
        let response = Self::checked(response, "point retrieval").await?;
        let envelope: ApiEnvelope<Vec<RetrievedPoint>> = response.json().await?;
        Ok(envelope.result)
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, IngestError> {
        let url = self.endpoint(&format!("collections/{collection}/points/search"))?;
        let body = json!({ "vector": vector, "limit": limit, "with_payload": true });
        let response = self.authorized(self.client.post(url)).json(&body).send().await?;
        let response = Self::checked(response, "similarity search").await?;
        let envelope: ApiEnvelope<Vec<ScoredPoint>> = response.json().await?;
        Ok(envelope.result)
    }

    async fn count(&self, collection: &str) -> Result<usize, IngestError> {
        let url = self.endpoint(&format!("collections/{collection}/points/count"))?;
        let body = json!({ "exact": true });
        let response = self.authorized(self.client.post(url)).json(&body).send().await?;
        let response = Self::checked(response, "point count").await?;
        let envelope: ApiEnvelope<CountResult> = response.json().await?;
        Ok(envelope.result.count)
    }
}
