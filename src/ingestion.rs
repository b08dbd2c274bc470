//! The orchestrator: walks the archive and drives every member through
//! gate → extract → dedup → chunk → embed → upsert, checkpointing after
//! each member.
//!
//! Failure handling follows a strict split. Container-open failures,
//! embedding-dimension mismatches, and vector-store write failures abort
//! the run; everything else is confined to the member that caused it and
//! the walk continues. Members whose extraction fails (malformed XML, no
//! pmid) are deliberately left out of the checkpoint so a later run can
//! retry them.

use std::collections::HashSet;
use std::fs::File;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::archive::{GatedMember, WalkEvent, walk_archive};
use crate::checkpoint::CheckpointStore;
use crate::chunking::TextChunker;
use crate::config::IngestConfig;
use crate::embeddings::{EmbeddingBatcher, EmbeddingProvider};
use crate::extract::extract_article;
use crate::pipeline::VectorUpsertPipeline;
use crate::stores::{VectorStore, ensure_collection};
use crate::types::IngestError;

/// Aggregate counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Members fully ingested this run (including legitimately empty ones).
    pub processed: usize,
    /// Members skipped as already known, by name or by content.
    pub skipped: usize,
    /// Members that failed in isolation and were left for a future retry.
    pub failed: usize,
    /// Points written to the vector store.
    pub points_uploaded: usize,
    /// Chunks dropped by per-chunk validation.
    pub points_dropped: usize,
}

/// Runs one checkpointed ingestion pass over the configured archive.
pub struct IngestionOrchestrator {
    config: IngestConfig,
    store: Arc<dyn VectorStore>,
    chunker: TextChunker,
    batcher: EmbeddingBatcher,
    pipeline: VectorUpsertPipeline,
    checkpoint: CheckpointStore,
}

impl IngestionOrchestrator {
    pub fn new(
        config: IngestConfig,
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap)?;
        let batcher = EmbeddingBatcher::new(provider, config.embedding_dim);
        let pipeline = VectorUpsertPipeline::new(
            store.clone(),
            config.collection.clone(),
            config.embedding_dim,
            config.batch_size,
        );
        let checkpoint = CheckpointStore::new(config.checkpoint_path.clone());
        Ok(Self {
            config,
            store,
            chunker,
            batcher,
            pipeline,
            checkpoint,
        })
    }

    /// Processes the archive to completion.
    ///
    /// Returns the aggregate stats, or the first fatal error. Per-member
    /// failures are logged with the member's name and error kind and never
    /// abort the run.
    pub async fn run(&self) -> Result<IngestStats, IngestError> {
        let processed = Arc::new(Mutex::new(self.checkpoint.load().await?));
        ensure_collection(
            self.store.as_ref(),
            &self.config.collection,
            self.config.embedding_dim,
        )
        .await?;

        let file = File::open(&self.config.archive_path).map_err(|err| {
            IngestError::Archive(format!(
                "cannot open archive '{}': {err}",
                self.config.archive_path.display()
            ))
        })?;
        info!(archive = %self.config.archive_path.display(), "starting ingestion run");

        let (tx, rx) = flume::bounded(8);
        let walker_set = processed.clone();
        let walker = tokio::task::spawn_blocking(move || walk_archive(file, walker_set, tx));

        let mut stats = IngestStats::default();
        let mut fatal: Option<IngestError> = None;

        while let Ok(event) = rx.recv_async().await {
            match event {
                WalkEvent::Member(member) => {
                    let name = member.name.clone();
                    match self.process_member(member, &processed, &mut stats).await {
                        Ok(()) => {}
                        Err(err) if err.is_fatal() => {
                            error!(member = %name, error = %err, "fatal failure, aborting run");
                            fatal = Some(err);
                            break;
                        }
                        Err(err) => {
                            warn!(
                                member = %name,
                                kind = err.kind(),
                                error = %err,
                                "member failed, continuing"
                            );
                            stats.failed += 1;
                        }
                    }
                }
                WalkEvent::AlreadySeen(name) => {
                    debug!(member = %name, "member already processed");
                    stats.skipped += 1;
                }
                WalkEvent::Failed(err) => {
                    error!(error = %err, "archive walk failed");
                    fatal = Some(err);
                    break;
                }
            }
        }
        drop(rx);
        walker
            .await
            .map_err(|err| IngestError::Archive(format!("archive walker panicked: {err}")))?;

        if let Some(err) = fatal {
            return Err(err);
        }
        info!(
            processed = stats.processed,
            skipped = stats.skipped,
            failed = stats.failed,
            points_uploaded = stats.points_uploaded,
            points_dropped = stats.points_dropped,
            "ingestion run complete"
        );
        Ok(stats)
    }

    async fn process_member(
        &self,
        member: GatedMember,
        processed: &Arc<Mutex<HashSet<String>>>,
        stats: &mut IngestStats,
    ) -> Result<(), IngestError> {
        // Authoritative dedup-by-name re-check; the walker gates against a
        // snapshot that can trail this loop by a few buffered members.
        if processed.lock().contains(&member.name) {
            stats.skipped += 1;
            return Ok(());
        }

        let doc = extract_article(&member.bytes, &member.name);
        let Some(text) = doc.text else {
            // Parse failure, already logged by the extractor. Not
            // checkpointed, so a future run can retry it.
            stats.failed += 1;
            return Ok(());
        };
        let Some(base_id) = doc.metadata.pmid.clone() else {
            warn!(member = %member.name, "document has no pmid, skipping");
            stats.failed += 1;
            return Ok(());
        };

        // Content-level dedup: the store itself is authoritative, even when
        // the checkpoint file was lost.
        let first_id = self.pipeline.first_chunk_id(&base_id);
        let existing = self
            .store
            .retrieve(&self.config.collection, &[first_id])
            .await?;
        if !existing.is_empty() {
            info!(member = %member.name, pmid = %base_id, "document already embedded, skipping");
            stats.skipped += 1;
            self.mark_processed(&member.name, processed).await?;
            return Ok(());
        }

        let chunks = self.chunker.split(&text, Some(&doc.metadata));
        if chunks.is_empty() {
            info!(member = %member.name, "document has no text to embed");
            stats.processed += 1;
            self.mark_processed(&member.name, processed).await?;
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = match self.batcher.embed_chunks(&texts).await {
            Ok(vectors) => vectors,
            // A dimension mismatch is systemic and aborts the run.
            Err(err @ IngestError::Configuration(_)) => return Err(err),
            Err(err) => {
                warn!(
                    member = %member.name,
                    kind = err.kind(),
                    error = %err,
                    "embedding failed, leaving member for retry"
                );
                stats.failed += 1;
                return Ok(());
            }
        };

        let outcome = self
            .pipeline
            .upsert_document(&base_id, &chunks, vectors)
            .await?;
        stats.points_uploaded += outcome.uploaded;
        stats.points_dropped += outcome.dropped;
        stats.processed += 1;
        info!(
            member = %member.name,
            pmid = %base_id,
            uploaded = outcome.uploaded,
            dropped = outcome.dropped,
            "member ingested"
        );
        self.mark_processed(&member.name, processed).await
    }

    /// Grows the in-memory set and flushes it before the next member runs,
    /// so a crash loses at most the in-flight member.
    async fn mark_processed(
        &self,
        name: &str,
        processed: &Arc<Mutex<HashSet<String>>>,
    ) -> Result<(), IngestError> {
        let snapshot = {
            let mut guard = processed.lock();
            guard.insert(name.to_string());
            guard.clone()
        };
        self.checkpoint.save(&snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbeddingProvider;
    use crate::stores::MemoryVectorStore;
    use std::path::Path;

    fn test_config(dir: &Path, dimension: usize) -> IngestConfig {
        IngestConfig {
            chunk_size: 80,
            chunk_overlap: 10,
            embedding_dim: dimension,
            batch_size: 4,
            archive_path: dir.join("data.tar.gz"),
            checkpoint_path: dir.join("checkpoint.json"),
            collection: "pmc-test".into(),
            ..Default::default()
        }
    }

    fn orchestrator(config: IngestConfig) -> (IngestionOrchestrator, Arc<MemoryVectorStore>) {
        let store = Arc::new(MemoryVectorStore::new());
        let provider = Arc::new(MockEmbeddingProvider::new(config.embedding_dim));
        let orchestrator = IngestionOrchestrator::new(config, store.clone(), provider).unwrap();
        (orchestrator, store)
    }

    #[tokio::test]
    async fn missing_archive_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _store) = orchestrator(test_config(dir.path(), 8));

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, IngestError::Archive(_)));
    }

    #[tokio::test]
    async fn member_without_pmid_fails_and_is_not_checkpointed() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 8);
        let bytes = crate::archive::tests::build_archive(|builder| {
            crate::archive::tests::add_file(
                builder,
                "nopmid.xml",
                b"<article><front><article-meta><title-group>\
                  <article-title>Untitledless</article-title></title-group>\
                  </article-meta></front><body><p>Some body text.</p></body></article>",
            );
        });
        std::fs::write(&config.archive_path, bytes).unwrap();

        let (orchestrator, store) = orchestrator(config.clone());
        let stats = orchestrator.run().await.unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.processed, 0);
        assert_eq!(store.count("pmc-test").await.unwrap(), 0);
        let checkpoint = CheckpointStore::new(&config.checkpoint_path);
        assert!(checkpoint.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dimension_mismatch_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 8);
        let bytes = crate::archive::tests::build_archive(|builder| {
            crate::archive::tests::add_file(
                builder,
                "good.xml",
                b"<article><front><article-meta>\
                  <article-id pub-id-type=\"pmid\">42</article-id>\
                  <title-group><article-title>T</article-title></title-group>\
                  </article-meta></front><body><p>Some body text.</p></body></article>",
            );
        });
        std::fs::write(&config.archive_path, bytes).unwrap();

        let store = Arc::new(MemoryVectorStore::new());
        // Provider emits 4-dim vectors against a configured dimension of 8.
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        let orchestrator = IngestionOrchestrator::new(config, store, provider).unwrap();

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }
}
