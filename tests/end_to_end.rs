//! Full pipeline runs over a real gzip tar archive on disk, using the
//! in-memory store and the deterministic embedding provider.

use std::path::Path;
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{Builder, Header};

use pmc_ragsmith::checkpoint::CheckpointStore;
use pmc_ragsmith::embeddings::MockEmbeddingProvider;
use pmc_ragsmith::stores::{MemoryVectorStore, VectorStore};
use pmc_ragsmith::{IngestConfig, IngestionOrchestrator, Retriever};

const DIMENSION: usize = 16;

fn article_xml(pmid: &str, title: &str, body: &str) -> Vec<u8> {
    format!(
        "<article><front><article-meta>\
         <article-id pub-id-type=\"pmid\">{pmid}</article-id>\
         <title-group><article-title>{title}</article-title></title-group>\
         </article-meta></front><body><p>{body}</p></body></article>"
    )
    .into_bytes()
}

fn write_archive(path: &Path, members: &[(&str, &[u8])]) {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    for (name, content) in members {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *content).unwrap();
    }
    let bytes = builder.into_inner().unwrap().finish().unwrap();
    std::fs::write(path, bytes).unwrap();
}

fn config(dir: &Path) -> IngestConfig {
    IngestConfig {
        chunk_size: 120,
        chunk_overlap: 20,
        embedding_dim: DIMENSION,
        batch_size: 8,
        archive_path: dir.join("data.tar.gz"),
        checkpoint_path: dir.join("checkpoint.json"),
        collection: "pmc-embeddings".into(),
        ..Default::default()
    }
}

fn orchestrator(
    config: IngestConfig,
    store: Arc<MemoryVectorStore>,
) -> IngestionOrchestrator {
    let provider = Arc::new(MockEmbeddingProvider::new(DIMENSION));
    IngestionOrchestrator::new(config, store, provider).unwrap()
}

fn long_body() -> String {
    "Mitochondria are membrane-bound organelles that generate most of the \
     chemical energy needed to power the biochemical reactions of the cell. \
     Energy produced by mitochondria is stored as adenosine triphosphate. \
     Mitochondrial dysfunction has been implicated in a range of disorders."
        .to_string()
}

#[tokio::test]
async fn valid_member_is_ingested_and_malformed_member_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let body = long_body();
    write_archive(
        &config.archive_path,
        &[
            ("PMC001.xml", article_xml("123", "Mitochondria", &body).as_slice()),
            ("PMC002.xml", b"<article><body>unterminated".as_slice()),
        ],
    );

    let store = Arc::new(MemoryVectorStore::new());
    let stats = orchestrator(config.clone(), store.clone()).run().await.unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.skipped, 0);
    assert!(stats.points_uploaded >= 2, "body should split into chunks");
    assert_eq!(
        store.count("pmc-embeddings").await.unwrap(),
        stats.points_uploaded
    );
    for payload in store.payloads("pmc-embeddings") {
        assert_eq!(payload["pmid"], "123");
        assert_eq!(payload["title"], "Mitochondria");
        assert!(payload["text_preview"].as_str().unwrap().len() <= 300);
    }

    // The malformed member stays out of the checkpoint so a later run can
    // retry it once the data is fixed.
    let checkpointed = CheckpointStore::new(&config.checkpoint_path)
        .load()
        .await
        .unwrap();
    assert!(checkpointed.contains("PMC001.xml"));
    assert!(!checkpointed.contains("PMC002.xml"));
}

#[tokio::test]
async fn second_run_over_same_archive_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let body = long_body();
    write_archive(
        &config.archive_path,
        &[("PMC001.xml", article_xml("123", "Mitochondria", &body).as_slice())],
    );

    let store = Arc::new(MemoryVectorStore::new());
    let first = orchestrator(config.clone(), store.clone()).run().await.unwrap();
    let calls_after_first = store.upsert_calls();
    assert!(first.points_uploaded >= 2);

    let second = orchestrator(config, store.clone()).run().await.unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.points_uploaded, 0);
    assert_eq!(store.upsert_calls(), calls_after_first);
    assert_eq!(
        store.count("pmc-embeddings").await.unwrap(),
        first.points_uploaded
    );
}

#[tokio::test]
async fn lost_checkpoint_falls_back_to_content_dedup() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let body = long_body();
    write_archive(
        &config.archive_path,
        &[("PMC001.xml", article_xml("123", "Mitochondria", &body).as_slice())],
    );

    let store = Arc::new(MemoryVectorStore::new());
    let first = orchestrator(config.clone(), store.clone()).run().await.unwrap();
    std::fs::remove_file(&config.checkpoint_path).unwrap();

    let second = orchestrator(config.clone(), store.clone()).run().await.unwrap();
    assert_eq!(second.skipped, 1);
    assert_eq!(second.points_uploaded, 0);
    assert_eq!(
        store.count("pmc-embeddings").await.unwrap(),
        first.points_uploaded
    );
    // The dedup hit restores the checkpoint entry.
    let checkpointed = CheckpointStore::new(&config.checkpoint_path)
        .load()
        .await
        .unwrap();
    assert!(checkpointed.contains("PMC001.xml"));
}

#[tokio::test]
async fn ingested_text_is_searchable() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let body = long_body();
    write_archive(
        &config.archive_path,
        &[
            ("PMC001.xml", article_xml("123", "Mitochondria", &body).as_slice()),
            (
                "PMC003.xml",
                article_xml("456", "Geology", "Basalt weathers slowly under arid conditions.")
                    .as_slice(),
            ),
        ],
    );

    let store = Arc::new(MemoryVectorStore::new());
    orchestrator(config.clone(), store.clone()).run().await.unwrap();

    let provider = Arc::new(MockEmbeddingProvider::new(DIMENSION));
    let retriever = Retriever::new(store, provider, DIMENSION, config.collection.clone());
    let hits = retriever
        .search("Basalt weathers slowly under arid conditions.", 3)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].title.as_deref(), Some("Geology"));
}
