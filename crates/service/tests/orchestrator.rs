use async_trait::async_trait;
use docqa_service::{
    AnswerProvider, ErrorKind, ProviderError, ProviderErrorKind, RagService, ServiceConfig,
    ServiceError, StubAnswerer,
};
use docqa_vector_store::{EmbeddingProvider, StubEmbedder, VectorStore};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

const DIM: usize = 24;

struct Unreachable;

#[async_trait]
impl AnswerProvider for Unreachable {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn answer(&self, _question: &str, _context: &[String]) -> Result<String, ProviderError> {
        Err(ProviderError::new(
            "ollama",
            ProviderErrorKind::Unavailable,
            "ollama returned an HTML error page (status 502)",
        ))
    }
}

fn config_in(dir: &TempDir) -> ServiceConfig {
    let mut config = ServiceConfig {
        data_dir: dir.path().to_path_buf(),
        ..ServiceConfig::default()
    };
    config.chunking.chunk_size = 120;
    config.chunking.overlap = 20;
    config
}

async fn service_with(dir: &TempDir, answerers: Vec<Arc<dyn AnswerProvider>>) -> RagService {
    let config = config_in(dir);
    let store = VectorStore::open(config.index_base_path(), DIM)
        .await
        .unwrap();
    RagService::new(
        config,
        Arc::new(store),
        Arc::new(StubEmbedder::new(DIM)),
        answerers,
    )
    .unwrap()
}

async fn service(dir: &TempDir) -> RagService {
    service_with(dir, vec![Arc::new(StubAnswerer)]).await
}

fn long_text(topic: &str) -> String {
    (0..12)
        .map(|i| format!("Sentence {i} explains {topic} in some detail. "))
        .collect()
}

#[tokio::test]
async fn ingest_then_ask_returns_sources() {
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp).await;

    let report = service
        .ingest("guide.txt", long_text("ownership").as_bytes())
        .await
        .unwrap();
    assert_eq!(report.filename, "guide.txt");
    assert!(report.chunks > 1);
    assert_eq!(report.total_chunks_in_store, report.chunks);
    assert!(tmp.path().join("uploads").join("guide.txt").exists());

    let answer = service.ask("  How does ownership work?  ").await.unwrap();
    assert_eq!(answer.sources.len(), 3);
    assert!(answer.answer.starts_with("Based on the documents:"));
    assert!(answer.sources[0].contains("ownership"));
}

#[tokio::test]
async fn stored_metadata_describes_each_chunk() {
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp).await;
    let report = service
        .ingest("nested/dir/notes.TXT", long_text("borrowing").as_bytes())
        .await
        .unwrap();
    assert_eq!(report.filename, "notes.TXT");

    let records = service.store().records().await;
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.metadata["filename"], "notes.TXT");
        assert_eq!(record.metadata["chunk_index"], i);
        assert_eq!(record.metadata["total_chunks"], records.len());
    }
}

#[tokio::test]
async fn ask_validates_input_and_state() {
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp).await;

    let err = service.ask("   ").await.unwrap_err();
    assert!(matches!(err, ServiceError::EmptyQuestion));
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = service.ask("anything?").await.unwrap_err();
    assert!(matches!(err, ServiceError::NoDocuments));
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert!(err.hint().is_some());
}

#[tokio::test]
async fn upload_errors_are_bad_requests() {
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp).await;

    for (name, bytes) in [
        ("slides.pptx", b"data".as_slice()),
        ("empty.txt", b"".as_slice()),
        ("blank.txt", b"  \n ".as_slice()),
        ("binary.txt", [0xc3u8, 0x28].as_slice()),
        ("fake.pdf", b"not a pdf".as_slice()),
        ("", b"text".as_slice()),
    ] {
        let err = service.ingest(name, bytes).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest, "{name}: {err}");
    }
    assert_eq!(service.store().size().await, 0);
}

#[tokio::test]
async fn reupload_replaces_previous_chunks() {
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp).await;
    service
        .ingest("a.txt", long_text("first version").as_bytes())
        .await
        .unwrap();
    let second = service.ingest("a.txt", b"Short replacement.").await.unwrap();
    assert_eq!(second.chunks, 1);
    assert_eq!(second.total_chunks_in_store, 1);

    let listing = service.files().await;
    assert_eq!(listing.total_files, 1);
    assert_eq!(listing.files[0].chunks, 1);
}

#[tokio::test]
async fn concurrent_uploads_of_one_file_keep_a_single_copy() {
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp).await;
    let text = long_text("the same upload");

    let (first, second) = tokio::join!(
        service.ingest("a.txt", text.as_bytes()),
        service.ingest("a.txt", text.as_bytes()),
    );
    let chunks = first.unwrap().chunks;
    assert_eq!(second.unwrap().chunks, chunks);
    assert!(chunks > 1);

    let listing = service.files().await;
    assert_eq!(listing.total_files, 1);
    assert_eq!(listing.files[0].chunks, chunks);
    assert_eq!(service.status().await.documents_in_db, chunks);
}

#[tokio::test]
async fn files_delete_and_clear() {
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp).await;
    let a = service
        .ingest("a.txt", long_text("alpha").as_bytes())
        .await
        .unwrap();
    let b = service
        .ingest("b.txt", long_text("beta").as_bytes())
        .await
        .unwrap();

    let listing = service.files().await;
    assert_eq!(listing.total_files, 2);
    assert_eq!(listing.total_chunks, a.chunks + b.chunks);
    assert_eq!(listing.files[0].filename, "a.txt");
    assert_eq!(listing.files[0].first_chunk_index, 0);

    let report = service.delete_file("a.txt").await.unwrap();
    assert_eq!(report.chunks_deleted, a.chunks);
    assert!(report.file_deleted_from_disk);
    assert_eq!(report.remaining_chunks, b.chunks);
    assert!(!tmp.path().join("uploads").join("a.txt").exists());

    let err = service.delete_file("a.txt").await.unwrap_err();
    assert!(matches!(err, ServiceError::FileNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let cleared = service.clear().await.unwrap();
    assert_eq!(cleared.files_deleted, 1);
    assert_eq!(service.status().await.documents_in_db, 0);
    assert!(matches!(
        service.ask("beta?").await,
        Err(ServiceError::NoDocuments)
    ));
}

#[tokio::test]
async fn exhausted_providers_are_unavailable() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(&tmp, vec![Arc::new(Unreachable)]).await;
    service
        .ingest("a.txt", long_text("alpha").as_bytes())
        .await
        .unwrap();

    let err = service.ask("alpha?").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    let message = err.public_message();
    assert!(message.contains("HTML error page"));
    assert!(!message.contains('<'));
}

#[tokio::test]
async fn state_survives_a_restart() {
    let tmp = TempDir::new().unwrap();
    {
        let service = service(&tmp).await;
        service
            .ingest("a.txt", long_text("persistence").as_bytes())
            .await
            .unwrap();
    }
    let service = service(&tmp).await;
    let listing = service.files().await;
    assert_eq!(listing.total_files, 1);
    let answer = service.ask("persistence?").await.unwrap();
    assert!(!answer.sources.is_empty());
}

#[tokio::test]
async fn best_source_is_the_matching_chunk() {
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp).await;
    service
        .ingest("facts.txt", b"The capital of France is Paris.")
        .await
        .unwrap();
    service
        .ingest("other.txt", b"Tokio is an async runtime.")
        .await
        .unwrap();

    // the stub embedder maps identical text to identical vectors
    let embedder = StubEmbedder::new(DIM);
    let query = embedder.embed("Tokio is an async runtime.").await.unwrap();
    let hits = service.store().search(&query, 1).await.unwrap();
    assert_eq!(hits[0].metadata["filename"], "other.txt");
    assert!(hits[0].distance.abs() < 1e-5);
}
