use crate::completion::{build_answer_provider, AnswerProvider, FallbackChain};
use crate::config::{EmbeddingMode, ServiceConfig};
use crate::error::{Result, ServiceError};
use crate::extract::{extract_text, DocumentKind};
use crate::retry::RetryPolicy;
use docqa_text_chunker::Chunker;
use docqa_vector_store::{
    chunk_metadata, EmbeddingProvider, FileInfo, LocalEmbedder, Metadata, OpenAiEmbedder,
    OpenAiEmbedderOptions, StubEmbedder, VectorStore,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub filename: String,
    pub chunks: usize,
    pub total_chunks_in_store: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    /// Excerpts the answer was conditioned on, best match first
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub documents_in_db: usize,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub answer_providers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    pub files: Vec<FileInfo>,
    pub total_files: usize,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub filename: String,
    pub chunks_deleted: usize,
    pub file_deleted_from_disk: bool,
    pub remaining_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    pub files_deleted: usize,
}

/// Ingestion and question answering over one [`VectorStore`].
///
/// ```text
/// ingest: bytes ─> extract ─> chunk ─> embed (retried) ─> store.insert
/// ask:    question ─> embed (retried) ─> store.search ─> FallbackChain
/// ```
pub struct RagService {
    config: ServiceConfig,
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    answerers: FallbackChain,
    chunker: Chunker,
    retry: RetryPolicy,
}

impl RagService {
    pub fn new(
        config: ServiceConfig,
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        answerers: Vec<Arc<dyn AnswerProvider>>,
    ) -> Result<Self> {
        if embedder.dimension() != store.dimension() {
            return Err(ServiceError::config(format!(
                "embedding model '{}' produces {} dimensions but the store holds {}",
                embedder.model_id(),
                embedder.dimension(),
                store.dimension()
            )));
        }
        if config.retrieval.top_k == 0 {
            return Err(ServiceError::config("retrieval.top_k must be greater than zero"));
        }
        let chunker = Chunker::new(config.chunking)?;
        let answerers = FallbackChain::new(answerers)?;
        let retry = RetryPolicy::from(&config.retry);
        Ok(Self {
            config,
            store,
            embedder,
            answerers,
            chunker,
            retry,
        })
    }

    /// Build every collaborator from configuration and open the store.
    pub async fn from_config(config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        let embedder = build_embedder(&config)?;
        let store = VectorStore::open(config.index_base_path(), embedder.dimension()).await?;
        let answerers = config
            .answer
            .providers
            .iter()
            .map(build_answer_provider)
            .collect::<Result<Vec<_>>>()?;
        log::info!(
            "Service ready: {} embeddings ({} dims), answer providers [{}]",
            embedder.model_id(),
            embedder.dimension(),
            answerers
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self::new(config, Arc::new(store), embedder, answerers)
    }

    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Extract, chunk, embed and index one uploaded document.
    ///
    /// Uploading a filename that is already indexed replaces its chunks.
    pub async fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<IngestReport> {
        let filename = sanitize_filename(filename)?;
        let kind = DocumentKind::from_filename(&filename)?;
        let text = extract_text(kind, bytes).await?;

        let chunks = self.chunker.chunk_contents(&text);
        if chunks.is_empty() {
            return Err(ServiceError::NoExtractableText(
                "No text could be extracted from the file".to_string(),
            ));
        }
        log::info!("Embedding {} chunks from '{filename}'", chunks.len());
        let embeddings = self.retry.embed_batch(self.embedder.as_ref(), &chunks).await?;

        let total = chunks.len();
        let metadata: Vec<Metadata> = (0..total)
            .map(|index| chunk_metadata(&filename, index, total))
            .collect();

        let replaced = self
            .store
            .replace_source(&filename, embeddings, chunks, Some(metadata))
            .await?;
        if replaced > 0 {
            log::info!("Replaced {replaced} existing chunks of '{filename}'");
        }
        self.keep_upload(&filename, bytes).await;

        Ok(IngestReport {
            filename,
            chunks: total,
            total_chunks_in_store: self.store.size().await,
        })
    }

    /// Answer `question` from the most similar stored chunks.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::EmptyQuestion);
        }
        if self.store.is_empty().await {
            return Err(ServiceError::NoDocuments);
        }

        let query = self.retry.embed(self.embedder.as_ref(), question).await?;
        let hits = self
            .store
            .search(&query, self.config.retrieval.top_k)
            .await?;
        if hits.is_empty() {
            return Err(ServiceError::NoRelevantDocuments);
        }

        let sources: Vec<String> = hits.into_iter().map(|hit| hit.text).collect();
        let answer = self.answerers.answer(question, &sources).await?;
        Ok(Answer { answer, sources })
    }

    pub async fn status(&self) -> ServiceStatus {
        ServiceStatus {
            documents_in_db: self.store.size().await,
            embedding_model: self.embedder.model_id().to_string(),
            embedding_dimension: self.embedder.dimension(),
            answer_providers: self.answerers.names(),
        }
    }

    pub async fn files(&self) -> FileListing {
        let files = self.store.file_info().await;
        FileListing {
            total_files: files.len(),
            total_chunks: self.store.size().await,
            files,
        }
    }

    /// Remove a document's chunks and its kept upload.
    pub async fn delete_file(&self, filename: &str) -> Result<DeleteReport> {
        let known = self
            .store
            .file_info()
            .await
            .iter()
            .any(|file| file.filename == filename);
        if !known {
            return Err(ServiceError::FileNotFound(filename.to_string()));
        }

        let chunks_deleted = self.store.delete_by_source(filename).await?;
        let file_deleted_from_disk = self.remove_upload(filename).await;
        Ok(DeleteReport {
            filename: filename.to_string(),
            chunks_deleted,
            file_deleted_from_disk,
            remaining_chunks: self.store.size().await,
        })
    }

    /// Empty the store and remove the kept upload of every indexed file.
    pub async fn clear(&self) -> Result<ClearReport> {
        let filenames: Vec<String> = self
            .store
            .file_info()
            .await
            .into_iter()
            .map(|file| file.filename)
            .collect();
        self.store.clear().await?;

        let mut files_deleted = 0;
        for filename in &filenames {
            if self.remove_upload(filename).await {
                files_deleted += 1;
            }
        }
        Ok(ClearReport { files_deleted })
    }

    fn upload_path(&self, filename: &str) -> Option<PathBuf> {
        sanitize_filename(filename)
            .ok()
            .map(|name| self.config.uploads_dir().join(name))
    }

    async fn keep_upload(&self, filename: &str, bytes: &[u8]) {
        let Some(path) = self.upload_path(filename) else {
            return;
        };
        let result = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, bytes).await
        }
        .await;
        if let Err(err) = result {
            log::warn!("Could not keep a copy of '{filename}' at {}: {err}", path.display());
        }
    }

    async fn remove_upload(&self, filename: &str) -> bool {
        let Some(path) = self.upload_path(filename) else {
            return false;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => {
                log::warn!("Could not delete file {}: {err}", path.display());
                false
            }
        }
    }
}

/// Final path component of an uploaded filename, rejecting names that
/// would escape the uploads directory.
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        return Err(ServiceError::InvalidFilename(raw.to_string()));
    }
    Ok(name.to_string())
}

fn build_embedder(config: &ServiceConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    let dimension = embedding.resolved_dimension()?;
    Ok(match embedding.mode {
        EmbeddingMode::Stub => Arc::new(StubEmbedder::new(dimension)),
        EmbeddingMode::Local => Arc::new(LocalEmbedder::new(
            &embedding.resolved_model(),
            embedding.cache_dir.clone(),
        )?),
        EmbeddingMode::OpenAi => {
            let api_key = std::env::var(&embedding.api_key_env)
                .ok()
                .filter(|key| !key.trim().is_empty());
            if api_key.is_none() {
                log::warn!(
                    "{} is not set; OpenAI embedding calls will be unauthenticated",
                    embedding.api_key_env
                );
            }
            Arc::new(OpenAiEmbedder::new(OpenAiEmbedderOptions {
                base_url: embedding.resolved_base_url(),
                model: embedding.resolved_model(),
                dimension,
                api_key,
                timeout: Duration::from_secs(embedding.timeout_secs),
            })?)
        }
    })
}
