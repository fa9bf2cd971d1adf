use crate::error::{Result, VectorStoreError};
use crate::provider_http::{classify_status, describe_http_failure, StatusClass};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::spawn_blocking;

pub const DEFAULT_LOCAL_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Maps text to fixed-dimension vectors.
///
/// `dimension()` is fixed for the lifetime of the provider and must match the
/// store the vectors are written to.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    /// Stable identifier of the model behind this provider
    fn model_id(&self) -> &str;

    /// One vector per input, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| VectorStoreError::Embedding("Empty embedding result".to_string()))
    }
}

/// Check a provider response against the request: one vector per input,
/// each of the declared dimension.
pub fn validate_batch(
    model_id: &str,
    dimension: usize,
    expected: usize,
    vectors: &[Vec<f32>],
) -> Result<()> {
    if vectors.len() != expected {
        return Err(VectorStoreError::Embedding(format!(
            "{model_id} returned {} embeddings for {expected} inputs",
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(VectorStoreError::Embedding(format!(
            "{model_id} returned a {}-dimensional embedding, expected {dimension}",
            bad.len()
        )));
    }
    Ok(())
}

/// Deterministic offline embedder.
///
/// Each text seeds a SplitMix64 stream through FNV-1a; the result is a unit
/// vector, so equal texts always map to equal vectors and distinct texts land
/// far apart.
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    dimension: usize,
    model_id: String,
}

impl StubEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("stub-{dimension}"),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| stub_embed(text, self.dimension))
            .collect())
    }
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalModel {
    AllMiniLmL6V2,
    BgeSmallEnV15,
    BgeBaseEnV15,
}

impl LocalModel {
    fn resolve(name: &str) -> Option<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        let short = lowered
            .strip_prefix("sentence-transformers/")
            .or_else(|| lowered.strip_prefix("baai/"))
            .unwrap_or(&lowered);
        match short {
            "all-minilm-l6-v2" => Some(Self::AllMiniLmL6V2),
            "bge-small-en-v1.5" => Some(Self::BgeSmallEnV15),
            "bge-base-en-v1.5" => Some(Self::BgeBaseEnV15),
            _ => None,
        }
    }

    const fn id(self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            Self::BgeSmallEnV15 => "bge-small-en-v1.5",
            Self::BgeBaseEnV15 => "bge-base-en-v1.5",
        }
    }

    const fn dimension(self) -> usize {
        match self {
            Self::AllMiniLmL6V2 | Self::BgeSmallEnV15 => 384,
            Self::BgeBaseEnV15 => 768,
        }
    }

    fn fastembed_model(self) -> fastembed::EmbeddingModel {
        match self {
            Self::AllMiniLmL6V2 => fastembed::EmbeddingModel::AllMiniLML6V2,
            Self::BgeSmallEnV15 => fastembed::EmbeddingModel::BGESmallENV15,
            Self::BgeBaseEnV15 => fastembed::EmbeddingModel::BGEBaseENV15,
        }
    }
}

/// Dimension of a supported local model, if the name is known
#[must_use]
pub fn local_model_dimension(name: &str) -> Option<usize> {
    LocalModel::resolve(name).map(LocalModel::dimension)
}

/// Local sentence-embedding model run through `fastembed`.
///
/// The model is downloaded and loaded on the first embedding call, not at
/// construction; later calls reuse the same handle.
pub struct LocalEmbedder {
    model: LocalModel,
    cache_dir: Option<PathBuf>,
    handle: Arc<OnceCell<Arc<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self> {
        let model = LocalModel::resolve(model_name).ok_or_else(|| {
            VectorStoreError::Embedding(format!(
                "Unsupported local embedding model '{model_name}' (expected all-MiniLM-L6-v2, bge-small-en-v1.5 or bge-base-en-v1.5)"
            ))
        })?;
        Ok(Self {
            model,
            cache_dir,
            handle: Arc::new(OnceCell::new()),
        })
    }
}

fn load_local_model(
    model: LocalModel,
    cache_dir: Option<PathBuf>,
) -> Result<Arc<fastembed::TextEmbedding>> {
    log::info!("Loading local embedding model {}", model.id());
    let mut options =
        fastembed::InitOptions::new(model.fastembed_model()).with_show_download_progress(false);
    if let Some(dir) = cache_dir {
        options = options.with_cache_dir(dir);
    }
    let embedding = fastembed::TextEmbedding::try_new(options).map_err(|e| {
        VectorStoreError::Embedding(format!("Failed to load {}: {e}", model.id()))
    })?;
    Ok(Arc::new(embedding))
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn dimension(&self) -> usize {
        self.model.dimension()
    }

    fn model_id(&self) -> &str {
        self.model.id()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let handle = self.handle.clone();
        let model = self.model;
        let cache_dir = self.cache_dir.clone();
        let owned = texts.to_vec();

        let vectors = spawn_blocking(move || {
            let embedding = handle.get_or_try_init(|| load_local_model(model, cache_dir))?;
            embedding
                .embed(owned, None)
                .map_err(|e| VectorStoreError::Embedding(format!("{}: {e}", model.id())))
        })
        .await
        .map_err(|e| VectorStoreError::Embedding(format!("Join error: {e}")))??;

        validate_batch(self.model_id(), self.dimension(), texts.len(), &vectors)?;
        Ok(vectors)
    }
}

/// Dimension of a known OpenAI embedding model
#[must_use]
pub fn openai_model_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbedderOptions {
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for OpenAiEmbedderOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            dimension: 1536,
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Remote embeddings over the OpenAI `/embeddings` API
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    options: OpenAiEmbedderOptions,
}

impl OpenAiEmbedder {
    pub fn new(options: OpenAiEmbedderOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| VectorStoreError::Embedding(format!("HTTP client: {e}")))?;
        let endpoint = format!("{}/embeddings", options.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            options,
        })
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Vectors from an `/embeddings` response body, ordered by their `index`
pub fn parse_embeddings_response(body: &str) -> Result<Vec<Vec<f32>>> {
    let mut parsed: EmbeddingsResponse = serde_json::from_str(body).map_err(|e| {
        VectorStoreError::Embedding(format!("Malformed embeddings response: {e}"))
    })?;
    if parsed.data.iter().all(|item| item.index.is_some()) {
        parsed.data.sort_by_key(|item| item.index);
    }
    Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn dimension(&self) -> usize {
        self.options.dimension
    }

    fn model_id(&self) -> &str {
        &self.options.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
            "model": self.options.model,
            "input": texts,
        }));
        if let Some(key) = &self.options.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            VectorStoreError::EmbeddingUnavailable(format!("openai embeddings: {e}"))
        })?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response.text().await.map_err(|e| {
            VectorStoreError::EmbeddingUnavailable(format!("openai embeddings: {e}"))
        })?;

        if !(200..300).contains(&status) {
            let message = describe_http_failure("openai", status, content_type.as_deref(), &body);
            return Err(match classify_status(status) {
                StatusClass::RateLimited | StatusClass::Unavailable => {
                    VectorStoreError::EmbeddingUnavailable(message)
                }
                StatusClass::Unauthorized | StatusClass::Rejected => {
                    VectorStoreError::Embedding(message)
                }
            });
        }

        let vectors = parse_embeddings_response(&body)?;
        validate_batch(self.model_id(), self.dimension(), texts.len(), &vectors)?;
        Ok(vectors)
    }
}
