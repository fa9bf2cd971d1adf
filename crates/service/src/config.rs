use crate::error::{Result, ServiceError};
use docqa_text_chunker::ChunkerConfig;
use docqa_vector_store::{
    local_model_dimension, openai_model_dimension, DEFAULT_LOCAL_MODEL, DEFAULT_OPENAI_BASE_URL,
    DEFAULT_OPENAI_MODEL,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_STUB_DIMENSION: usize = 384;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Environment variables read by [`ServiceConfig::apply_env`]
pub const ENV_DATA_DIR: &str = "DOCQA_DATA_DIR";
pub const ENV_EMBEDDING_MODE: &str = "DOCQA_EMBEDDING_MODE";
pub const ENV_EMBEDDING_MODEL: &str = "DOCQA_EMBEDDING_MODEL";
pub const ENV_BIND: &str = "DOCQA_BIND";

/// Complete service configuration. Every field has a default, so an empty
/// TOML file (or none at all) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub index_name: String,
    pub chunking: ChunkerConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub answer: AnswerConfig,
    pub retry: RetryConfig,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            index_name: "docqa_index".to_string(),
            chunking: ChunkerConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            answer: AnswerConfig::default(),
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    Stub,
    Local,
    #[serde(rename = "openai")]
    OpenAi,
}

impl EmbeddingMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "local" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAi),
            other => Err(ServiceError::config(format!(
                "Unsupported embedding mode '{other}' (expected 'stub', 'local' or 'openai')"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stub => "stub",
            Self::Local => "local",
            Self::OpenAi => "openai",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub mode: EmbeddingMode,
    pub model: Option<String>,
    /// Required for unknown OpenAI models; must agree with known models
    pub dimension: Option<usize>,
    pub base_url: Option<String>,
    pub api_key_env: String,
    pub cache_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::Local,
            model: None,
            dimension: None,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            cache_dir: None,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    #[must_use]
    pub fn resolved_model(&self) -> String {
        match (self.mode, &self.model) {
            (EmbeddingMode::Stub, _) => format!("stub-{}", self.resolved_stub_dimension()),
            (_, Some(model)) => model.clone(),
            (EmbeddingMode::Local, None) => DEFAULT_LOCAL_MODEL.to_string(),
            (EmbeddingMode::OpenAi, None) => DEFAULT_OPENAI_MODEL.to_string(),
        }
    }

    #[must_use]
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
    }

    fn resolved_stub_dimension(&self) -> usize {
        self.dimension.unwrap_or(DEFAULT_STUB_DIMENSION)
    }

    /// Vector dimension implied by mode, model and the explicit override
    pub fn resolved_dimension(&self) -> Result<usize> {
        let model = self.resolved_model();
        let known = match self.mode {
            EmbeddingMode::Stub => return Ok(self.resolved_stub_dimension()),
            EmbeddingMode::Local => Some(local_model_dimension(&model).ok_or_else(|| {
                ServiceError::config(format!("Unknown local embedding model '{model}'"))
            })?),
            EmbeddingMode::OpenAi => openai_model_dimension(&model),
        };
        match (known, self.dimension) {
            (Some(known), Some(explicit)) if known != explicit => Err(ServiceError::config(
                format!("embedding.dimension is {explicit} but model '{model}' produces {known}"),
            )),
            (Some(known), _) => Ok(known),
            (None, Some(explicit)) => Ok(explicit),
            (None, None) => Err(ServiceError::config(format!(
                "embedding.dimension must be set for model '{model}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "huggingface")]
    HuggingFace,
    #[serde(rename = "stub")]
    Stub,
}

impl ProviderKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::HuggingFace => "huggingface",
            Self::Stub => "stub",
        }
    }

    const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-3.5-turbo",
            Self::Ollama => "llama3.2",
            Self::HuggingFace => "HuggingFaceH4/zephyr-7b-beta",
            Self::Stub => "stub",
        }
    }

    const fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => DEFAULT_OPENAI_BASE_URL,
            Self::Ollama => "http://localhost:11434",
            Self::HuggingFace => "https://router.huggingface.co/models",
            Self::Stub => "",
        }
    }

    const fn default_api_key_env(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::HuggingFace => Some("HF_TOKEN"),
            Self::Ollama | Self::Stub => None,
        }
    }

    const fn default_timeout_secs(self) -> u64 {
        match self {
            Self::OpenAi => 60,
            Self::Ollama => 120,
            Self::HuggingFace => 30,
            Self::Stub => 1,
        }
    }
}

/// One entry of `[[answer.providers]]`; unset fields fall back to the
/// defaults of its `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    #[must_use]
    pub const fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            model: None,
            base_url: None,
            api_key_env: None,
            timeout_secs: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn resolved_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.kind.default_model().to_string())
    }

    #[must_use]
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.kind.default_base_url().to_string())
    }

    #[must_use]
    pub fn resolved_api_key_env(&self) -> Option<String> {
        self.api_key_env
            .clone()
            .or_else(|| self.kind.default_api_key_env().map(ToString::to_string))
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            self.timeout_secs
                .unwrap_or_else(|| self.kind.default_timeout_secs()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    pub providers: Vec<ProviderConfig>,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderConfig::new(ProviderKind::Ollama),
                ProviderConfig::new(ProviderKind::HuggingFace),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per embedding call, including the first
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub max_upload_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServiceConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ServiceError::config(format!("invalid TOML: {e}")))
    }

    /// Read a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw).map_err(|e| {
                ServiceError::config(format!("{}: {e}", path.display()))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("Config file {} not found; using defaults", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(ServiceError::config(format!(
                "failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    /// Apply `DOCQA_*` overrides from the process environment
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply `DOCQA_*` overrides through `lookup`; empty values are ignored
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(dir) = get(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(mode) = get(ENV_EMBEDDING_MODE) {
            self.embedding.mode = EmbeddingMode::parse(&mode)?;
        }
        if let Some(model) = get(ENV_EMBEDDING_MODEL) {
            self.embedding.model = Some(model);
        }
        if let Some(bind) = get(ENV_BIND) {
            self.http.bind = bind;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking
            .validate()
            .map_err(|e| ServiceError::config(e.to_string()))?;
        if self.retrieval.top_k == 0 {
            return Err(ServiceError::config("retrieval.top_k must be greater than zero"));
        }
        if self.index_name.trim().is_empty()
            || self.index_name.contains(['/', '\\'])
            || self.index_name.starts_with('.')
        {
            return Err(ServiceError::config(format!(
                "index_name '{}' must be a plain file stem",
                self.index_name
            )));
        }
        let dimension = self.embedding.resolved_dimension()?;
        if dimension == 0 {
            return Err(ServiceError::config("embedding.dimension must be greater than zero"));
        }
        if self.answer.providers.is_empty() {
            return Err(ServiceError::config(
                "answer.providers must list at least one provider",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ServiceError::config("retry.max_attempts must be at least 1"));
        }
        if self.http.max_upload_bytes == 0 {
            return Err(ServiceError::config("http.max_upload_bytes must be greater than zero"));
        }
        Ok(())
    }

    /// Base path of the persisted store (`<data_dir>/<index_name>.json`)
    #[must_use]
    pub fn index_base_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.json", self.index_name))
    }

    /// Where kept copies of uploaded files live
    #[must_use]
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}
