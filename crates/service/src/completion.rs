//! Answer synthesis: prompt construction, language-model providers and the
//! ordered fallback chain that tries them.

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use docqa_vector_store::provider_http::{
    classify_status, describe_http_failure, truncate_chars, StatusClass, MAX_DETAIL_CHARS,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant that answers questions based on the provided document context.
Use only the information from the context to answer questions. If the context doesn't contain
enough information to answer the question, say so clearly. Be concise and accurate.";

const TEMPERATURE: f32 = 0.7;
const MAX_ANSWER_TOKENS: u32 = 500;

/// Numbered excerpts separated by blank lines
#[must_use]
pub fn format_context(chunks: &[String]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[Document Excerpt {}]:\n{chunk}", i + 1))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The user turn: context, question and the closing instruction
#[must_use]
pub fn build_user_prompt(question: &str, chunks: &[String]) -> String {
    format!(
        "Context from documents:\n{}\n\nQuestion: {question}\n\nPlease provide an answer based on the context above.",
        format_context(chunks)
    )
}

/// Single-string prompt for completion-style endpoints
#[must_use]
pub fn build_prompt(question: &str, chunks: &[String]) -> String {
    format!("{SYSTEM_PROMPT}\n\n{}", build_user_prompt(question, chunks))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Unavailable,
    Unauthorized,
    RateLimited,
    BadResponse,
}

impl From<StatusClass> for ProviderErrorKind {
    fn from(class: StatusClass) -> Self {
        match class {
            StatusClass::Unauthorized => Self::Unauthorized,
            StatusClass::RateLimited => Self::RateLimited,
            StatusClass::Unavailable => Self::Unavailable,
            StatusClass::Rejected => Self::BadResponse,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{provider}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }
}

/// A language model that turns a question plus retrieved excerpts into an
/// answer.
#[async_trait]
pub trait AnswerProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn answer(
        &self,
        question: &str,
        context_chunks: &[String],
    ) -> std::result::Result<String, ProviderError>;
}

fn http_client(provider: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::config(format!("{provider}: failed to build HTTP client: {e}")))
}

/// Send a JSON request and decode a JSON response, mapping every failure to
/// a sanitized [`ProviderError`].
async fn send_json(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> std::result::Result<Value, ProviderError> {
    let response = request.send().await.map_err(|e| {
        ProviderError::new(
            provider,
            ProviderErrorKind::Unavailable,
            truncate_chars(&format!("request failed: {e}"), MAX_DETAIL_CHARS),
        )
    })?;
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let body = response.text().await.map_err(|e| {
        ProviderError::new(
            provider,
            ProviderErrorKind::Unavailable,
            truncate_chars(&format!("failed to read response: {e}"), MAX_DETAIL_CHARS),
        )
    })?;

    if !(200..300).contains(&status) {
        return Err(ProviderError::new(
            provider,
            classify_status(status).into(),
            describe_http_failure(provider, status, content_type.as_deref(), &body),
        ));
    }
    serde_json::from_str(&body).map_err(|_| {
        ProviderError::new(
            provider,
            ProviderErrorKind::BadResponse,
            format!("{provider} returned a response that is not JSON (status {status})"),
        )
    })
}

fn non_empty(provider: &str, text: Option<String>) -> std::result::Result<String, ProviderError> {
    match text.map(|t| t.trim().to_string()) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(ProviderError::new(
            provider,
            ProviderErrorKind::BadResponse,
            "response did not contain any generated text",
        )),
    }
}

fn read_api_key(env_name: Option<&str>) -> Option<String> {
    env_name
        .and_then(|name| std::env::var(name).ok())
        .filter(|key| !key.trim().is_empty())
}

/// OpenAI-compatible `/chat/completions`
pub struct OpenAiChat {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    api_key_env: Option<String>,
}

impl OpenAiChat {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client("openai", timeout)?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
            api_key_env: None,
        })
    }
}

/// `choices[0].message.content` of a chat completion
#[must_use]
pub fn parse_openai_chat(body: &Value) -> Option<String> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

#[async_trait]
impl AnswerProvider for OpenAiChat {
    fn name(&self) -> &str {
        "openai"
    }

    async fn answer(
        &self,
        question: &str,
        context_chunks: &[String],
    ) -> std::result::Result<String, ProviderError> {
        let Some(api_key) = &self.api_key else {
            let env_name = self.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
            return Err(ProviderError::new(
                self.name(),
                ProviderErrorKind::Unauthorized,
                format!("API key not found; set {env_name}"),
            ));
        };
        let request = self.client.post(&self.endpoint).bearer_auth(api_key).json(&json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_user_prompt(question, context_chunks)},
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_ANSWER_TOKENS,
        }));
        let body = send_json(self.name(), request).await?;
        non_empty(self.name(), parse_openai_chat(&body))
    }
}

/// Local Ollama server, `/api/generate`
pub struct Ollama {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl Ollama {
    pub fn new(base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client("ollama", timeout)?,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.into(),
        })
    }
}

#[must_use]
pub fn parse_ollama(body: &Value) -> Option<String> {
    body.get("response")
        .or_else(|| body.get("text"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

#[async_trait]
impl AnswerProvider for Ollama {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn answer(
        &self,
        question: &str,
        context_chunks: &[String],
    ) -> std::result::Result<String, ProviderError> {
        let request = self.client.post(&self.endpoint).json(&json!({
            "model": self.model,
            "prompt": build_prompt(question, context_chunks),
            "stream": false,
            "options": {
                "temperature": TEMPERATURE,
                "num_predict": MAX_ANSWER_TOKENS,
            },
        }));
        let body = send_json(self.name(), request).await?;
        non_empty(self.name(), parse_ollama(&body))
    }
}

/// Hugging Face router inference endpoint (`<base_url>/<model>`)
pub struct HuggingFace {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HuggingFace {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client("huggingface", timeout)?,
            endpoint: format!("{}/{model}", base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

/// Generated text from any of the shapes the inference router returns: a
/// list wrapping an object, an object with `generated_text`, `text` or
/// `response`, or a bare string.
#[must_use]
pub fn parse_huggingface(body: &Value) -> Option<String> {
    let body = match body {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match body {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => ["generated_text", "text", "response"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(ToString::to_string),
        _ => None,
    }
}

#[async_trait]
impl AnswerProvider for HuggingFace {
    fn name(&self) -> &str {
        "huggingface"
    }

    async fn answer(
        &self,
        question: &str,
        context_chunks: &[String],
    ) -> std::result::Result<String, ProviderError> {
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "inputs": build_prompt(question, context_chunks),
            "parameters": {
                "max_new_tokens": MAX_ANSWER_TOKENS,
                "temperature": TEMPERATURE,
                "return_full_text": false,
            },
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let body = send_json(self.name(), request).await?;
        non_empty(self.name(), parse_huggingface(&body))
    }
}

/// Offline answerer that quotes the best excerpt
#[derive(Debug, Clone, Default)]
pub struct StubAnswerer;

#[async_trait]
impl AnswerProvider for StubAnswerer {
    fn name(&self) -> &str {
        "stub"
    }

    async fn answer(
        &self,
        question: &str,
        context_chunks: &[String],
    ) -> std::result::Result<String, ProviderError> {
        let Some(first) = context_chunks.first() else {
            return Ok(format!("No context was available to answer: {question}"));
        };
        let excerpt = first.split_whitespace().collect::<Vec<_>>().join(" ");
        Ok(format!(
            "Based on the documents: {}",
            truncate_chars(&excerpt, MAX_DETAIL_CHARS)
        ))
    }
}

/// Build the provider described by one `[[answer.providers]]` entry
pub fn build_answer_provider(config: &ProviderConfig) -> Result<Arc<dyn AnswerProvider>> {
    let model = config.resolved_model();
    let base_url = config.resolved_base_url();
    let api_key_env = config.resolved_api_key_env();
    let api_key = read_api_key(api_key_env.as_deref());
    let timeout = config.timeout();

    Ok(match config.kind {
        ProviderKind::OpenAi => {
            let mut chat = OpenAiChat::new(&base_url, model, api_key, timeout)?;
            chat.api_key_env = api_key_env;
            Arc::new(chat)
        }
        ProviderKind::Ollama => Arc::new(Ollama::new(&base_url, model, timeout)?),
        ProviderKind::HuggingFace => {
            Arc::new(HuggingFace::new(&base_url, &model, api_key, timeout)?)
        }
        ProviderKind::Stub => Arc::new(StubAnswerer),
    })
}

/// Ordered providers; the first success wins.
#[derive(Clone)]
pub struct FallbackChain {
    providers: Vec<Arc<dyn AnswerProvider>>,
}

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn AnswerProvider>>) -> Result<Self> {
        if providers.is_empty() {
            return Err(ServiceError::config(
                "at least one answer provider is required",
            ));
        }
        Ok(Self { providers })
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub async fn answer(&self, question: &str, context_chunks: &[String]) -> Result<String> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.answer(question, context_chunks).await {
                Ok(answer) => {
                    log::info!("Answer generated by {}", provider.name());
                    return Ok(answer);
                }
                Err(err) => {
                    log::warn!("Answer provider failed, trying next: {err}");
                    failures.push(err);
                }
            }
        }
        Err(ServiceError::ProvidersExhausted(failures))
    }
}
