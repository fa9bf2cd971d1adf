use crate::completion::ProviderError;
use docqa_text_chunker::ChunkerError;
use docqa_vector_store::provider_http::truncate_chars;
use docqa_vector_store::VectorStoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

pub const MAX_PUBLIC_MESSAGE_CHARS: usize = 300;

/// How a failure should be reported to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Unavailable,
    Internal,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid filename: '{0}'")]
    InvalidFilename(String),

    #[error("Unsupported file type: '{extension}'. Supported types: .pdf, .txt, .text")]
    UnsupportedFileType { extension: String },

    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error("Text file is not valid UTF-8")]
    InvalidUtf8,

    #[error("No extractable text: {0}")]
    NoExtractableText(String),

    #[error("Error reading PDF: {0}")]
    InvalidDocument(String),

    #[error("Question cannot be empty")]
    EmptyQuestion,

    #[error("No documents uploaded yet. Please upload a document first.")]
    NoDocuments,

    #[error("No relevant documents found for this question")]
    NoRelevantDocuments,

    #[error("File '{0}' not found in database")]
    FileNotFound(String),

    #[error("All answer providers failed: {}", join_provider_errors(.0))]
    ProvidersExhausted(Vec<ProviderError>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Chunking(#[from] ChunkerError),

    #[error(transparent)]
    Store(#[from] VectorStoreError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn join_provider_errors(errors: &[ProviderError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ServiceError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFilename(_)
            | Self::UnsupportedFileType { .. }
            | Self::EmptyUpload
            | Self::InvalidUtf8
            | Self::NoExtractableText(_)
            | Self::InvalidDocument(_)
            | Self::EmptyQuestion
            | Self::NoDocuments
            | Self::Chunking(_) => ErrorKind::BadRequest,
            Self::FileNotFound(_) | Self::NoRelevantDocuments => ErrorKind::NotFound,
            Self::ProvidersExhausted(_) => ErrorKind::Unavailable,
            Self::Store(err) if err.is_invalid_input() => ErrorKind::BadRequest,
            Self::Store(
                VectorStoreError::Embedding(_) | VectorStoreError::EmbeddingUnavailable(_),
            ) => ErrorKind::Unavailable,
            Self::Store(_) | Self::Config(_) | Self::Join(_) => ErrorKind::Internal,
        }
    }

    /// Short follow-up advice for the caller, when there is one
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnsupportedFileType { .. } => Some("Upload a .pdf, .txt or .text file"),
            Self::NoDocuments => Some("Upload a document before asking questions"),
            Self::ProvidersExhausted(_) => Some(
                "Start Ollama and run 'ollama pull llama3.2', or configure another answer provider",
            ),
            Self::Store(VectorStoreError::EmbeddingUnavailable(_)) => {
                Some("The embedding provider is unreachable; retry shortly")
            }
            Self::FileNotFound(_) => Some("List uploaded files with GET /files"),
            _ => None,
        }
    }

    /// Message safe to show to a remote caller: no markup, bounded length
    #[must_use]
    pub fn public_message(&self) -> String {
        let flattened = strip_markup(&self.to_string())
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        truncate_chars(&flattened, MAX_PUBLIC_MESSAGE_CHARS - 1)
    }
}

fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}
