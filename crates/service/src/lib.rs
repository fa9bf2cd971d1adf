//! # Docqa Service
//!
//! Retrieval-augmented question answering over uploaded documents.
//!
//! ## Flow
//!
//! ```text
//! upload (pdf / txt)
//!     │
//!     ├──> extract ──> chunk ──> embed ──> VectorStore
//!     │
//! question
//!     │
//!     └──> embed ──> search top-k ──> prompt ──> FallbackChain
//!                                                 ├─> ollama
//!                                                 ├─> huggingface
//!                                                 └─> openai / stub
//! ```
//!
//! The vector store never calls providers and never retries; retries with
//! backoff and provider fallback both live here.

pub mod completion;
pub mod config;
mod error;
pub mod extract;
mod pipeline;
mod retry;

pub use completion::{
    AnswerProvider, FallbackChain, HuggingFace, Ollama, OpenAiChat, ProviderError,
    ProviderErrorKind, StubAnswerer,
};
pub use config::{EmbeddingMode, ProviderConfig, ProviderKind, ServiceConfig};
pub use error::{ErrorKind, Result, ServiceError, MAX_PUBLIC_MESSAGE_CHARS};
pub use extract::DocumentKind;
pub use pipeline::{
    sanitize_filename, Answer, ClearReport, DeleteReport, FileListing, IngestReport, RagService,
    ServiceStatus,
};
pub use retry::RetryPolicy;
