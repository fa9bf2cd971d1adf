//! # Docqa Vector Store
//!
//! Durable vector storage with per-document deletion, built over an exact
//! append-only similarity index.
//!
//! ## Features
//!
//! - **Exact search** by squared L2 distance over `f32` vectors
//! - **Mutable membership**: delete every chunk of a source file; the index
//!   is rebuilt from the retained records
//! - **Crash-safe persistence**: binary index plus JSON snapshot, each
//!   written through a temp file and rename
//! - **Swappable embeddings**: stub, local `fastembed` and OpenAI providers
//!
//! ## Architecture
//!
//! ```text
//! VectorStore
//!     │
//!     ├──> records: Vec<VectorRecord>      (source of truth)
//!     │      └─> embedding, text, metadata
//!     │
//!     ├──> FlatIndex                       (derived, rebuildable)
//!     │      └─> Array2<f32>, one row per record
//!     │
//!     └──> Persistence
//!            ├─> <base>.index  (FLX1 binary)
//!            └─> <base>.json   (texts, metadata, embeddings)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use docqa_vector_store::{chunk_metadata, EmbeddingProvider, StubEmbedder, VectorStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let embedder = StubEmbedder::new(384);
//!     let store = VectorStore::open("data/docqa_index.json", embedder.dimension()).await?;
//!
//!     let texts = vec!["Rust has no garbage collector.".to_string()];
//!     let embeddings = embedder.embed_batch(&texts).await?;
//!     store
//!         .insert(embeddings, texts, Some(vec![chunk_metadata("notes.txt", 0, 1)]))
//!         .await?;
//!
//!     let query = embedder.embed("memory management").await?;
//!     for hit in store.search(&query, 3).await? {
//!         println!("{:.3}: {}", hit.distance, hit.text);
//!     }
//!
//!     store.delete_by_source("notes.txt").await?;
//!     Ok(())
//! }
//! ```

mod embeddings;
mod error;
mod flat_index;
pub mod provider_http;
mod snapshot;
mod store;
mod types;

pub use embeddings::{
    local_model_dimension, openai_model_dimension, parse_embeddings_response, validate_batch,
    EmbeddingProvider, LocalEmbedder, OpenAiEmbedder, OpenAiEmbedderOptions, StubEmbedder,
    DEFAULT_LOCAL_MODEL, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL,
};
pub use error::{Result, VectorStoreError};
pub use flat_index::{FlatIndex, Neighbor};
pub use snapshot::{SnapshotPaths, SNAPSHOT_SCHEMA_VERSION};
pub use store::VectorStore;
pub use types::{
    chunk_metadata, FileInfo, Metadata, SearchHit, VectorRecord, CHUNK_INDEX_KEY, FILENAME_KEY,
    TOTAL_CHUNKS_KEY,
};
