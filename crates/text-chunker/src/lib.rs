//! # Docqa Text Chunker
//!
//! Splits extracted document text into overlapping, sentence-aligned chunks
//! sized for embedding and retrieval.
//!
//! ## Algorithm
//!
//! ```text
//! Trimmed text
//!     │
//!     ├──> Nominal window [start, start + chunk_size)
//!     │
//!     ├──> Boundary search (looking back from the window end)
//!     │    └─> '.', '!', '?' or '\n' within the lookback window
//!     │
//!     └──> Next window starts `overlap` characters before the previous end
//! ```
//!
//! All sizes are counted in characters, so multi-byte text never splits a
//! code point.
//!
//! ## Example
//!
//! ```rust
//! use docqa_text_chunker::{Chunker, ChunkerConfig};
//!
//! let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
//! let chunks = chunker.chunk("Rust is fast. Rust is safe.");
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].content, "Rust is fast. Rust is safe.");
//! ```

mod chunker;
mod config;
mod error;
mod types;

pub use chunker::{chunk_text, Chunker};
pub use config::ChunkerConfig;
pub use error::{ChunkerError, Result};
pub use types::TextChunk;
