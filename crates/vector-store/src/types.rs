use serde::{Deserialize, Serialize};

/// Opaque per-record metadata. Ingestion fills `filename`, `chunk_index` and
/// `total_chunks`; the store only ever reads `filename` and `chunk_index`.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

pub const FILENAME_KEY: &str = "filename";
pub const CHUNK_INDEX_KEY: &str = "chunk_index";
pub const TOTAL_CHUNKS_KEY: &str = "total_chunks";

/// One stored chunk: its embedding, source text and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

impl VectorRecord {
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.metadata.get(FILENAME_KEY).and_then(|v| v.as_str())
    }

    #[must_use]
    pub fn chunk_index(&self) -> Option<u64> {
        self.metadata.get(CHUNK_INDEX_KEY).and_then(|v| v.as_u64())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    /// Squared L2 distance; only meaningful for ranking
    pub distance: f32,
    pub metadata: Metadata,
}

/// Per-file summary derived from record metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub chunks: usize,
    pub first_chunk_index: u64,
}

/// Build the metadata ingestion attaches to each chunk
#[must_use]
pub fn chunk_metadata(filename: &str, chunk_index: usize, total_chunks: usize) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(FILENAME_KEY.to_string(), filename.into());
    metadata.insert(CHUNK_INDEX_KEY.to_string(), chunk_index.into());
    metadata.insert(TOTAL_CHUNKS_KEY.to_string(), total_chunks.into());
    metadata
}
