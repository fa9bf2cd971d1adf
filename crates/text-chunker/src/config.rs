use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};

/// Default maximum chunk size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks in characters
pub const DEFAULT_OVERLAP: usize = 200;

/// Default upper bound for the sentence-boundary lookback
pub const DEFAULT_BOUNDARY_LOOKBACK: usize = 200;

/// Configuration for text chunking behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Nominal chunk size in characters
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    pub overlap: usize,

    /// How far back from the nominal end a sentence boundary is searched for
    pub boundary_lookback: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            boundary_lookback: DEFAULT_BOUNDARY_LOOKBACK,
        }
    }
}

impl ChunkerConfig {
    /// Create a config with the given size and overlap and the default lookback
    #[must_use]
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ChunkerError::invalid_config("chunk_size must be > 0"));
        }

        if self.overlap >= self.chunk_size {
            return Err(ChunkerError::invalid_config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }

        Ok(())
    }

    /// Lookback actually used when searching for a boundary.
    ///
    /// Never reaches into the region that the next chunk will re-read, which is
    /// what keeps every chunk start strictly increasing.
    #[must_use]
    pub fn effective_lookback(&self) -> usize {
        self.boundary_lookback
            .min(self.chunk_size.saturating_sub(self.overlap))
    }
}
