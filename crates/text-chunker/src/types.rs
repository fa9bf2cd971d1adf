use serde::{Deserialize, Serialize};

/// A bounded, trimmed slice of a source document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextChunk {
    /// Position of this chunk among the emitted chunks (0-based, dense)
    pub index: usize,

    /// Start of the covered span, in characters of the trimmed input
    pub start: usize,

    /// End of the covered span (exclusive), in characters of the trimmed input
    pub end: usize,

    /// Span content with surrounding whitespace removed
    pub content: String,
}

impl TextChunk {
    /// Number of characters covered by the untrimmed span
    #[must_use]
    pub const fn span_len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Number of characters this chunk shares with `next`
    #[must_use]
    pub const fn overlap_with(&self, next: &Self) -> usize {
        self.end.saturating_sub(next.start)
    }
}
