use crate::config::ChunkerConfig;
use crate::error::Result;
use crate::types::TextChunk;

const SENTENCE_BOUNDARIES: [char; 4] = ['.', '!', '?', '\n'];

/// Main chunker interface for processing document text
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a new chunker, rejecting invalid configurations
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into overlapping chunks.
    ///
    /// Empty or whitespace-only input yields no chunks. Input no longer than
    /// one chunk yields a single chunk equal to the trimmed input.
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = trimmed.chars().collect();
        let len = chars.len();
        let chunk_size = self.config.chunk_size;
        let overlap = self.config.overlap;
        let lookback = self.config.effective_lookback();

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < len {
            let nominal_end = start + chunk_size;
            let end = if nominal_end < len {
                find_boundary(&chars, start, nominal_end, lookback).unwrap_or(nominal_end)
            } else {
                len
            };

            let span: String = chars[start..end].iter().collect();
            let content = span.trim();
            if !content.is_empty() {
                chunks.push(TextChunk {
                    index: chunks.len(),
                    start,
                    end,
                    content: content.to_string(),
                });
            }

            if end >= len {
                break;
            }
            start = end.saturating_sub(overlap).max(start + 1);
        }

        log::debug!(
            "Chunked {} chars into {} chunks (size={}, overlap={})",
            len,
            chunks.len(),
            chunk_size,
            overlap
        );
        chunks
    }

    /// Split `text` and return only the chunk contents
    #[must_use]
    pub fn chunk_contents(&self, text: &str) -> Vec<String> {
        self.chunk(text)
            .into_iter()
            .map(|chunk| chunk.content)
            .collect()
    }
}

/// Chunk `text` with the given size and overlap and the default lookback
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    let chunker = Chunker::new(ChunkerConfig::new(chunk_size, overlap))?;
    Ok(chunker.chunk_contents(text))
}

/// Scan backwards from `nominal_end` for a sentence boundary, staying strictly
/// after `start` and within `lookback` characters. Returns the exclusive end.
fn find_boundary(chars: &[char], start: usize, nominal_end: usize, lookback: usize) -> Option<usize> {
    let floor = nominal_end.saturating_sub(lookback).max(start);
    (floor + 1..=nominal_end)
        .rev()
        .find(|&i| SENTENCE_BOUNDARIES.contains(&chars[i]))
        .map(|i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig::new(size, overlap)).unwrap()
    }

    #[test]
    fn empty_and_blank_input_yield_nothing() {
        let chunker = chunker(100, 20);
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\t ").is_empty());
    }

    #[test]
    fn short_input_is_single_trimmed_chunk() {
        let chunker = chunker(100, 20);
        let chunks = chunker.chunk("  hello world.  \n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello world.");
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, "hello world.".len());
    }

    #[test]
    fn exact_size_input_is_single_chunk() {
        let chunker = chunker(10, 2);
        let chunks = chunker.chunk("abcdefghij");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "abcdefghij");
    }

    #[test]
    fn fixed_slices_without_boundaries() {
        let chunker = chunker(10, 3);
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunker.chunk(text);
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]
        );
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].overlap_with(&pair[1]), 3);
        }
    }

    #[test]
    fn prefers_sentence_boundary_within_lookback() {
        let chunker = chunker(20, 5);
        let text = "First sentence here. Second sentence follows after it.";
        let chunks = chunker.chunk(text);
        assert_eq!(chunks[0].content, "First sentence here.");
        assert_eq!(chunks[0].end, 20);
        assert_eq!(chunks[1].start, 15);
    }

    #[test]
    fn boundary_at_nominal_end_extends_by_one() {
        // The character right after the window is inspected too.
        let chunker = chunker(5, 1);
        let chunks = chunker.chunk("abcde.fghij");
        assert_eq!(chunks[0].content, "abcde.");
        assert_eq!(chunks[0].end, 6);
    }

    #[test]
    fn newline_counts_as_boundary() {
        let chunker = chunker(12, 2);
        let chunks = chunker.chunk("line one\nline two\nline three");
        assert_eq!(chunks[0].content, "line one");
        assert_eq!(chunks[0].end, 9);
    }

    #[test]
    fn always_makes_forward_progress() {
        let chunker = chunker(4, 3);
        let text = ".a.b.c.d.e.f.g.h";
        let chunks = chunker.chunk(text);
        assert!(!chunks.is_empty());
        for pair in chunks.windows(2) {
            assert!(pair[1].start > pair[0].start);
        }
        assert_eq!(chunks.last().unwrap().end, text.chars().count());
    }

    #[test]
    fn multibyte_text_is_split_on_characters() {
        let chunker = chunker(4, 1);
        let text = "ééééééééé";
        let chunks = chunker.chunk(text);
        assert_eq!(chunks[0].content, "éééé");
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 4));
    }

    #[test]
    fn indices_are_dense() {
        let chunker = chunker(10, 2);
        let chunks = chunker.chunk(&"word ".repeat(40));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn chunk_text_validates_parameters() {
        assert!(chunk_text("abc", 0, 0).is_err());
        assert!(chunk_text("abc", 10, 10).is_err());
        assert_eq!(chunk_text("abc", 10, 2).unwrap(), vec!["abc".to_string()]);
    }
}
