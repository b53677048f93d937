//! Recursive character text splitter.
//!
//! Splits text by trying progressively smaller separators until every piece
//! fits the size limit, then packs neighbouring pieces back together with a
//! configurable overlap.

use std::collections::VecDeque;

use rag_core::{ChunkConfig, ChunkData, Chunker, DocumentKind, RagError, Result};

/// Recursive chunker that splits text by multiple separators.
///
/// With the default configuration the separators are tried in this order:
/// 1. Double newline (paragraph breaks)
/// 2. Single newline
/// 3. Sentence boundaries (". ")
/// 4. Word boundaries (space)
/// 5. Character (last resort)
pub struct RecursiveChunker {
    /// Function measuring text length.
    /// Counts characters if None.
    length_fn: Option<Box<dyn Fn(&str) -> usize + Send + Sync>>,
}

impl RecursiveChunker {
    /// Create a new recursive chunker measuring length in characters.
    pub fn new() -> Self {
        Self { length_fn: None }
    }

    /// Create a chunker with a custom length function.
    pub fn with_length_fn<F>(length_fn: F) -> Self
    where
        F: Fn(&str) -> usize + Send + Sync + 'static,
    {
        Self {
            length_fn: Some(Box::new(length_fn)),
        }
    }

    /// Measure text.
    fn length(&self, text: &str) -> usize {
        match &self.length_fn {
            Some(f) => f(text),
            None => text.chars().count(),
        }
    }

    /// Separators for the given document kind.
    ///
    /// Markdown is split on section headings before the configured separators.
    fn separators(&self, kind: DocumentKind, config: &ChunkConfig) -> Vec<String> {
        match kind {
            DocumentKind::Markdown => ["\n## ", "\n### "]
                .iter()
                .map(|s| s.to_string())
                .chain(config.separators.iter().cloned())
                .collect(),
            DocumentKind::Pdf | DocumentKind::PlainText => config.separators.clone(),
        }
    }

    /// Pick the first separator present in the text, and the finer ones after it.
    fn pick_separator<'s>(&self, text: &str, separators: &'s [String]) -> (&'s str, &'s [String]) {
        for (idx, separator) in separators.iter().enumerate() {
            if separator.is_empty() {
                return ("", &[]);
            }
            if text.contains(separator.as_str()) {
                return (separator.as_str(), &separators[idx + 1..]);
            }
        }

        let last = separators.last().map(String::as_str).unwrap_or("");
        (last, &[])
    }

    /// Split text by a separator.
    fn split_by_separator<'a>(&self, text: &'a str, separator: &str) -> Vec<&'a str> {
        if separator.is_empty() {
            return text
                .char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect();
        }

        text.split(separator).filter(|s| !s.is_empty()).collect()
    }

    /// Recursively split text into pieces no longer than the chunk size.
    fn split_recursive(&self, text: &str, separators: &[String], config: &ChunkConfig) -> Vec<String> {
        let (separator, finer) = self.pick_separator(text, separators);
        let pieces = self.split_by_separator(text, separator);

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in pieces {
            if self.length(piece) <= config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_pieces(&pending, separator, config));
                pending.clear();
            }

            if finer.is_empty() {
                chunks.extend(self.split_by_size(piece, config));
            } else {
                chunks.extend(self.split_recursive(piece, finer, config));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_pieces(&pending, separator, config));
        }

        chunks
    }

    /// Pack small pieces into chunks, carrying trailing pieces forward as overlap.
    fn merge_pieces(&self, pieces: &[&str], separator: &str, config: &ChunkConfig) -> Vec<String> {
        let separator_len = self.length(separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = self.length(piece);
            let joint = if current.is_empty() { 0 } else { separator_len };

            if total + len + joint > config.chunk_size && !current.is_empty() {
                if let Some(chunk) = join_trimmed(&current, separator) {
                    chunks.push(chunk);
                }

                // Drop leading pieces until what is left fits as overlap.
                while total > config.chunk_overlap
                    || (total > 0
                        && total + len + if current.is_empty() { 0 } else { separator_len }
                            > config.chunk_size)
                {
                    let joint = if current.len() > 1 { separator_len } else { 0 };
                    match current.pop_front() {
                        Some(first) => total = total.saturating_sub(self.length(first) + joint),
                        None => break,
                    }
                }
            }

            total += len + if current.is_empty() { 0 } else { separator_len };
            current.push_back(piece);
        }

        if let Some(chunk) = join_trimmed(&current, separator) {
            chunks.push(chunk);
        }

        chunks
    }

    /// Split text into fixed windows of characters (last resort).
    fn split_by_size(&self, text: &str, config: &ChunkConfig) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = config.chunk_size.saturating_sub(config.chunk_overlap).max(1);
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + config.chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            let trimmed = window.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

fn join_trimmed(pieces: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, content: &str, kind: DocumentKind, config: &ChunkConfig) -> Result<Vec<ChunkData>> {
        if config.chunk_size == 0 {
            return Err(RagError::chunking("chunk_size must be at least 1"));
        }

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let separators = self.separators(kind, config);
        let chunks = self
            .split_recursive(content, &separators, config)
            .into_iter()
            .map(|content| ChunkData {
                char_count: content.chars().count(),
                content,
            })
            .collect();

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_size,
            chunk_overlap,
            ..ChunkConfig::default()
        }
    }

    #[test]
    fn test_simple_chunk() {
        let chunker = RecursiveChunker::new();
        let text = "Hello world. This is a test.";
        let chunks = chunker.chunk(text, DocumentKind::PlainText, &config(100, 0)).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].char_count, text.len());
    }

    #[test]
    fn test_paragraph_split() {
        let chunker = RecursiveChunker::new();
        let text = "First paragraph with several words here.\n\nSecond paragraph also with words.\n\nThird paragraph too.";
        let chunks = chunker.chunk(text, DocumentKind::PlainText, &config(45, 0)).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, "First paragraph with several words here.");
        assert_eq!(chunks[2].content, "Third paragraph too.");
    }

    #[test]
    fn test_chunks_respect_size() {
        let chunker = RecursiveChunker::new();
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu ".repeat(20);
        let chunks = chunker.chunk(&text, DocumentKind::PlainText, &config(60, 15)).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.char_count <= 60, "chunk too long: {}", chunk.char_count);
            assert!(!chunk.content.trim().is_empty());
        }
    }

    #[test]
    fn test_overlap_carries_words_forward() {
        let chunker = RecursiveChunker::new();
        let text = "one two three four five six seven eight nine ten";
        let chunks = chunker.chunk(text, DocumentKind::PlainText, &config(14, 5)).unwrap();

        assert!(chunks.len() >= 2);
        let first_last_word = chunks[0].content.split(' ').last().unwrap();
        assert!(chunks[1].content.starts_with(first_last_word));
    }

    #[test]
    fn test_long_word_is_hard_split() {
        let chunker = RecursiveChunker::new();
        let text = "x".repeat(25);
        let mut cfg = config(10, 0);
        cfg.separators = vec![" ".to_string()];
        let chunks = chunker.chunk(&text, DocumentKind::PlainText, &cfg).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].content, "xxxxx");
    }

    #[test]
    fn test_empty_content() {
        let chunker = RecursiveChunker::new();
        let chunks = chunker.chunk("  \n\n ", DocumentKind::PlainText, &ChunkConfig::default()).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let chunker = RecursiveChunker::new();
        assert!(chunker.chunk("text", DocumentKind::PlainText, &config(0, 0)).is_err());
    }

    #[test]
    fn test_markdown_splits_on_headings() {
        let chunker = RecursiveChunker::new();
        let text = "# Manual\n## Power\nThe device operates at 5V.\n## Weight\nIt weighs 2kg.";
        let chunks = chunker.chunk(text, DocumentKind::Markdown, &config(40, 0)).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].content, "Power\nThe device operates at 5V.");
    }

    #[test]
    fn test_custom_length_fn() {
        let chunker = RecursiveChunker::with_length_fn(|s| s.split_whitespace().count());
        let text = "one two three four five six seven eight nine ten";
        let chunks = chunker.chunk(text, DocumentKind::PlainText, &config(5, 0)).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "one two three four five");
    }
}
