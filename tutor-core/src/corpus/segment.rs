use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Unit of retrievable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
}

impl Segment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl From<&str> for Segment {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Segment {
    fn from(text: String) -> Self {
        Self { text }
    }
}

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Page break used by text extracted from paged documents.
pub const PAGE_BREAK: char = '\u{0C}';

/// Recursive character splitter.
///
/// Text is split on the coarsest separator present (paragraphs, then lines,
/// then words, then characters); pieces are greedily merged back into chunks
/// of at most `chunk_size` characters, each chunk starting with up to
/// `chunk_overlap` characters carried over from the previous one. Pieces that
/// are still too long are split again with the next finer separator.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Chunks a whole document, treating form feeds as page boundaries.
    ///
    /// Chunks never span two pages.
    pub fn segment_document(&self, document: &str) -> Vec<Segment> {
        document
            .split(PAGE_BREAK)
            .flat_map(|page| self.split_text(page))
            .map(Segment::from)
            .collect()
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let (separator, finer) = match separators.get(position) {
            Some(sep) => (sep.as_str(), &separators[position + 1..]),
            None => ("", &separators[..0]),
        };

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|piece| !piece.is_empty())
                .map(String::from)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut fitting = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);
            let joined_len = |window: &VecDeque<&str>| {
                if window.is_empty() { 0 } else { separator_len }
            };
            if total + len + joined_len(&window) > self.chunk_size && !window.is_empty() {
                if let Some(chunk) = join_chunk(&window, separator) {
                    chunks.push(chunk);
                }
                // keep a tail of the window as overlap for the next chunk
                while total > self.chunk_overlap
                    || (total + len + joined_len(&window) > self.chunk_size && total > 0)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if window.is_empty() { 0 } else { separator_len };
                }
            }
            total += len + joined_len(&window);
            window.push_back(piece);
        }

        if let Some(chunk) = join_chunk(&window, separator) {
            chunks.push(chunk);
        }
        chunks
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(800, 50)
    }
}

fn join_chunk(window: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
