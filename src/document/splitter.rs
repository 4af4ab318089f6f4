use std::{collections::VecDeque, path::PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Document;
use crate::config::SplitterConfig;

const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// A slice of a document ready for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source: PathBuf,
    pub page: Option<u32>,
    /// Offset of the chunk in its document, in chars.
    pub start_index: Option<usize>,
}

/// Splits on paragraphs, then lines, then words, then chars, merging the
/// pieces back into windows of at most `chunk_size` chars with up to
/// `chunk_overlap` chars carried over between neighbours.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        if self.chunk_size == 0 {
            return vec![];
        }
        self.split_recursive(text, &self.separators)
    }

    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            let mut index = 0usize;
            let mut previous_len = 0usize;
            for text in self.split_text(&doc.text) {
                let from = (index + previous_len).saturating_sub(self.chunk_overlap);
                let start_index = find_from(&doc.text, &text, from);
                if let Some(found) = start_index {
                    index = found;
                }
                previous_len = char_len(&text);
                chunks.push(Chunk {
                    id: uuid::Uuid::new_v4().to_string(),
                    text,
                    source: doc.source.clone(),
                    page: doc.page,
                    start_index,
                });
            }
        }
        debug!(documents = documents.len(), chunks = chunks.len(), "split documents");
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep.as_str();
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut final_chunks = Vec::new();
        let mut good: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                final_chunks.extend(self.merge_splits(&good));
                good.clear();
            }
            if remaining.is_empty() {
                final_chunks.push(piece.to_string());
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !good.is_empty() {
            final_chunks.extend(self.merge_splits(&good));
        }
        final_chunks
    }

    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let len = char_len(piece);
            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    warn!(total, chunk_size = self.chunk_size, "created a chunk longer than the configured size");
                }
                if !current.is_empty() {
                    if let Some(doc) = join_trimmed(&current) {
                        docs.push(doc);
                    }
                    while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                        match current.pop_front() {
                            Some(first) => total -= char_len(first),
                            None => break,
                        }
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }
        if let Some(doc) = join_trimmed(&current) {
            docs.push(doc);
        }
        docs
    }
}

/// Splits `text` before every occurrence of `separator`, so each piece after
/// the first starts with it. Empty pieces are dropped.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0usize;
    for (idx, _) in text.match_indices(separator) {
        pieces.push(&text[start..idx]);
        start = idx;
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join_trimmed(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Char offset of `needle` in `haystack`, searching from char offset `from`.
fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let byte_from = haystack
        .char_indices()
        .nth(from)
        .map(|(b, _)| b)
        .unwrap_or(haystack.len());
    haystack[byte_from..]
        .find(needle)
        .map(|b| char_len(&haystack[..byte_from + b]))
}
