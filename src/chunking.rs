//! Character-window text chunking with overlap.
//!
//! Splits extracted article text into bounded chunks, preferring natural
//! break points (paragraph, sentence, word) over hard character cuts, and
//! carrying the owning document's metadata onto every chunk.

use unicode_segmentation::UnicodeSegmentation;

use crate::extract::ArticleMetadata;
use crate::types::IngestError;

/// One bounded piece of a document, the unit of embedding and storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub metadata: ArticleMetadata,
}

/// Splits text into overlapping chunks of a fixed target size.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// Builds a chunker; overlap must be strictly smaller than the size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        if chunk_size == 0 {
            return Err(IngestError::Configuration("chunk_size must be > 0".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(IngestError::Configuration(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Splits `text` into chunks, attaching a copy of `metadata` to each.
    ///
    /// Empty or whitespace-only text yields no chunks. Sizes are measured in
    /// characters; cuts land preferentially on a paragraph break, then a
    /// sentence end, then a word boundary, before falling back to a hard cut
    /// at the window edge.
    pub fn split(&self, text: &str, metadata: Option<&ArticleMetadata>) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let metadata = metadata.cloned().unwrap_or_default();

        // Byte offset of every char boundary, plus the end of the text.
        let mut boundaries: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
        boundaries.push(text.len());
        let total_chars = boundaries.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0usize;
        loop {
            let window_end = (start + self.chunk_size).min(total_chars);
            let cut = if window_end < total_chars {
                let window_start = boundaries[start];
                let window = &text[window_start..boundaries[window_end]];
                // Break candidates inside the overlap region would cut off a
                // chunk made of nothing but the previous chunk's tail, so
                // only look past it.
                let skip = boundaries[start + self.chunk_overlap] - window_start;
                match best_break(&window[skip..]) {
                    Some(offset) => char_index_at(&boundaries, start, skip + offset),
                    None => window_end,
                }
            } else {
                window_end
            };

            let piece = &text[boundaries[start]..boundaries[cut]];
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(Chunk {
                    content: trimmed.to_string(),
                    metadata: metadata.clone(),
                });
            }

            if cut >= total_chars {
                break;
            }
            // Step back by the overlap, always making forward progress.
            start = cut.saturating_sub(self.chunk_overlap).max(start + 1);
        }
        chunks
    }
}

/// Picks the best break offset (in bytes, exclusive) inside a full window,
/// or `None` when only a hard cut at the window edge works.
fn best_break(window: &str) -> Option<usize> {
    if let Some(idx) = window.rfind("\n\n") {
        if idx > 0 {
            return Some(idx + 2);
        }
    }
    let sentence_end = ['.', '!', '?']
        .iter()
        .filter_map(|end| window.rfind(&format!("{end} ")))
        .max();
    if let Some(idx) = sentence_end {
        if idx > 0 {
            return Some(idx + 2);
        }
    }
    // Last word boundary that leaves a non-empty head.
    let mut last = None;
    for (idx, _word) in window.split_word_bound_indices() {
        if idx > 0 {
            last = Some(idx);
        }
    }
    last
}

/// Converts a byte offset inside the window starting at char `start` back to
/// an absolute char index.
fn char_index_at(boundaries: &[usize], start: usize, byte_offset: usize) -> usize {
    let absolute = boundaries[start] + byte_offset;
    match boundaries[start..].binary_search(&absolute) {
        Ok(found) => start + found,
        Err(insert) => start + insert,
    }
}
