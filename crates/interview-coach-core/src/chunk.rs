//! Recursive, overlapping text splitter.
//!
//! Splits document text into windows of at most `chunk_size` characters,
//! with consecutive windows sharing up to `chunk_overlap` characters.
//! Break points are tried in order of preference: paragraph (`\n\n`),
//! line (`\n`), sentence (`. `), word (` `), and finally single
//! characters, so a hard cut only happens inside a run with no whitespace.
//!
//! The splitter works on byte spans of the input, so every produced chunk
//! is a verbatim substring and every non-whitespace character of the input
//! lands in at least one chunk.

use std::collections::VecDeque;

use anyhow::{ensure, Result};
use sha2::{Digest, Sha256};

use crate::models::{DocumentChunk, Metadata, META_CHUNK_ID, META_DOCUMENT_ID};

/// Target chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Characters shared between neighbouring chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Break points in order of preference. The empty separator means
/// "split into single characters".
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// A contiguous piece of the input that fits in one chunk on its own.
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    end: usize,
    chars: usize,
}

/// Character-budgeted splitter with overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl TextSplitter {
    /// Creates a splitter. The overlap must be strictly smaller than the
    /// chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        ensure!(chunk_size > 0, "chunk_size must be > 0");
        ensure!(
            chunk_overlap < chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap,
            chunk_size
        );
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Splits `text` into trimmed, non-empty chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_spans(text)
            .into_iter()
            .map(|(start, end)| text[start..end].to_string())
            .collect()
    }

    /// Byte ranges of each chunk within `text`, in document order.
    ///
    /// Ranges are trimmed of surrounding whitespace and never empty.
    /// Whitespace-only input yields no ranges.
    pub fn split_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let mut segments = Vec::new();
        self.segment(text, 0, text.len(), SEPARATORS, &mut segments);
        self.merge(text, &segments)
    }

    /// Cuts `text[start..end]` into segments no longer than `chunk_size`,
    /// using the first separator that occurs in the range and recursing
    /// with the finer ones for pieces that are still too long.
    fn segment(
        &self,
        text: &str,
        start: usize,
        end: usize,
        separators: &[&str],
        out: &mut Vec<Segment>,
    ) {
        let slice = &text[start..end];
        let chars = slice.chars().count();
        if chars <= self.chunk_size {
            if chars > 0 {
                out.push(Segment { start, end, chars });
            }
            return;
        }

        let (separator, finer) = match separators
            .iter()
            .position(|s| s.is_empty() || slice.contains(*s))
        {
            Some(i) => (separators[i], &separators[i + 1..]),
            None => ("", &[][..]),
        };

        if separator.is_empty() {
            for (offset, ch) in slice.char_indices() {
                let at = start + offset;
                out.push(Segment {
                    start: at,
                    end: at + ch.len_utf8(),
                    chars: 1,
                });
            }
            return;
        }

        // The separator stays attached to the piece before it, so the
        // pieces tile the range exactly.
        let mut piece_start = start;
        for piece in slice.split_inclusive(separator) {
            let piece_end = piece_start + piece.len();
            self.segment(text, piece_start, piece_end, finer, out);
            piece_start = piece_end;
        }
    }

    /// Greedily packs contiguous segments into windows, carrying the tail
    /// of each emitted window (at most `chunk_overlap` chars) into the next.
    fn merge(&self, text: &str, segments: &[Segment]) -> Vec<(usize, usize)> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<Segment> = VecDeque::new();
        let mut total = 0usize;

        for &seg in segments {
            if total + seg.chars > self.chunk_size && !window.is_empty() {
                emit_window(text, &window, &mut chunks);
                while total > self.chunk_overlap
                    || (total > 0 && total + seg.chars > self.chunk_size)
                {
                    match window.pop_front() {
                        Some(front) => total -= front.chars,
                        None => break,
                    }
                }
            }
            window.push_back(seg);
            total += seg.chars;
        }

        if !window.is_empty() {
            emit_window(text, &window, &mut chunks);
        }

        chunks
    }
}

fn emit_window(text: &str, window: &VecDeque<Segment>, chunks: &mut Vec<(usize, usize)>) {
    let (Some(first), Some(last)) = (window.front(), window.back()) else {
        return;
    };
    let raw = &text[first.start..last.end];
    let start = first.start + (raw.len() - raw.trim_start().len());
    let end = last.end - (raw.len() - raw.trim_end().len());
    if start >= end {
        return;
    }
    // A window whose only new content was whitespace trims down to
    // something the previous chunk already covers.
    if let Some(&(_, prev_end)) = chunks.last() {
        if end <= prev_end {
            return;
        }
    }
    chunks.push((start, end));
}

/// Splits `text` and wraps each piece as a [`DocumentChunk`] of
/// `document_id`, with contiguous indices starting at 0.
///
/// Every chunk carries the caller's metadata plus `document_id` and
/// `chunk_id`. Returns an empty vector for empty or whitespace-only text.
pub fn chunk_document(
    document_id: &str,
    text: &str,
    metadata: &Metadata,
    splitter: &TextSplitter,
) -> Vec<DocumentChunk> {
    splitter
        .split(text)
        .into_iter()
        .enumerate()
        .map(|(index, piece)| make_chunk(document_id, index, piece, metadata))
        .collect()
}

fn make_chunk(document_id: &str, index: usize, text: String, metadata: &Metadata) -> DocumentChunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let chunk_id = format!("{}_{}", document_id, index);
    let mut metadata = metadata.clone();
    metadata.insert(META_DOCUMENT_ID.to_string(), document_id.to_string());
    metadata.insert(META_CHUNK_ID.to_string(), chunk_id.clone());

    DocumentChunk {
        chunk_id,
        document_id: document_id.to_string(),
        chunk_index: index,
        text,
        hash,
        metadata,
    }
}
