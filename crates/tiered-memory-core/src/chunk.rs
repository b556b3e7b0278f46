//! Fixed-window overlap chunker.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters,
//! where consecutive chunks share `overlap` characters. Offsets are counted
//! in Unicode scalar values, so a window never splits a UTF-8 sequence.
//!
//! # Algorithm
//!
//! 1. Reject `overlap >= chunk_size` (the stride would not advance).
//! 2. `stride = chunk_size - overlap`.
//! 3. For `start = 0, stride, 2·stride, …` while `start < len`:
//!    emit `[start, min(start + chunk_size, len))`.
//! 4. Stop right after the window that reaches `len`.
//!
//! The number of chunks is `ceil((len - overlap) / stride)` for texts longer
//! than `chunk_size`, and exactly one for shorter non-empty texts.
//!
//! # Example
//!
//! ```rust
//! use tiered_memory_core::chunk::chunk_text;
//!
//! let text = "a".repeat(821);
//! let chunks = chunk_text("doc-123", &text, 150, 30).unwrap();
//! assert_eq!(chunks.len(), 7);
//! assert_eq!(chunks.last().unwrap().end_offset, 821);
//! ```

use crate::error::{MemoryError, Result};
use crate::models::{content_hash, Chunk};

/// Validate a chunking configuration and return its stride.
pub fn stride(chunk_size: usize, overlap: usize) -> Result<usize> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(MemoryError::InvalidChunkConfig {
            chunk_size,
            overlap,
        });
    }
    Ok(chunk_size - overlap)
}

/// Split `text` into overlapping fixed-size windows.
///
/// Chunk indices are contiguous from 0. Each chunk's `hash` is the SHA-256
/// of its text. Empty text yields no chunks.
///
/// # Errors
///
/// [`MemoryError::InvalidChunkConfig`] when `overlap >= chunk_size`; no
/// chunk is produced in that case.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>> {
    let stride = stride(chunk_size, overlap)?;

    // Byte offset of every char boundary, including the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = boundaries.len() - 1;

    let mut chunks = Vec::with_capacity(len.saturating_sub(overlap).div_ceil(stride).max(1));
    let mut start = 0usize;
    let mut index: i64 = 0;

    while start < len {
        let end = (start + chunk_size).min(len);
        let piece = &text[boundaries[start]..boundaries[end]];
        chunks.push(make_chunk(document_id, index, start, end, piece));
        if end == len {
            break;
        }
        index += 1;
        start += stride;
    }

    Ok(chunks)
}

fn make_chunk(document_id: &str, index: i64, start: usize, end: usize, text: &str) -> Chunk {
    Chunk {
        id: format!("{}:{}", document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        start_offset: start,
        end_offset: end,
        text: text.to_string(),
        hash: content_hash(text),
    }
}
