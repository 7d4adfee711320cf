//! Fixed-size splitting of book text.
//!
//! Chunks are counted in characters (Unicode scalar values), never split a
//! character, do not overlap and ignore sentence boundaries. Concatenating
//! the chunks in order reproduces the input exactly.

use serde::{Deserialize, Serialize};

use crate::errors::{BookreelError, Result};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 4000;

/// A contiguous slice of book text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    index: usize,
    text: String,
}

impl Chunk {
    /// Creates a chunk with a 1-based index.
    #[must_use]
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Returns the 1-based position of the chunk in the book.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Returns the chunk text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the length in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Returns the number of whitespace-separated words.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Number of chunks `split_into_chunks` produces for `char_len` characters.
#[must_use]
pub const fn chunk_count(char_len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        0
    } else {
        char_len.div_ceil(chunk_size)
    }
}

/// Splits text into chunks of `chunk_size` characters; the last may be shorter.
///
/// Empty text yields no chunks.
///
/// # Errors
///
/// Returns [`BookreelError::InvalidChunkSize`] when `chunk_size` is zero.
pub fn split_into_chunks(text: &str, chunk_size: usize) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(BookreelError::InvalidChunkSize(chunk_size));
    }

    let starts: Vec<usize> = text
        .char_indices()
        .step_by(chunk_size)
        .map(|(offset, _)| offset)
        .collect();

    let chunks = starts
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(text.len());
            Chunk::new(n + 1, &text[start..end])
        })
        .collect();

    Ok(chunks)
}
