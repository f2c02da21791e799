//! Math-aware chunking of extracted pages.
//!
//! Pages are appended to a running buffer (text, page numbers, math density). The buffer is
//! flushed as soon as its accumulated math density exceeds the threshold or its word count
//! exceeds the window size, so formula-heavy regions end up in smaller chunks. A flush splits the
//! buffered text into overlapping word windows; every window inherits the page range and math
//! density of the whole buffer.

use super::types::{ChunkRecord, ChunkingError, PageRecord};
use crate::config::Config;

/// Tunables for the chunker. Defaults reproduce the reference constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingOptions {
    /// Window size in words, also the word-count flush threshold.
    pub max_words: usize,
    /// Words shared by consecutive windows.
    pub overlap_words: usize,
    /// Math density above which the buffer is flushed.
    pub math_threshold: u64,
    /// Emit the residual buffer at end of input instead of dropping it.
    pub flush_residual: bool,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_words: 450,
            overlap_words: 80,
            math_threshold: 80,
            flush_residual: true,
        }
    }
}

impl From<&Config> for ChunkingOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_words: config.chunk_max_words,
            overlap_words: config.chunk_overlap_words,
            math_threshold: config.chunk_math_threshold,
            flush_residual: config.chunk_flush_residual,
        }
    }
}

impl ChunkingOptions {
    fn validate(&self) -> Result<(), ChunkingError> {
        if self.max_words == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if self.overlap_words >= self.max_words {
            return Err(ChunkingError::InvalidOverlap {
                overlap: self.overlap_words,
                max_words: self.max_words,
            });
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.max_words - self.overlap_words
    }
}

#[derive(Default)]
struct PageBuffer {
    text: String,
    pages: Vec<u32>,
    math_density: u64,
}

impl PageBuffer {
    fn push(&mut self, page: &PageRecord) {
        self.text.push(' ');
        self.text.push_str(&page.text);
        self.pages.push(page.page);
        self.math_density += page.math_density;
    }

    fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Convert page records into overlapping chunk records.
///
/// Chunk ids start at zero and increase strictly across the whole run. With
/// `flush_residual = false` any trailing buffer that never crossed a threshold is discarded.
pub fn chunk_pages(
    pages: &[PageRecord],
    options: &ChunkingOptions,
) -> Result<Vec<ChunkRecord>, ChunkingError> {
    options.validate()?;

    let mut chunks = Vec::new();
    let mut next_id = 0_u64;
    let mut buffer = PageBuffer::default();

    for page in pages {
        buffer.push(page);
        if buffer.math_density > options.math_threshold || buffer.word_count() > options.max_words
        {
            tracing::trace!(
                pages = ?buffer.pages,
                math_density = buffer.math_density,
                "Flushing chunk buffer"
            );
            flush(&mut buffer, options, &mut next_id, &mut chunks);
        }
    }

    if !buffer.is_empty() {
        if options.flush_residual {
            flush(&mut buffer, options, &mut next_id, &mut chunks);
        } else {
            tracing::debug!(
                pages = ?buffer.pages,
                "Dropping residual buffer below flush thresholds"
            );
        }
    }

    Ok(chunks)
}

fn flush(
    buffer: &mut PageBuffer,
    options: &ChunkingOptions,
    next_id: &mut u64,
    chunks: &mut Vec<ChunkRecord>,
) {
    let buffer = std::mem::take(buffer);
    let (Some(&page_start), Some(&page_end)) = (buffer.pages.first(), buffer.pages.last()) else {
        return;
    };

    for text in split_into_windows(&buffer.text, options.max_words, options.stride()) {
        chunks.push(ChunkRecord {
            chunk_id: *next_id,
            text,
            page_start,
            page_end,
            math_density: buffer.math_density,
        });
        *next_id += 1;
    }
}

/// Split text into word windows of `max_words`, advancing `stride` words each time.
///
/// The final window may be shorter than `max_words`. Empty text yields no windows.
pub(crate) fn split_into_windows(text: &str, max_words: usize, stride: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut windows = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + max_words).min(words.len());
        windows.push(words[start..end].join(" "));
        start += stride;
    }

    windows
}
