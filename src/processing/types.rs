//! Core data types and error definitions for the ingestion pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// One non-empty page of the source PDF after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-based page number in the source document.
    pub page: u32,
    /// Whitespace-collapsed page text.
    pub text: String,
    /// Count of mathematical symbol occurrences on the page.
    pub math_density: u64,
}

/// A bounded, overlapping span of book text used as the retrieval unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Sequential identifier assigned at creation; survives filtering unchanged.
    pub chunk_id: u64,
    /// Chunk text (a word window of the flushed buffer).
    pub text: String,
    /// First page contributing to the flushed buffer.
    pub page_start: u32,
    /// Last page contributing to the flushed buffer (inclusive).
    pub page_end: u32,
    /// Math density summed over the contributing pages.
    pub math_density: u64,
}

/// Errors produced while turning page records into chunks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Window size of zero words cannot make progress.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave a positive stride between windows.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({max_words})")]
    InvalidOverlap {
        /// Requested overlap in words.
        overlap: usize,
        /// Requested window size in words.
        max_words: usize,
    },
}

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// PDF extraction failed.
    #[error("Failed to extract pages: {0}")]
    Extract(#[from] crate::extract::ExtractError),
    /// Chunking step failed to segment the pages.
    #[error("Failed to chunk pages: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the chunks.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] crate::embedding::EmbeddingClientError),
    /// Vector store could not be written.
    #[error("Failed to build index: {0}")]
    Index(#[from] crate::index::IndexError),
    /// Embedding provider returned a different number of vectors than inputs.
    #[error("Embedding provider returned {actual} vectors for {expected} chunks")]
    EmbeddingCountMismatch {
        /// Number of chunks submitted.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
    /// Reading or writing a JSON artifact failed.
    #[error("Failed to access artifact {path}: {source}")]
    Artifact {
        /// Artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A JSON artifact could not be encoded or decoded.
    #[error("Malformed artifact {path}: {source}")]
    ArtifactFormat {
        /// Artifact path.
        path: PathBuf,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Counts reported after the front-matter filter ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Chunks dropped as front matter.
    pub removed: usize,
    /// Chunks kept for indexing.
    pub kept: usize,
}

/// Summary of a completed index build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutcome {
    /// Number of vectors written to the store.
    pub vectors: usize,
    /// Dimension of each vector.
    pub dimension: usize,
}
