//! Exact inner-product vector index and its on-disk vector store.
//!
//! The store directory holds two files written by a full rebuild:
//!
//! - `index.bin`: the [`FlatIndex`] (embedding model, dimension, vectors in insertion order).
//! - `metadata.bin`: the ordered [`ChunkRecord`] list; entry `i` describes vector `i`.
//!
//! Both are `bincode`-encoded. There is no incremental update path; a rebuild overwrites both.

use crate::processing::types::ChunkRecord;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the serialized vector index.
pub const INDEX_FILE: &str = "index.bin";
/// File name of the serialized chunk metadata.
pub const METADATA_FILE: &str = "metadata.bin";

/// Errors raised while building, persisting, or loading the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A vector did not match the index dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed at index creation.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Vector count and metadata length disagree.
    #[error("index holds {vectors} vectors but metadata lists {chunks} chunks")]
    MisalignedMetadata {
        /// Number of stored vectors.
        vectors: usize,
        /// Number of stored chunk records.
        chunks: usize,
    },
    /// The store was built with a different embedding model.
    #[error("index was built with embedding model '{stored}', but '{requested}' is configured")]
    ModelMismatch {
        /// Model recorded in the index.
        stored: String,
        /// Model configured for queries.
        requested: String,
    },
    /// Reading or writing a store file failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A store file could not be encoded or decoded.
    #[error("failed to (de)serialize {path}: {source}")]
    Codec {
        /// File path.
        path: PathBuf,
        /// Underlying bincode error.
        #[source]
        source: bincode::Error,
    },
}

/// Flat (exhaustive) inner-product index over equal-dimension vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    model: String,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    /// Create an empty index for vectors of `dimension` produced by `model`.
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
            vectors: Vec::new(),
        }
    }

    /// Embedding model the vectors were produced with.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Dimension shared by every vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Append vectors; positions continue from the current length.
    pub fn add(&mut self, vectors: Vec<Vec<f32>>) -> Result<(), IndexError> {
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        self.vectors.extend(vectors);
        Ok(())
    }

    /// Return up to `k` `(position, score)` pairs ordered by descending inner product.
    ///
    /// Ties keep the lower position first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (position, inner_product(vector, query)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Index plus positionally aligned chunk metadata.
#[derive(Debug, Clone)]
pub struct VectorStore {
    index: FlatIndex,
    chunks: Vec<ChunkRecord>,
}

impl VectorStore {
    /// Pair an index with its metadata, enforcing equal lengths.
    pub fn new(index: FlatIndex, chunks: Vec<ChunkRecord>) -> Result<Self, IndexError> {
        if index.len() != chunks.len() {
            return Err(IndexError::MisalignedMetadata {
                vectors: index.len(),
                chunks: chunks.len(),
            });
        }
        Ok(Self { index, chunks })
    }

    /// Underlying vector index.
    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    /// Chunk metadata in index order.
    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    /// Fail unless the store was built with `model` at `dimension`.
    pub fn ensure_compatible(&self, model: &str, dimension: usize) -> Result<(), IndexError> {
        if self.index.model() != model {
            return Err(IndexError::ModelMismatch {
                stored: self.index.model().to_string(),
                requested: model.to_string(),
            });
        }
        if self.index.dimension() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.index.dimension(),
                actual: dimension,
            });
        }
        Ok(())
    }

    /// Nearest chunks for a normalized query vector, most similar first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(&ChunkRecord, f32)>, IndexError> {
        Ok(self
            .index
            .search(query, k)?
            .into_iter()
            .map(|(position, score)| (&self.chunks[position], score))
            .collect())
    }

    /// Write both store files into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(dir).map_err(|source| IndexError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        write_bincode(&dir.join(INDEX_FILE), &self.index)?;
        write_bincode(&dir.join(METADATA_FILE), &self.chunks)?;
        tracing::info!(
            dir = %dir.display(),
            vectors = self.index.len(),
            dimension = self.index.dimension(),
            "Saved vector store"
        );
        Ok(())
    }

    /// Load both store files from `dir`.
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let index: FlatIndex = read_bincode(&dir.join(INDEX_FILE))?;
        let chunks: Vec<ChunkRecord> = read_bincode(&dir.join(METADATA_FILE))?;
        let store = Self::new(index, chunks)?;
        tracing::info!(
            dir = %dir.display(),
            vectors = store.index.len(),
            model = %store.index.model(),
            "Loaded vector store"
        );
        Ok(store)
    }
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<(), IndexError> {
    let io_error = |source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    bincode::serialize_into(&mut writer, value).map_err(|source| IndexError::Codec {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_error)
}

fn read_bincode<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, IndexError> {
    let file = File::open(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    bincode::deserialize_from(BufReader::new(file)).map_err(|source| IndexError::Codec {
        path: path.to_path_buf(),
        source,
    })
}
