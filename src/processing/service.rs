//! Ingestion pipeline: extraction, chunking, front-matter removal, and index build.
//!
//! Each stage reads the previous stage's JSON artifact and writes its own, so stages can be rerun
//! independently and their output inspected by hand.

use crate::{
    config::Config,
    embedding::EmbeddingClient,
    extract::extract_pages,
    index::{FlatIndex, VectorStore},
    processing::{
        chunking::{ChunkingOptions, chunk_pages},
        front_matter::FrontMatterFilter,
        types::{ChunkRecord, FilterOutcome, IndexOutcome, PageRecord, ProcessingError},
    },
};
use serde::{Serialize, de::DeserializeOwned};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Summary of a full ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Non-empty pages extracted.
    pub pages: usize,
    /// Chunks produced before filtering.
    pub chunks: usize,
    /// Front-matter filter counts.
    pub filter: FilterOutcome,
    /// Index build counts.
    pub index: IndexOutcome,
}

/// Runs ingestion stages against the artifact layout named by a [`Config`].
pub struct ProcessingService<'a> {
    config: &'a Config,
}

impl<'a> ProcessingService<'a> {
    /// Bind the pipeline to a configuration.
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Extract pages from the configured PDF and write the pages artifact.
    pub fn extract(&self) -> Result<Vec<PageRecord>, ProcessingError> {
        let pages = extract_pages(&self.config.pdf_path)?;
        write_json(&self.config.pages_path(), &pages)?;
        tracing::info!(
            pages = pages.len(),
            output = %self.config.pages_path().display(),
            "Extraction complete"
        );
        Ok(pages)
    }

    /// Chunk the pages artifact and write the raw chunks artifact.
    pub fn chunk(&self) -> Result<Vec<ChunkRecord>, ProcessingError> {
        let pages: Vec<PageRecord> = read_json(&self.config.pages_path())?;
        let options = ChunkingOptions::from(self.config);
        let chunks = chunk_pages(&pages, &options)?;
        write_json(&self.config.raw_chunks_path(), &chunks)?;
        tracing::info!(
            pages = pages.len(),
            chunks = chunks.len(),
            max_words = options.max_words,
            overlap = options.overlap_words,
            output = %self.config.raw_chunks_path().display(),
            "Chunking complete"
        );
        Ok(chunks)
    }

    /// Drop front matter from the raw chunks and write the cleaned artifact.
    pub fn clean(&self) -> Result<FilterOutcome, ProcessingError> {
        let chunks: Vec<ChunkRecord> = read_json(&self.config.raw_chunks_path())?;
        let filter = FrontMatterFilter::from_config(self.config);
        let (kept, outcome) = filter.apply(chunks);
        write_json(&self.config.clean_chunks_path(), &kept)?;
        tracing::info!(
            removed = outcome.removed,
            kept = outcome.kept,
            output = %self.config.clean_chunks_path().display(),
            "Front matter removal complete"
        );
        Ok(outcome)
    }

    /// Embed the cleaned chunks and persist a fresh vector store.
    pub async fn build_index(
        &self,
        embedding_client: &(dyn EmbeddingClient + Send + Sync),
    ) -> Result<IndexOutcome, ProcessingError> {
        let chunks: Vec<ChunkRecord> = read_json(&self.config.clean_chunks_path())?;
        let store =
            build_store(chunks, embedding_client, self.config.embedding_dimension).await?;
        store.save(&self.config.vector_store_dir)?;

        Ok(IndexOutcome {
            vectors: store.index().len(),
            dimension: store.index().dimension(),
        })
    }

    /// Run every stage in order.
    pub async fn ingest(
        &self,
        embedding_client: &(dyn EmbeddingClient + Send + Sync),
    ) -> Result<IngestOutcome, ProcessingError> {
        let pages = self.extract()?.len();
        let chunks = self.chunk()?.len();
        let filter = self.clean()?;
        let index = self.build_index(embedding_client).await?;
        Ok(IngestOutcome {
            pages,
            chunks,
            filter,
            index,
        })
    }
}

/// Embed chunk texts and pair the vectors with their metadata, preserving order.
pub async fn build_store(
    chunks: Vec<ChunkRecord>,
    embedding_client: &(dyn EmbeddingClient + Send + Sync),
    dimension: usize,
) -> Result<VectorStore, ProcessingError> {
    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let vectors = if texts.is_empty() {
        Vec::new()
    } else {
        embedding_client.generate_embeddings(texts).await?
    };

    if vectors.len() != chunks.len() {
        return Err(ProcessingError::EmbeddingCountMismatch {
            expected: chunks.len(),
            actual: vectors.len(),
        });
    }

    let mut index = FlatIndex::new(embedding_client.model(), dimension);
    index.add(vectors)?;
    tracing::debug!(
        vectors = index.len(),
        dimension,
        model = %embedding_client.model(),
        "Built flat inner-product index"
    );
    Ok(VectorStore::new(index, chunks)?)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ProcessingError> {
    let io_error = |source| ProcessingError::Artifact {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| {
        ProcessingError::ArtifactFormat {
            path: path.to_path_buf(),
            source,
        }
    })?;
    writer.flush().map_err(io_error)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ProcessingError> {
    let file = File::open(path).map_err(|source| ProcessingError::Artifact {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| {
        ProcessingError::ArtifactFormat {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use crate::index::IndexError;

    fn config_in(dir: &Path) -> Config {
        Config {
            data_dir: dir.join("data"),
            vector_store_dir: dir.join("vectorstore"),
            embedding_dimension: 32,
            ..Config::default()
        }
    }

    fn words(prefix: &str, count: usize) -> String {
        (0..count)
            .map(|index| format!("{prefix}{index}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[tokio::test]
    async fn stages_write_artifacts_and_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());
        let pages = vec![
            PageRecord {
                page: 2,
                text: "Copyright Springer. All rights reserved.".into(),
                math_density: 0,
            },
            PageRecord {
                page: 12,
                text: words("intro", 500),
                math_density: 3,
            },
            PageRecord {
                page: 13,
                text: "p(x) = ∑ θ".into(),
                math_density: 90,
            },
        ];
        write_json(&config.pages_path(), &pages).expect("pages");

        let service = ProcessingService::new(&config);
        let chunks = service.chunk().expect("chunk");
        assert!(chunks.iter().any(|chunk| chunk.page_end == 12));
        assert!(config.raw_chunks_path().exists());

        let outcome = service.clean().expect("clean");
        assert_eq!(outcome.removed + outcome.kept, chunks.len());
        assert!(outcome.kept > 0);

        let client = HashEmbeddingClient::new(32);
        let index = service.build_index(&client).await.expect("index");
        assert_eq!(index.vectors, outcome.kept);
        assert_eq!(index.dimension, 32);

        let store = VectorStore::load(&config.vector_store_dir).expect("load");
        let cleaned: Vec<ChunkRecord> = read_json(&config.clean_chunks_path()).expect("clean");
        assert_eq!(store.chunks(), cleaned.as_slice());
    }

    #[tokio::test]
    async fn build_store_rejects_dimension_mismatch() {
        let client = HashEmbeddingClient::new(16);
        let chunks = vec![ChunkRecord {
            chunk_id: 0,
            text: "variational inference".into(),
            page_start: 400,
            page_end: 401,
            math_density: 2,
        }];

        let error = build_store(chunks, &client, 32).await.unwrap_err();
        assert!(matches!(
            error,
            ProcessingError::Index(IndexError::DimensionMismatch {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[tokio::test]
    async fn build_store_handles_empty_corpus() {
        let client = HashEmbeddingClient::new(16);
        let store = build_store(Vec::new(), &client, 16).await.expect("store");
        assert!(store.index().is_empty());
    }

    #[test]
    fn missing_artifact_is_reported_with_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());
        let error = ProcessingService::new(&config).chunk().unwrap_err();
        assert!(matches!(error, ProcessingError::Artifact { ref path, .. } if path.ends_with("pages.json")));
    }
}
