//! Question answering over the persisted vector store.
//!
//! [`QaService`] is the process-wide context: it owns the loaded store, the embedding and
//! generation clients, and the truncator. Construct it once at startup and pass it by reference.
//! A question is embedded, the top-k chunks are retrieved, and each chunk is answered on its own
//! (truncate, prompt, greedy decode, extract after `Answer:`). Chunk answers are joined and
//! deduplicated line by line.

mod prompt;

pub use prompt::{build_prompt, dedupe_lines, extract_answer};

use crate::{
    config::{Config, FailurePolicy},
    embedding::{EmbeddingClient, EmbeddingClientError, get_embedding_client},
    generation::{
        ContextTruncator, GenerationClient, GenerationClientError, GenerationRequest,
        get_generation_client,
    },
    index::{IndexError, VectorStore},
    metrics::{MetricsSnapshot, QueryMetrics},
    processing::types::ChunkRecord,
};
use thiserror::Error;

/// Returned instead of generating when retrieval finds nothing.
pub const NO_RELEVANT_TEXT: &str = "No relevant text found in the dataset.";

/// Errors raised while loading the service at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Vector store could not be loaded or does not match the embedding model and dimension.
    #[error("Failed to load vector store: {0}")]
    Store(#[from] IndexError),
    /// Embedding client could not be created.
    #[error("Failed to initialize embedding client: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Generation client or tokenizer could not be created.
    #[error("Failed to initialize generation: {0}")]
    Generation(#[from] GenerationClientError),
}

/// Errors emitted while retrieving chunks for a question.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Embedding provider failed to return vectors for the query text.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index search rejected the query vector.
    #[error("Index search failed: {0}")]
    Index(#[from] IndexError),
    /// Embedding provider returned no vectors.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
}

/// Errors emitted while answering a question.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// Retrieval failed.
    #[error(transparent)]
    Search(#[from] SearchError),
    /// Generation failed for a chunk under the fail-fast policy.
    #[error("Generation failed for chunk {chunk_id}: {source}")]
    Generation {
        /// Chunk whose answer failed.
        chunk_id: u64,
        /// Underlying generation error.
        #[source]
        source: GenerationClientError,
    },
    /// Every chunk failed under the best-effort policy.
    #[error("Generation failed for all {failed} retrieved chunks")]
    AllChunksFailed {
        /// Number of failed chunks.
        failed: usize,
    },
}

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    /// Chunk metadata and text.
    pub chunk: ChunkRecord,
    /// Inner product between query and chunk embeddings.
    pub score: f32,
}

/// Outcome of answering a single retrieved chunk.
#[derive(Debug)]
pub enum ChunkAnswer {
    /// Text extracted after the `Answer:` marker.
    Answered {
        /// Chunk the answer was generated from.
        chunk_id: u64,
        /// Extracted answer text (may be empty).
        text: String,
    },
    /// Generation failed for this chunk.
    Failed {
        /// Chunk the attempt was made for.
        chunk_id: u64,
        /// Generation error.
        error: GenerationClientError,
    },
}

/// Combined answer for a question.
#[derive(Debug)]
pub struct Answer {
    /// Joined, line-deduplicated answer text.
    pub text: String,
    /// Chunks the answer was generated from, most similar first.
    pub retrieved: Vec<RetrievedChunk>,
    /// Per-chunk outcomes in retrieval order.
    pub chunk_answers: Vec<ChunkAnswer>,
}

/// Decoding parameters shared by every chunk prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnswerSettings {
    /// Default number of chunks to retrieve.
    pub top_k: usize,
    /// Generated token budget per chunk.
    pub max_new_tokens: usize,
    /// Repetition penalty.
    pub repetition_penalty: f32,
    /// How chunk failures are aggregated.
    pub failure_policy: FailurePolicy,
}

impl From<&Config> for AnswerSettings {
    fn from(config: &Config) -> Self {
        Self {
            top_k: config.retrieval_top_k,
            max_new_tokens: config.generation_max_new_tokens,
            repetition_penalty: config.generation_repetition_penalty,
            failure_policy: config.answer_failure_policy,
        }
    }
}

/// Read-only context answering questions against the loaded store.
pub struct QaService {
    store: VectorStore,
    embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
    generation_client: Box<dyn GenerationClient + Send + Sync>,
    truncator: ContextTruncator,
    settings: AnswerSettings,
    metrics: QueryMetrics,
}

impl QaService {
    /// Load the store and models named by the configuration.
    ///
    /// Fails if the store files are missing or were built with another embedding model or
    /// dimension.
    pub fn new(config: &Config) -> Result<Self, StartupError> {
        let store = VectorStore::load(&config.vector_store_dir)?;
        let embedding_client = get_embedding_client(config)?;
        store.ensure_compatible(embedding_client.model(), config.embedding_dimension)?;
        let generation_client = get_generation_client(config)?;
        let truncator = ContextTruncator::new(
            &config.generation_tokenizer,
            config.generation_max_input_tokens,
        )?;

        Ok(Self::with_components(
            store,
            embedding_client,
            generation_client,
            truncator,
            AnswerSettings::from(config),
        ))
    }

    /// Assemble a service from already constructed parts.
    pub fn with_components(
        store: VectorStore,
        embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
        generation_client: Box<dyn GenerationClient + Send + Sync>,
        truncator: ContextTruncator,
        settings: AnswerSettings,
    ) -> Self {
        Self {
            store,
            embedding_client,
            generation_client,
            truncator,
            settings,
            metrics: QueryMetrics::new(),
        }
    }

    /// Default retrieval depth.
    pub fn top_k(&self) -> usize {
        self.settings.top_k
    }

    /// Counters accumulated since startup.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Return up to `top_k` chunks ordered by descending similarity to the question.
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![question.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(SearchError::EmptyEmbedding)?;

        let hits = self.store.search(&vector, top_k)?;
        tracing::debug!(
            top_k,
            chunk_ids = ?hits.iter().map(|(chunk, _)| chunk.chunk_id).collect::<Vec<_>>(),
            "Retrieved chunks"
        );

        Ok(hits
            .into_iter()
            .map(|(chunk, score)| RetrievedChunk {
                chunk: chunk.clone(),
                score,
            })
            .collect())
    }

    /// Generate one answer per chunk, in order.
    ///
    /// Failures are recorded rather than propagated; under the fail-fast policy the first failure
    /// ends the run and is the last element.
    pub async fn answer_chunks(
        &self,
        question: &str,
        retrieved: &[RetrievedChunk],
    ) -> Vec<ChunkAnswer> {
        let mut answers = Vec::with_capacity(retrieved.len());
        for hit in retrieved {
            let chunk_id = hit.chunk.chunk_id;
            let context = self.truncator.truncate(&hit.chunk.text);
            let request = GenerationRequest {
                prompt: build_prompt(&context, question),
                max_new_tokens: self.settings.max_new_tokens,
                repetition_penalty: self.settings.repetition_penalty,
                do_sample: false,
            };

            match self.generation_client.generate(request).await {
                Ok(generated) => answers.push(ChunkAnswer::Answered {
                    chunk_id,
                    text: extract_answer(&generated).to_string(),
                }),
                Err(error) => {
                    tracing::warn!(chunk_id, error = %error, "Chunk answer generation failed");
                    answers.push(ChunkAnswer::Failed { chunk_id, error });
                    if self.settings.failure_policy == FailurePolicy::FailFast {
                        break;
                    }
                }
            }
        }
        answers
    }

    /// Answer a question with the default retrieval depth.
    pub async fn answer(&self, question: &str) -> Result<Answer, AnswerError> {
        self.answer_with_top_k(question, self.settings.top_k).await
    }

    /// Answer a question using the `top_k` most similar chunks.
    pub async fn answer_with_top_k(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<Answer, AnswerError> {
        tracing::info!(top_k, "Answering question");
        let retrieved = self.retrieve(question, top_k).await?;
        if retrieved.is_empty() {
            self.metrics.record_question(0, 0);
            return Ok(Answer {
                text: NO_RELEVANT_TEXT.to_string(),
                retrieved,
                chunk_answers: Vec::new(),
            });
        }

        let mut chunk_answers = self.answer_chunks(question, &retrieved).await;
        let failed = chunk_answers
            .iter()
            .filter(|answer| matches!(answer, ChunkAnswer::Failed { .. }))
            .count();
        let answered = chunk_answers.len() - failed;
        self.metrics.record_question(answered as u64, failed as u64);

        if self.settings.failure_policy == FailurePolicy::FailFast {
            if let Some(ChunkAnswer::Failed { .. }) = chunk_answers.last() {
                if let Some(ChunkAnswer::Failed { chunk_id, error }) = chunk_answers.pop() {
                    return Err(AnswerError::Generation {
                        chunk_id,
                        source: error,
                    });
                }
            }
        }

        let texts: Vec<&str> = chunk_answers
            .iter()
            .filter_map(|answer| match answer {
                ChunkAnswer::Answered { text, .. } => Some(text.as_str()),
                ChunkAnswer::Failed { .. } => None,
            })
            .collect();
        if texts.is_empty() {
            return Err(AnswerError::AllChunksFailed { failed });
        }

        let text = dedupe_lines(&texts.join(" "));
        tracing::info!(answered, failed, "Question answered");
        Ok(Answer {
            text,
            retrieved,
            chunk_answers,
        })
    }
}
