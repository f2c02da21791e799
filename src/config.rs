use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the question-answering pipeline.
///
/// Built once in `main` and handed by reference to every stage; nothing reads the environment
/// after startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Source textbook PDF.
    pub pdf_path: PathBuf,
    /// Root directory for the intermediate JSON artifacts.
    pub data_dir: PathBuf,
    /// Directory holding the persisted index and chunk metadata.
    pub vector_store_dir: PathBuf,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Number of texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: String,
    /// Causal language model used to synthesize answers.
    pub generation_model: String,
    /// Tokenizer encoding used to enforce the generation context budget. The `gpt2` default
    /// splits at least as finely as the Qwen tokenizer, so it errs towards shorter prompts.
    pub generation_tokenizer: String,
    /// Maximum number of tokens of chunk text placed into a prompt.
    pub generation_max_input_tokens: usize,
    /// Maximum number of tokens decoded per chunk.
    pub generation_max_new_tokens: usize,
    /// Repetition penalty applied during decoding.
    pub generation_repetition_penalty: f32,
    /// Word window size and word-count flush threshold.
    pub chunk_max_words: usize,
    /// Words shared by consecutive windows of one flush.
    pub chunk_overlap_words: usize,
    /// Accumulated math density above which the buffer is flushed.
    pub chunk_math_threshold: u64,
    /// Whether the residual buffer is flushed when input ends.
    pub chunk_flush_residual: bool,
    /// Chunks whose last page is below this page number are front matter.
    pub front_matter_min_page: u32,
    /// Default number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// How per-chunk generation failures are aggregated.
    pub answer_failure_policy: FailurePolicy,
    /// Log file override; `None` writes to `logs/prml-qa.log`.
    pub log_file: Option<PathBuf>,
}

/// Supported embedding backends for the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic byte-hash embedder, useful offline and in tests.
    Hash,
}

/// Aggregation policy for per-chunk answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the whole answer on the first chunk failure.
    FailFast,
    /// Combine whatever chunks succeeded.
    BestEffort,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pdf_path: PathBuf::from("data/book.pdf"),
            data_dir: PathBuf::from("data"),
            vector_store_dir: PathBuf::from("data/vectorstore"),
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_model: "all-minilm".to_string(),
            embedding_dimension: 384,
            embedding_batch_size: 32,
            ollama_url: "http://127.0.0.1:11434".to_string(),
            generation_model: "qwen2.5:0.5b".to_string(),
            generation_tokenizer: "gpt2".to_string(),
            generation_max_input_tokens: 1024,
            generation_max_new_tokens: 150,
            generation_repetition_penalty: 2.0,
            chunk_max_words: 450,
            chunk_overlap_words: 80,
            chunk_math_threshold: 80,
            chunk_flush_residual: true,
            front_matter_min_page: 10,
            retrieval_top_k: 5,
            answer_failure_policy: FailurePolicy::FailFast,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the defaults.
    ///
    /// A `.env` file in the working directory is honored when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            pdf_path: load_env_optional("PRML_PDF_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.pdf_path),
            data_dir: load_env_optional("PRML_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            vector_store_dir: load_env_optional("VECTOR_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.vector_store_dir),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value.parse().map_err(|()| {
                        ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string())
                    })
                })
                .transpose()?
                .unwrap_or(defaults.embedding_provider),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_env("EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            embedding_batch_size: parse_env("EMBEDDING_BATCH_SIZE")?
                .unwrap_or(defaults.embedding_batch_size),
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            generation_model: load_env_optional("GENERATION_MODEL")
                .unwrap_or(defaults.generation_model),
            generation_tokenizer: load_env_optional("GENERATION_TOKENIZER")
                .unwrap_or(defaults.generation_tokenizer),
            generation_max_input_tokens: parse_env("GENERATION_MAX_INPUT_TOKENS")?
                .unwrap_or(defaults.generation_max_input_tokens),
            generation_max_new_tokens: parse_env("GENERATION_MAX_NEW_TOKENS")?
                .unwrap_or(defaults.generation_max_new_tokens),
            generation_repetition_penalty: parse_env("GENERATION_REPETITION_PENALTY")?
                .unwrap_or(defaults.generation_repetition_penalty),
            chunk_max_words: parse_env("CHUNK_MAX_WORDS")?.unwrap_or(defaults.chunk_max_words),
            chunk_overlap_words: parse_env("CHUNK_OVERLAP_WORDS")?
                .unwrap_or(defaults.chunk_overlap_words),
            chunk_math_threshold: parse_env("CHUNK_MATH_THRESHOLD")?
                .unwrap_or(defaults.chunk_math_threshold),
            chunk_flush_residual: parse_env("CHUNK_FLUSH_RESIDUAL")?
                .unwrap_or(defaults.chunk_flush_residual),
            front_matter_min_page: parse_env("FRONT_MATTER_MIN_PAGE")?
                .unwrap_or(defaults.front_matter_min_page),
            retrieval_top_k: parse_env("RETRIEVAL_TOP_K")?.unwrap_or(defaults.retrieval_top_k),
            answer_failure_policy: load_env_optional("ANSWER_FAILURE_POLICY")
                .map(|value| {
                    value.parse().map_err(|()| {
                        ConfigError::InvalidValue("ANSWER_FAILURE_POLICY".to_string())
                    })
                })
                .transpose()?
                .unwrap_or(defaults.answer_failure_policy),
            log_file: load_env_optional("PRML_QA_LOG_FILE").map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_max_words == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_MAX_WORDS".into()));
        }
        if self.chunk_overlap_words >= self.chunk_max_words {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP_WORDS".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_BATCH_SIZE".into()));
        }
        if self.retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }
        Ok(())
    }

    /// Path of the extracted pages artifact.
    pub fn pages_path(&self) -> PathBuf {
        self.data_dir.join("parsed").join("pages.json")
    }

    /// Path of the raw chunks artifact.
    pub fn raw_chunks_path(&self) -> PathBuf {
        self.data_dir.join("chunks").join("chunks.json")
    }

    /// Path of the front-matter-filtered chunks artifact.
    pub fn clean_chunks_path(&self) -> PathBuf {
        self.data_dir.join("chunks").join("chunks_clean.json")
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail-fast" | "fail_fast" => Ok(Self::FailFast),
            "best-effort" | "best_effort" => Ok(Self::BestEffort),
            _ => Err(()),
        }
    }
}
