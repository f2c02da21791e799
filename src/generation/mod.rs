//! Text generation through a small local causal language model.
//!
//! The Ollama adapter issues raw (template-free) completions with greedy decoding: temperature
//! zero, `top_k = 1`, and a fixed seed. Context truncation uses a tiktoken encoding that matches
//! the generation model's tokenizer as closely as possible.

use crate::config::Config;
use anyhow::Error as TokenizerError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider was unreachable or the model is missing.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Tokenizer resources were unavailable.
    #[error("failed to initialize tokenizer '{encoding}': {source}")]
    Tokenizer {
        /// Encoding or model name we attempted to load.
        encoding: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Decoding request passed to the generation provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Fully assembled prompt.
    pub prompt: String,
    /// Upper bound on generated tokens.
    pub max_new_tokens: usize,
    /// Penalty applied to repeated tokens.
    pub repetition_penalty: f32,
    /// Sample from the distribution instead of decoding greedily.
    pub do_sample: bool,
}

/// Interface implemented by generation backends.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Return the text generated after the prompt.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError>;
}

/// Generation client backed by the Ollama `/api/generate` endpoint.
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

impl OllamaGenerationClient {
    /// Construct a client for the given runtime URL and model.
    pub fn new(base_url: String, model: String) -> Result<Self, GenerationClientError> {
        let http = Client::builder()
            .user_agent("prml-qa/generate")
            .build()
            .map_err(|error| GenerationClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let mut options = json!({
            "num_predict": request.max_new_tokens,
            "repeat_penalty": request.repetition_penalty,
        });
        if !request.do_sample {
            options["temperature"] = json!(0.0);
            options["top_k"] = json!(1);
            options["seed"] = json!(0);
        }

        let payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "raw": true,
            "stream": false,
            "options": options,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationClientError::ProviderUnavailable(format!(
                "model '{}' not found at {}",
                self.model,
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(GenerationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response)
    }
}

/// Build the generation client for the configured model.
pub fn get_generation_client(
    config: &Config,
) -> Result<Box<dyn GenerationClient + Send + Sync>, GenerationClientError> {
    tracing::info!(model = %config.generation_model, "Initializing generation client");
    Ok(Box::new(OllamaGenerationClient::new(
        config.ollama_url.clone(),
        config.generation_model.clone(),
    )?))
}

/// Truncates text to a token budget using a tiktoken encoding.
///
/// tiktoken has no Qwen vocabulary, so the default `gpt2` encoding (`r50k_base`) stands in for
/// the generation model's tokenizer. GPT-2's byte-level BPE splits prose and math at least as
/// finely as Qwen's larger vocabulary, so a prefix within the GPT-2 budget stays within the
/// model's budget too. The cut can land somewhat earlier than the model's own tokenizer would
/// place it.
pub struct ContextTruncator {
    encoding: CoreBPE,
    max_tokens: usize,
}

impl ContextTruncator {
    /// Load the encoding for `tokenizer` (model or encoding name) with a `max_tokens` budget.
    pub fn new(tokenizer: &str, max_tokens: usize) -> Result<Self, GenerationClientError> {
        let encoding = resolve_encoding(tokenizer).map_err(|source| {
            GenerationClientError::Tokenizer {
                encoding: tokenizer.to_string(),
                source,
            }
        })?;
        Ok(Self {
            encoding,
            max_tokens,
        })
    }

    /// Token budget enforced by [`Self::truncate`].
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Return the text unchanged when within budget, otherwise its leading `max_tokens` tokens.
    pub fn truncate(&self, text: &str) -> String {
        let tokens = self.encoding.encode_ordinary(text);
        if tokens.len() <= self.max_tokens {
            return text.to_string();
        }

        // A cut can split a multi-byte character; back off until the prefix decodes.
        let mut end = self.max_tokens;
        while end > 0 {
            if let Ok(decoded) = self.encoding.decode(tokens[..end].to_vec()) {
                return decoded;
            }
            end -= 1;
        }
        String::new()
    }
}

fn resolve_encoding(name: &str) -> Result<CoreBPE, TokenizerError> {
    let normalized = name.trim();
    if let Some(encoding) = encoding_from_name(normalized) {
        return encoding;
    }
    match get_bpe_from_model(normalized) {
        Ok(encoding) => Ok(encoding),
        Err(error) => {
            tracing::warn!(
                tokenizer = normalized,
                error = %error,
                "Unknown tokenizer; falling back to 'r50k_base'"
            );
            r50k_base()
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "Question: what is a prior?\nAnswer:".into(),
            max_new_tokens: 150,
            repetition_penalty: 2.0,
            do_sample: false,
        }
    }

    #[tokio::test]
    async fn ollama_client_sends_greedy_options() {
        let server = MockServer::start_async().await;
        let client =
            OllamaGenerationClient::new(server.base_url(), "qwen2.5:0.5b".into()).expect("client");

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate").json_body_partial(
                    r#"{
                        "model": "qwen2.5:0.5b",
                        "raw": true,
                        "stream": false,
                        "options": { "num_predict": 150, "temperature": 0.0, "top_k": 1 }
                    }"#,
                );
                then.status(200).json_body(json!({
                    "response": " A distribution over parameters.",
                    "done": true
                }));
            })
            .await;

        let text = client.generate(request()).await.expect("generation");
        mock.assert();
        assert_eq!(text, " A distribution over parameters.");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        let client =
            OllamaGenerationClient::new(server.base_url(), "qwen2.5:0.5b".into()).expect("client");

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client.generate(request()).await.expect_err("error response");
        assert!(
            matches!(error, GenerationClientError::GenerationFailed(ref message) if message.contains("500"))
        );
    }

    #[tokio::test]
    async fn ollama_client_reports_missing_model() {
        let server = MockServer::start_async().await;
        let client =
            OllamaGenerationClient::new(server.base_url(), "missing".into()).expect("client");

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(404).body("model not found");
            })
            .await;

        let error = client.generate(request()).await.expect_err("missing model");
        assert!(matches!(
            error,
            GenerationClientError::ProviderUnavailable(_)
        ));
    }

    #[test]
    fn truncator_keeps_short_text() {
        let truncator = ContextTruncator::new("gpt2", 1024).expect("tokenizer");
        let text = "The likelihood function expresses how probable the data are.";
        assert_eq!(truncator.truncate(text), text);
    }

    #[test]
    fn truncator_cuts_to_token_budget() {
        let truncator = ContextTruncator::new("gpt2", 8).expect("tokenizer");
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let truncated = truncator.truncate(text);

        assert_eq!(truncated, "one two three four five six seven eight");
        let encoding = r50k_base().expect("encoding");
        assert!(encoding.encode_ordinary(&truncated).len() <= 8);
    }

    #[test]
    fn default_tokenizer_budget_holds_for_math_text() {
        let config = Config::default();
        let truncator = ContextTruncator::new(
            &config.generation_tokenizer,
            config.generation_max_input_tokens,
        )
        .expect("tokenizer");
        let text = "p(t|x, w, β) = N(t|y(x, w), β⁻¹) ∑ θ λ μ σ ∫ ".repeat(200);

        let truncated = truncator.truncate(&text);
        assert!(text.starts_with(&truncated));
        assert!(truncated.len() < text.len());
        let encoding = r50k_base().expect("encoding");
        assert!(encoding.encode_ordinary(&truncated).len() <= config.generation_max_input_tokens);
    }

    #[test]
    fn unknown_tokenizer_falls_back() {
        let truncator = ContextTruncator::new("some-local-model", 4).expect("tokenizer");
        assert_eq!(truncator.max_tokens(), 4);
        assert!(!truncator.truncate("alpha beta gamma delta epsilon").is_empty());
    }
}
