use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use prml_qa::{
    config::FailurePolicy,
    embedding::HashEmbeddingClient,
    extract::pages_from_text,
    generation::{ContextTruncator, GenerationClient, GenerationClientError, GenerationRequest},
    index::VectorStore,
    processing::{ChunkingOptions, FrontMatterFilter, build_store, chunk_pages},
    qa::{AnswerSettings, NO_RELEVANT_TEXT, QaService},
};

const DIMENSION: usize = 128;

/// Echoes the first words of the prompt context after an `Answer:` marker.
struct EchoGenerator {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl GenerationClient for EchoGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let context = request
            .prompt
            .split("Context:\n")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or_default()
            .to_string();
        Ok(format!("Some preamble Answer: Based on the context.\n{context}"))
    }
}

fn settings() -> AnswerSettings {
    AnswerSettings {
        top_k: 5,
        max_new_tokens: 150,
        repetition_penalty: 2.0,
        failure_policy: FailurePolicy::FailFast,
    }
}

fn book_pages() -> Vec<(u32, String)> {
    let filler = |topic: &str, count: usize| {
        (0..count)
            .map(|index| format!("{topic}{index}"))
            .collect::<Vec<_>>()
            .join(" ")
    };
    vec![
        (1, "Pattern Recognition and Machine Learning".into()),
        (2, "Copyright 2006 Springer. ISBN 0-387-31073-8".into()),
        (3, String::new()),
        (12, filler("regression", 470)),
        (13, format!("Bayes: p(w|t) = p(t|w)p(w) {}", "= ".repeat(85))),
        (14, filler("kernel", 120)),
    ]
}

async fn service_over(store: VectorStore) -> (QaService, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let service = QaService::with_components(
        store,
        Box::new(HashEmbeddingClient::new(DIMENSION)),
        Box::new(EchoGenerator {
            calls: calls.clone(),
        }),
        ContextTruncator::new("gpt2", 1024).expect("tokenizer"),
        settings(),
    );
    (service, calls)
}

#[tokio::test]
async fn book_pipeline_answers_from_retrieved_chunks() {
    let pages = pages_from_text(book_pages());
    assert_eq!(pages.len(), 5, "blank page is skipped");

    let chunks = chunk_pages(&pages, &ChunkingOptions::default()).expect("chunks");
    // Pages 1-12 overflow the word window, the formula page flushes on its own, and the last
    // page is emitted as residual.
    assert_eq!(chunks.len(), 4);
    assert_eq!((chunks[2].page_start, chunks[2].page_end), (13, 13));
    assert!(chunks[2].math_density > 80);

    let (clean, outcome) = FrontMatterFilter::default().apply(chunks);
    assert_eq!(outcome.removed, 1);
    assert_eq!(
        clean.iter().map(|chunk| chunk.chunk_id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(clean.iter().all(|chunk| chunk.page_end >= 10));
    assert!(clean.iter().all(|chunk| !chunk.text.to_lowercase().contains("isbn")));

    let embedder = HashEmbeddingClient::new(DIMENSION);
    let store = build_store(clean.clone(), &embedder, DIMENSION)
        .await
        .expect("store");

    let dir = tempfile::tempdir().expect("tempdir");
    store.save(dir.path()).expect("save");
    let loaded = VectorStore::load(dir.path()).expect("load");
    assert_eq!(loaded.chunks(), clean.as_slice());

    let (service, calls) = service_over(loaded).await;
    let target = &clean[0];
    let hits = service.retrieve(&target.text, 5).await.expect("retrieve");
    assert_eq!(hits.len(), clean.len().min(5));
    assert_eq!(hits[0].chunk.chunk_id, target.chunk_id);
    assert!((hits[0].score - 1.0).abs() < 1e-4);

    let answer = service.answer(&target.text).await.expect("answer");
    assert_eq!(calls.load(Ordering::SeqCst), hits.len());
    assert_eq!(
        answer
            .text
            .lines()
            .filter(|line| *line == "Based on the context.")
            .count(),
        1
    );
    assert!(answer.text.starts_with("Based on the context.\n"));
    assert!(!answer.text.contains("preamble"));
}

#[tokio::test]
async fn empty_corpus_never_invokes_generation() {
    let embedder = HashEmbeddingClient::new(DIMENSION);
    let store = build_store(Vec::new(), &embedder, DIMENSION)
        .await
        .expect("store");
    let (service, calls) = service_over(store).await;

    let answer = service.answer("What is a kernel?").await.expect("answer");
    assert_eq!(answer.text, NO_RELEVANT_TEXT);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
