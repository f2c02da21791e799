#![deny(missing_docs)]

//! Retrieval-augmented question answering over a single textbook PDF.

/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Word and PDF export of answers.
pub mod export;
/// PDF page extraction and math-density scoring.
pub mod extract;
/// Text generation client and context truncation.
pub mod generation;
/// Flat vector index and on-disk vector store.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Query metrics helpers.
pub mod metrics;
/// Ingestion pipeline utilities.
pub mod processing;
/// Retrieval and answer synthesis.
pub mod qa;
