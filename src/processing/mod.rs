//! Ingestion pipeline: page chunking, front-matter removal, and vector store construction.

pub mod chunking;
pub mod front_matter;
mod service;
pub mod types;

pub use chunking::{ChunkingOptions, chunk_pages};
pub use front_matter::FrontMatterFilter;
pub use service::{IngestOutcome, ProcessingService, build_store};
pub use types::{
    ChunkRecord, ChunkingError, FilterOutcome, IndexOutcome, PageRecord, ProcessingError,
};
