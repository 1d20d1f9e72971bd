//! # llmrag
//!
//! Retrieval-Augmented Generation core: paragraph-aware chunking, vector
//! retrieval with section routing, and grounded answer assembly.
//!
//! ## Overview
//!
//! - [`ElementChunker`] packs `(text, source_id)` elements into bounded
//!   chunks, keeping every source id.
//! - [`EmbeddingProvider`] maps text to vectors ([`HashingEmbeddingProvider`]
//!   offline, `OpenAIEmbeddingProvider` with the `openai` feature).
//! - [`VectorStore`] holds one isolated collection per
//!   `(document, user)` pair ([`InMemoryVectorStore`], [`FileVectorStore`]).
//! - [`Retriever`] routes questions naming a section to a filtered lookup,
//!   falling back to similarity search.
//! - [`AnswerAssembler`] builds the prompt, calls a [`Generator`] under a
//!   timeout and attributes the answer to the chunks it used.
//! - [`RagPipeline`] ties these together; [`RagContext`] builds one from
//!   [`Settings`] via the [`ComponentRegistry`].
//!
//! ## Features
//!
//! - `openai` — OpenAI-compatible embedding and completion clients.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use llmrag::{CollectionId, Document, RagContext, Settings, UpsertMode};
//!
//! let context = RagContext::from_settings(Settings::default()).await?;
//! let id = CollectionId::new("report", "alice");
//! let document = Document::from_plain_text("report", &text);
//! context.pipeline().ingest(&id, &document, UpsertMode::SkipIfPopulated).await?;
//!
//! let response = context.pipeline().ask(&id, "What does 4.3 conclude?").await?;
//! println!("{} {:?}", response.answer, response.source_ids);
//! context.close().await?;
//! ```

pub mod assembler;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filestore;
pub mod generation;
pub mod inmemory;
pub mod pipeline;
pub mod registry;
pub mod retriever;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

pub use assembler::{AnswerAssembler, INSUFFICIENT_CONTEXT, Prompt, extract_answer};
pub use chunking::{Chunker, ElementChunker};
pub use config::{
    AssemblerConfig, ChunkingConfig, ComponentSpec, DEFAULT_SECTION_PATTERN, GenerationParams,
    IngestConfig, RagConfig, RagConfigBuilder, RetrievalConfig, Settings,
};
pub use document::{
    Answer, AnswerResponse, Chunk, CollectionId, CollectionInfo, Document, EmbeddedChunk,
    RetrievalResult, RetrievalStrategy, ScoredChunk, SourceElement,
};
pub use embedding::{EmbeddingProvider, HashingEmbeddingProvider, l2_normalize};
pub use error::{ErrorKind, GenerationError, RagError, Result};
pub use filestore::FileVectorStore;
pub use generation::{FakeGenerator, Generator, StaticGenerator};
pub use inmemory::InMemoryVectorStore;
pub use pipeline::{IngestReport, RagPipeline, RagPipelineBuilder};
pub use registry::{ComponentRegistry, RagContext};
pub use retriever::{Retriever, SectionDetector};
pub use vectorstore::{SourceFilter, UpsertMode, UpsertOutcome, VectorStore, cosine_similarity};
