//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the full ingest-and-ask workflow by
//! composing an [`EmbeddingProvider`], a [`VectorStore`], a [`Chunker`] and
//! a [`Generator`].
//!
//! # Example
//!
//! ```rust,ignore
//! use llmrag::{CollectionId, Document, FakeGenerator, HashingEmbeddingProvider,
//!     InMemoryVectorStore, RagConfig, RagPipeline, UpsertMode};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::new(384)?))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .generator(Arc::new(FakeGenerator))
//!     .build()?;
//!
//! let id = CollectionId::new("report", "alice");
//! pipeline.ingest(&id, &document, UpsertMode::SkipIfPopulated).await?;
//! let response = pipeline.ask(&id, "What does 4.3 say?").await?;
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::assembler::AnswerAssembler;
use crate::chunking::{Chunker, ElementChunker};
use crate::config::RagConfig;
use crate::document::{
    Answer, AnswerResponse, CollectionId, CollectionInfo, Document, EmbeddedChunk, RetrievalResult,
};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::Generator;
use crate::retriever::Retriever;
use crate::vectorstore::{UpsertMode, UpsertOutcome, VectorStore};

/// What an [`ingest`](RagPipeline::ingest) call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// How the store handled the upsert.
    pub outcome: UpsertOutcome,
    /// Number of chunks produced. `0` when the collection was already populated.
    pub chunk_count: usize,
}

/// The RAG pipeline orchestrator.
///
/// Coordinates document ingestion (chunk → embed → store) and question
/// answering (retrieve → assemble). Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    retriever: Retriever,
    assembler: AnswerAssembler,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Return a reference to the retriever.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Ingest a document into a collection: chunk → embed → store.
    ///
    /// With [`UpsertMode::SkipIfPopulated`] a collection that already holds
    /// rows is left untouched and nothing is chunked or embedded.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ChunkingError`] if the document has invalid source
    /// ids or no text at all, and propagates embedding and store failures.
    pub async fn ingest(
        &self,
        collection: &CollectionId,
        document: &Document,
        mode: UpsertMode,
    ) -> Result<IngestReport> {
        if mode == UpsertMode::SkipIfPopulated {
            let rows = self.vector_store.row_count(collection).await?;
            if rows > 0 {
                info!(
                    %collection,
                    document.id = %document.id,
                    rows,
                    "collection already populated, skipping ingestion"
                );
                return Ok(IngestReport {
                    outcome: UpsertOutcome::AlreadyPopulated { rows },
                    chunk_count: 0,
                });
            }
        }

        // 1. Chunk the document
        let chunks = self.chunker.chunk(&document.elements).map_err(|e| {
            error!(document.id = %document.id, error = %e, "chunking failed during ingestion");
            e
        })?;
        if chunks.is_empty() {
            return Err(RagError::ChunkingError(format!(
                "document '{}' contains no text",
                document.id
            )));
        }

        // 2. Embed in batches
        let dimensions = self.embedding_provider.dimensions();
        let batch_size = self.config.ingest.embed_batch_size;
        let mut embedded = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
                error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
                e
            })?;
            if vectors.len() != batch.len() {
                return Err(self.embedding_error(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                if vector.len() != dimensions {
                    return Err(self.embedding_error(format!(
                        "expected dimension {dimensions}, got {}",
                        vector.len()
                    )));
                }
                embedded.push(EmbeddedChunk { chunk: chunk.clone(), vector });
            }
        }

        // 3. Upsert into the vector store
        let outcome = self.vector_store.upsert(collection, &embedded, mode).await.map_err(|e| {
            error!(
                %collection,
                document.id = %document.id,
                error = %e,
                "upsert failed during ingestion"
            );
            e
        })?;

        let chunk_count = embedded.len();
        info!(%collection, document.id = %document.id, chunk_count, ?outcome, "ingested document");
        Ok(IngestReport { outcome, chunk_count })
    }

    fn embedding_error(&self, message: String) -> RagError {
        RagError::EmbeddingError { provider: self.embedding_provider.name().to_string(), message }
    }

    /// Retrieve context for `question` from `collection`.
    pub async fn retrieve(
        &self,
        collection: &CollectionId,
        question: &str,
    ) -> Result<RetrievalResult> {
        self.retriever.retrieve(collection, question).await
    }

    /// Generate an answer from an existing retrieval.
    ///
    /// Use this to retry after a [`RagError::Generation`] or
    /// [`RagError::Timeout`] without searching again:
    ///
    /// ```rust,ignore
    /// let retrieval = pipeline.retrieve(&id, question).await?;
    /// let answer = match pipeline.answer(question, &retrieval).await {
    ///     Err(e) if e.is_retryable() => pipeline.answer(question, &retrieval).await?,
    ///     other => other?,
    /// };
    /// ```
    pub async fn answer(&self, question: &str, retrieval: &RetrievalResult) -> Result<Answer> {
        self.assembler.assemble(question, retrieval).await
    }

    /// Retrieve and answer in one call, timing the whole round trip. The
    /// response carries the chunks that were placed in the prompt.
    ///
    /// # Errors
    ///
    /// Propagates retrieval errors such as [`RagError::CollectionNotFound`]
    /// and generation errors from [`answer`](Self::answer).
    pub async fn ask(&self, collection: &CollectionId, question: &str) -> Result<AnswerResponse> {
        let started = Instant::now();
        let retrieval = self.retrieve(collection, question).await?;
        let answer = self.answer(question, &retrieval).await?;
        let elapsed = started.elapsed();

        info!(
            %collection,
            context_count = answer.context_chunks_used,
            elapsed_ms = elapsed.as_millis() as u64,
            "question answered"
        );
        Ok(AnswerResponse::new(answer, &retrieval, elapsed))
    }

    /// Statistics for every collection in the store.
    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        self.vector_store.list_collections().await
    }

    /// Statistics for one collection.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CollectionNotFound`] if the collection is absent.
    pub async fn collection_stats(&self, collection: &CollectionId) -> Result<CollectionInfo> {
        self.vector_store.collection_info(collection).await
    }

    /// Delete a collection. Returns whether it existed.
    pub async fn delete_collection(&self, collection: &CollectionId) -> Result<bool> {
        self.vector_store.delete_collection(collection).await.map_err(|e| {
            error!(%collection, error = %e, "failed to delete collection");
            e
        })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config` defaults to [`RagConfig::default()`] and `chunker` to an
/// [`ElementChunker`] over `config.chunking`; the embedding provider, vector
/// store and generator are required. Call
/// [`build()`](RagPipelineBuilder::build) to validate and produce the pipeline.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    generator: Option<Arc<dyn Generator>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Replace the default element chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the answer generator.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the [`RagPipeline`], validating the configuration and that all
    /// required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::ConfigError("generator is required".to_string()))?;
        let chunker: Arc<dyn Chunker> = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(ElementChunker::new(config.chunking.clone())?),
        };

        let retriever = Retriever::new(
            config.retrieval.clone(),
            embedding_provider.clone(),
            vector_store.clone(),
        )?;
        let assembler = AnswerAssembler::new(config.assembler.clone(), generator)?;

        Ok(RagPipeline { config, embedding_provider, vector_store, chunker, retriever, assembler })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SourceElement;
    use crate::embedding::HashingEmbeddingProvider;
    use crate::generation::{FakeGenerator, StaticGenerator};
    use crate::inmemory::InMemoryVectorStore;

    fn pipeline(config: RagConfig) -> RagPipeline {
        RagPipeline::builder()
            .config(config)
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(64).unwrap()))
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .generator(Arc::new(FakeGenerator))
            .build()
            .unwrap()
    }

    fn doc() -> Document {
        Document::new(
            "report",
            vec![
                SourceElement::new("Sea ice is declining.", "10.1_p1"),
                SourceElement::new("Glaciers are retreating.", "10.2_p1"),
            ],
        )
    }

    #[test]
    fn builder_requires_components() {
        let err = RagPipeline::builder().build().err().unwrap();
        assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("embedding_provider")));

        let err = RagPipeline::builder()
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(8).unwrap()))
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("generator")));
    }

    #[tokio::test]
    async fn ingest_batches_embeddings_and_stores_every_chunk() {
        let config = RagConfig::builder().max_chunk_chars(25).embed_batch_size(1).build().unwrap();
        let pipeline = pipeline(config);
        let id = CollectionId::new("report", "alice");

        let report = pipeline.ingest(&id, &doc(), UpsertMode::SkipIfPopulated).await.unwrap();
        assert_eq!(
            report,
            IngestReport { outcome: UpsertOutcome::Inserted { rows: 2 }, chunk_count: 2 }
        );
        assert_eq!(pipeline.collection_stats(&id).await.unwrap().dimensions, 64);
    }

    #[tokio::test]
    async fn empty_documents_are_rejected() {
        let pipeline = pipeline(RagConfig::default());
        let id = CollectionId::new("empty", "alice");
        let err = pipeline
            .ingest(&id, &Document::new("empty", Vec::new()), UpsertMode::Force)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ChunkingError(_)));
        assert!(pipeline.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn section_question_answers_from_that_section() {
        let pipeline = RagPipeline::builder()
            .config(RagConfig::builder().max_chunk_chars(25).build().unwrap())
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(64).unwrap()))
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .generator(Arc::new(StaticGenerator::new("Answer: It is declining.")))
            .build()
            .unwrap();
        let id = CollectionId::new("report", "alice");
        pipeline.ingest(&id, &doc(), UpsertMode::SkipIfPopulated).await.unwrap();

        let response = pipeline.ask(&id, "What does 10.1 say?").await.unwrap();
        assert_eq!(response.answer, "It is declining.");
        assert_eq!(response.source_ids, vec!["10.1_p1"]);
        assert_eq!(response.context_count, 1);
        assert_eq!(response.context.len(), 1);
        assert_eq!(response.context[0].chunk.text, "Sea ice is declining.");
        assert!(response.response_time >= 0.0);
    }

    #[tokio::test]
    async fn asking_a_missing_collection_fails() {
        let pipeline = pipeline(RagConfig::default());
        let err = pipeline.ask(&CollectionId::new("nope", "alice"), "q").await.unwrap_err();
        assert!(matches!(err, RagError::CollectionNotFound { .. }));
    }
}
