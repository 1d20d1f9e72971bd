//! Vector store trait for storing and searching embedded chunks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{CollectionId, CollectionInfo, EmbeddedChunk, ScoredChunk};
use crate::error::{RagError, Result};

/// Whether an upsert may replace existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertMode {
    /// Skip the write if the collection already holds rows.
    #[default]
    SkipIfPopulated,
    /// Replace every row of the collection.
    Force,
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// Rows were written into a new or empty collection.
    Inserted {
        /// Number of rows written.
        rows: usize,
    },
    /// A forced re-ingest replaced the collection's rows.
    Replaced {
        /// Number of rows now stored.
        rows: usize,
    },
    /// The collection was already populated; nothing was written.
    AlreadyPopulated {
        /// Number of rows already stored.
        rows: usize,
    },
}

impl UpsertOutcome {
    /// Number of rows in the collection after the call.
    pub fn rows(&self) -> usize {
        match *self {
            UpsertOutcome::Inserted { rows }
            | UpsertOutcome::Replaced { rows }
            | UpsertOutcome::AlreadyPopulated { rows } => rows,
        }
    }
}

/// A predicate over stored source ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceFilter {
    /// The source id equals the value.
    Exact(String),
    /// The source id equals the section number or continues it past a
    /// non-digit boundary: `10.1` matches `10.1`, `10.1.2` and `10.1_p3`,
    /// but not `10.12`.
    SectionPrefix(String),
}

impl SourceFilter {
    /// Whether a single source id satisfies the filter.
    pub fn matches(&self, source_id: &str) -> bool {
        match self {
            SourceFilter::Exact(value) => source_id == value,
            SourceFilter::SectionPrefix(prefix) => match source_id.strip_prefix(prefix.as_str()) {
                Some(rest) => !rest.starts_with(|c: char| c.is_ascii_digit()),
                None => false,
            },
        }
    }

    /// Whether any of a chunk's source ids satisfies the filter.
    pub fn matches_any(&self, source_ids: &[String]) -> bool {
        source_ids.iter().any(|id| self.matches(id))
    }
}

/// A storage backend for embedded chunks, partitioned into collections.
///
/// A collection is created by its first upsert and fixes its embedding
/// dimension at that point. Collections never share rows and are deleted as a
/// unit.
///
/// # Example
///
/// ```rust,ignore
/// use llmrag::{CollectionId, InMemoryVectorStore, UpsertMode, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// let id = CollectionId::new("report", "alice");
/// store.upsert(&id, &embedded, UpsertMode::SkipIfPopulated).await?;
/// let hits = store.similarity_search(&id, &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Add rows to a collection, creating it if needed.
    ///
    /// With [`UpsertMode::SkipIfPopulated`], a collection that already holds
    /// rows is left untouched and [`UpsertOutcome::AlreadyPopulated`] is returned.
    async fn upsert(
        &self,
        collection: &CollectionId,
        chunks: &[EmbeddedChunk],
        mode: UpsertMode,
    ) -> Result<UpsertOutcome>;

    /// Return the `top_k` rows most similar to `query`, best first.
    ///
    /// Fails with [`RagError::CollectionNotFound`] if the collection is absent.
    async fn similarity_search(
        &self,
        collection: &CollectionId,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Return up to `top_k` rows whose source ids satisfy `filter`, in
    /// insertion order, each scored `1.0`.
    async fn filtered_search(
        &self,
        collection: &CollectionId,
        filter: &SourceFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Number of rows in a collection; `0` if it does not exist.
    async fn row_count(&self, collection: &CollectionId) -> Result<usize>;

    /// Statistics for one collection.
    async fn collection_info(&self, collection: &CollectionId) -> Result<CollectionInfo>;

    /// Statistics for every collection, ordered by collection id.
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Delete a collection and all its rows. Returns whether it existed.
    async fn delete_collection(&self, collection: &CollectionId) -> Result<bool>;

    /// Persist any buffered state. The default is a no-op.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Rows of one collection in insertion order. Shared by the bundled stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct CollectionTable {
    pub(crate) id: CollectionId,
    pub(crate) dimensions: usize,
    pub(crate) rows: Vec<EmbeddedChunk>,
}

impl CollectionTable {
    pub(crate) fn new(id: CollectionId, dimensions: usize) -> Self {
        Self { id, dimensions, rows: Vec::new() }
    }

    /// Check that every vector has the same dimension as `dimensions`.
    pub(crate) fn check_dimensions(
        backend: &str,
        dimensions: usize,
        chunks: &[EmbeddedChunk],
    ) -> Result<()> {
        if let Some(bad) = chunks.iter().find(|c| c.vector.len() != dimensions) {
            return Err(RagError::VectorStoreError {
                backend: backend.to_string(),
                message: format!(
                    "embedding dimension mismatch: expected {dimensions}, got {} (chunk {})",
                    bad.vector.len(),
                    bad.chunk.sequence_index
                ),
            });
        }
        Ok(())
    }

    /// Apply an upsert to this table; `backend` names the store in errors.
    pub(crate) fn apply(
        &mut self,
        backend: &str,
        chunks: &[EmbeddedChunk],
        mode: UpsertMode,
    ) -> Result<UpsertOutcome> {
        let populated = !self.rows.is_empty();
        if populated && mode == UpsertMode::SkipIfPopulated {
            return Ok(UpsertOutcome::AlreadyPopulated { rows: self.rows.len() });
        }
        // The incoming rows fix the dimension: a forced re-ingest may come
        // from a different embedder.
        let dimensions = chunks.first().map_or(self.dimensions, |c| c.vector.len());
        Self::check_dimensions(backend, dimensions, chunks)?;

        self.dimensions = dimensions;
        self.rows = chunks.to_vec();
        Ok(if populated {
            UpsertOutcome::Replaced { rows: self.rows.len() }
        } else {
            UpsertOutcome::Inserted { rows: self.rows.len() }
        })
    }

    pub(crate) fn similarity_search(
        &self,
        backend: &str,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if !self.rows.is_empty() && query.len() != self.dimensions {
            return Err(RagError::VectorStoreError {
                backend: backend.to_string(),
                message: format!(
                    "query dimension mismatch: collection {} expects {}, got {}",
                    self.id,
                    self.dimensions,
                    query.len()
                ),
            });
        }
        let mut scored: Vec<ScoredChunk> = self
            .rows
            .iter()
            .map(|row| ScoredChunk {
                chunk: row.chunk.clone(),
                score: cosine_similarity(&row.vector, query),
            })
            .collect();
        // `sort_by` is stable, so equal scores keep insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    pub(crate) fn filtered_search(&self, filter: &SourceFilter, top_k: usize) -> Vec<ScoredChunk> {
        self.rows
            .iter()
            .filter(|row| filter.matches_any(&row.chunk.source_ids))
            .take(top_k)
            .map(|row| ScoredChunk { chunk: row.chunk.clone(), score: 1.0 })
            .collect()
    }

    /// Rough in-memory footprint: vector bytes plus text and id bytes.
    pub(crate) fn approx_size_bytes(&self) -> u64 {
        self.rows
            .iter()
            .map(|row| {
                let ids: usize = row.chunk.source_ids.iter().map(String::len).sum();
                (row.vector.len() * std::mem::size_of::<f32>() + row.chunk.text.len() + ids) as u64
            })
            .sum()
    }

    pub(crate) fn info(&self, approx_size_bytes: u64) -> CollectionInfo {
        CollectionInfo {
            id: self.id.clone(),
            row_count: self.rows.len(),
            dimensions: self.dimensions,
            approx_size_bytes,
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
