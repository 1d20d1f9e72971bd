//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a zero-dependency vector store
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and single-process use.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{CollectionId, CollectionInfo, EmbeddedChunk, ScoredChunk};
use crate::error::{RagError, Result};
use crate::vectorstore::{CollectionTable, SourceFilter, UpsertMode, UpsertOutcome, VectorStore};

const BACKEND: &str = "InMemory";

/// An in-memory vector store using cosine similarity for search.
///
/// Collections are stored as a `HashMap` from [`CollectionId`] to an
/// insertion-ordered row table. All operations are async-safe via
/// `tokio::sync::RwLock`.
///
/// # Example
///
/// ```rust,ignore
/// use llmrag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// assert!(store.list_collections().await?.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<CollectionId, CollectionTable>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(
        &self,
        collection: &CollectionId,
        chunks: &[EmbeddedChunk],
        mode: UpsertMode,
    ) -> Result<UpsertOutcome> {
        let mut collections = self.collections.write().await;
        let existed = collections.contains_key(collection);
        let dimensions = chunks.first().map_or(0, |c| c.vector.len());
        let outcome = collections
            .entry(collection.clone())
            .or_insert_with(|| CollectionTable::new(collection.clone(), dimensions))
            .apply(BACKEND, chunks, mode);
        if outcome.is_err() && !existed {
            collections.remove(collection);
        }
        outcome
    }

    async fn similarity_search(
        &self,
        collection: &CollectionId,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let collections = self.collections.read().await;
        let table = collections.get(collection).ok_or_else(|| RagError::not_found(collection))?;
        table.similarity_search(BACKEND, query, top_k)
    }

    async fn filtered_search(
        &self,
        collection: &CollectionId,
        filter: &SourceFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let collections = self.collections.read().await;
        let table = collections.get(collection).ok_or_else(|| RagError::not_found(collection))?;
        Ok(table.filtered_search(filter, top_k))
    }

    async fn row_count(&self, collection: &CollectionId) -> Result<usize> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map_or(0, |t| t.rows.len()))
    }

    async fn collection_info(&self, collection: &CollectionId) -> Result<CollectionInfo> {
        let collections = self.collections.read().await;
        let table = collections.get(collection).ok_or_else(|| RagError::not_found(collection))?;
        Ok(table.info(table.approx_size_bytes()))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.collections.read().await;
        let mut infos: Vec<CollectionInfo> =
            collections.values().map(|t| t.info(t.approx_size_bytes())).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(infos)
    }

    async fn delete_collection(&self, collection: &CollectionId) -> Result<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections.remove(collection).is_some())
    }
}
