//! File-backed vector store.
//!
//! [`FileVectorStore`] keeps every collection in memory and writes it through
//! to one JSON file per collection under a directory. Files are replaced by
//! writing a temporary sibling and renaming it, so a crash never leaves a
//! half-written collection behind.
//!
//! Concurrent writers in different processes are not coordinated: the last
//! writer of a collection file wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::document::{CollectionId, CollectionInfo, EmbeddedChunk, ScoredChunk};
use crate::embedding::fnv1a;
use crate::error::{RagError, Result};
use crate::vectorstore::{CollectionTable, SourceFilter, UpsertMode, UpsertOutcome, VectorStore};

const BACKEND: &str = "File";
const EXTENSION: &str = "json";

/// A [`VectorStore`] persisted as JSON files in a directory.
///
/// # Example
///
/// ```rust,ignore
/// use llmrag::FileVectorStore;
///
/// let store = FileVectorStore::open("./rag_store").await?;
/// for info in store.list_collections().await? {
///     println!("{}: {} rows", info.id, info.row_count);
/// }
/// ```
#[derive(Debug)]
pub struct FileVectorStore {
    root: PathBuf,
    collections: RwLock<HashMap<CollectionId, CollectionTable>>,
}

impl FileVectorStore {
    /// Open (creating if needed) a store rooted at `root` and load every
    /// collection file found there.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] if the directory cannot be created or read and
    /// [`RagError::Serialization`] if a collection file is corrupt.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let mut collections = HashMap::new();
        let mut entries = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            let table: CollectionTable = serde_json::from_slice(&bytes).map_err(|e| {
                RagError::Serialization(format!("corrupt collection file {}: {e}", path.display()))
            })?;
            collections.insert(table.id.clone(), table);
        }

        info!(
            root = %root.display(),
            collection_count = collections.len(),
            "opened file vector store"
        );
        Ok(Self { root, collections: RwLock::new(collections) })
    }

    /// The directory holding the collection files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, id: &CollectionId) -> PathBuf {
        // The hash keeps distinct ids apart even when their sanitized names collide.
        let key = format!("{}\u{0}{}", id.document_id, id.user_id);
        let hash = fnv1a(key.as_bytes());
        self.root.join(format!("{}-{hash:016x}.{EXTENSION}", id.storage_name()))
    }

    async fn write_table(&self, table: &CollectionTable) -> Result<()> {
        let path = self.file_path(&table.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(table)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(collection = %table.id, bytes = bytes.len(), "wrote collection file");
        Ok(())
    }

    async fn file_size(&self, id: &CollectionId) -> Option<u64> {
        tokio::fs::metadata(self.file_path(id)).await.ok().map(|m| m.len())
    }
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn upsert(
        &self,
        collection: &CollectionId,
        chunks: &[EmbeddedChunk],
        mode: UpsertMode,
    ) -> Result<UpsertOutcome> {
        let mut collections = self.collections.write().await;
        let mut table = collections.get(collection).cloned().unwrap_or_else(|| {
            CollectionTable::new(collection.clone(), chunks.first().map_or(0, |c| c.vector.len()))
        });
        let outcome = table.apply(BACKEND, chunks, mode)?;
        if !matches!(outcome, UpsertOutcome::AlreadyPopulated { .. }) {
            self.write_table(&table).await?;
            collections.insert(collection.clone(), table);
        }
        Ok(outcome)
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
        let size = match self.file_size(collection).await {
            Some(size) => size,
            None => table.approx_size_bytes(),
        };
        Ok(table.info(size))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.collections.read().await;
        let mut infos = Vec::with_capacity(collections.len());
        for table in collections.values() {
            let size = match self.file_size(&table.id).await {
                Some(size) => size,
                None => table.approx_size_bytes(),
            };
            infos.push(table.info(size));
        }
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(infos)
    }

    async fn delete_collection(&self, collection: &CollectionId) -> Result<bool> {
        let mut collections = self.collections.write().await;
        // The entry stays in memory unless its file is gone.
        match tokio::fs::remove_file(self.file_path(collection)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                error!(%collection, error = %e, "failed to remove collection file");
                return Err(e.into());
            }
        }
        let existed = collections.remove(collection).is_some();
        if existed {
            info!(collection = %collection, "deleted collection");
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    fn row(text: &str, id: &str, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                text: text.to_string(),
                source_ids: vec![id.to_string()],
                sequence_index: 0,
                overlap_len: 0,
            },
            vector,
        }
    }

    #[tokio::test]
    async fn collections_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = CollectionId::new("report", "alice");
        {
            let store = FileVectorStore::open(dir.path()).await.unwrap();
            let outcome = store
                .upsert(&id, &[row("hello", "p1", vec![1.0, 0.0])], UpsertMode::SkipIfPopulated)
                .await
                .unwrap();
            assert_eq!(outcome, UpsertOutcome::Inserted { rows: 1 });
        }

        let store = FileVectorStore::open(dir.path()).await.unwrap();
        let info = store.collection_info(&id).await.unwrap();
        assert_eq!(info.row_count, 1);
        assert_eq!(info.dimensions, 2);
        assert!(info.approx_size_bytes > 0);
        let hits = store.similarity_search(&id, &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].chunk.text, "hello");
    }

    #[tokio::test]
    async fn delete_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).await.unwrap();
        let id = CollectionId::new("report", "bob");
        store.upsert(&id, &[row("x", "p1", vec![1.0])], UpsertMode::Force).await.unwrap();
        assert!(store.delete_collection(&id).await.unwrap());
        assert!(!store.delete_collection(&id).await.unwrap());

        let reopened = FileVectorStore::open(dir.path()).await.unwrap();
        assert!(reopened.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_file_removal_keeps_the_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).await.unwrap();
        let id = CollectionId::new("report", "alice");
        store.upsert(&id, &[row("x", "p1", vec![1.0])], UpsertMode::Force).await.unwrap();

        // A directory in place of the collection file makes removal fail.
        let path = store.file_path(&id);
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(store.delete_collection(&id).await.is_err());
        assert_eq!(store.row_count(&id).await.unwrap(), 1);
        assert_eq!(store.list_collections().await.unwrap().len(), 1);

        std::fs::remove_dir(&path).unwrap();
        assert!(store.delete_collection(&id).await.unwrap());
        assert_eq!(store.row_count(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reingest_skips_when_populated_and_force_replaces_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let id = CollectionId::new("report", "alice");
        let second = [row("b", "p1", vec![0.0, 1.0]), row("c", "p2", vec![1.0, 0.0])];
        {
            let store = FileVectorStore::open(dir.path()).await.unwrap();
            let first = [row("a", "p1", vec![1.0, 0.0])];
            store.upsert(&id, &first, UpsertMode::SkipIfPopulated).await.unwrap();
            let outcome = store.upsert(&id, &second, UpsertMode::SkipIfPopulated).await.unwrap();
            assert_eq!(outcome, UpsertOutcome::AlreadyPopulated { rows: 1 });
        }

        let store = FileVectorStore::open(dir.path()).await.unwrap();
        assert_eq!(store.row_count(&id).await.unwrap(), 1);
        let outcome = store.upsert(&id, &second, UpsertMode::Force).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Replaced { rows: 2 });
        drop(store);

        let store = FileVectorStore::open(dir.path()).await.unwrap();
        assert_eq!(store.row_count(&id).await.unwrap(), 2);
        let hits = store.similarity_search(&id, &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].chunk.text, "b");
    }

    #[tokio::test]
    async fn colliding_storage_names_use_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).await.unwrap();
        let a = CollectionId::new("a b", "u");
        let b = CollectionId::new("a_b", "u");
        assert_eq!(a.storage_name(), b.storage_name());
        assert_ne!(store.file_path(&a), store.file_path(&b));
    }

    #[tokio::test]
    async fn corrupt_files_fail_to_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        let err = FileVectorStore::open(dir.path()).await.unwrap_err();
        assert!(matches!(err, RagError::Serialization(_)));
    }
}
