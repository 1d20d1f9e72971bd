//! Data types for documents, chunks, collections, and retrieval results.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Separator placed between joined element texts inside a chunk.
pub const ELEMENT_SEPARATOR: &str = " ";

/// One structural unit of a document (typically a paragraph or heading),
/// already tagged with its stable source identifier by an upstream splitter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceElement {
    /// The text content of the element.
    pub text: String,
    /// Stable identifier of the element, unique within its document.
    pub source_id: String,
}

impl SourceElement {
    /// Create a new element.
    pub fn new(text: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self { text: text.into(), source_id: source_id.into() }
    }
}

/// A source document: an ordered sequence of [`SourceElement`]s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// Optional human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Structural elements in document order.
    pub elements: Vec<SourceElement>,
}

impl Document {
    /// Create a document from its id and elements.
    pub fn new(id: impl Into<String>, elements: Vec<SourceElement>) -> Self {
        Self { id: id.into(), title: None, elements }
    }

    /// Build a document from plain text, treating blank-line separated
    /// paragraphs as elements with ids `p1`, `p2`, ...
    pub fn from_plain_text(id: impl Into<String>, text: &str) -> Self {
        let elements = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .enumerate()
            .map(|(i, p)| SourceElement::new(p, format!("p{}", i + 1)))
            .collect();
        Self::new(id, elements)
    }
}

/// A bounded unit of text with the source ids of every element it contains.
///
/// Chunks are immutable once produced by a [`Chunker`](crate::Chunker).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// Source ids of the contributing elements, in document order.
    pub source_ids: Vec<String>,
    /// Position of this chunk within its document.
    pub sequence_index: usize,
    /// Number of leading characters (separator included) copied from the
    /// previous chunk as overlap.
    #[serde(default)]
    pub overlap_len: usize,
}

impl Chunk {
    /// The attribution string: all source ids joined by commas.
    pub fn source_id(&self) -> String {
        self.source_ids.join(",")
    }

    /// The chunk text without the overlap copied from the previous chunk.
    pub fn fresh_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap_len) {
            Some((byte, _)) => &self.text[byte..],
            None if self.overlap_len == 0 => &self.text,
            None => "",
        }
    }

    /// Length of the chunk text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A [`Chunk`] paired with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChunk {
    /// The embedded chunk.
    pub chunk: Chunk,
    /// The embedding; its length is the collection dimension.
    pub vector: Vec<f32>,
}

/// Identity of a collection: one document ingested for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId {
    /// Identity of the ingested document.
    pub document_id: String,
    /// Identity of the user or session owning the collection.
    pub user_id: String,
}

impl CollectionId {
    /// Create a collection id.
    pub fn new(document_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self { document_id: document_id.into(), user_id: user_id.into() }
    }

    /// Stable storage name: `{document}__{user}` with every character outside
    /// `[A-Za-z0-9_.-]` replaced by `_`.
    pub fn storage_name(&self) -> String {
        format!("{}__{}", sanitize(&self.document_id), sanitize(&self.user_id))
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.document_id, self.user_id)
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') { c } else { '_' })
        .collect()
}

/// Summary of a stored collection, as reported to management tooling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionInfo {
    /// The collection identity.
    pub id: CollectionId,
    /// Number of stored chunk rows.
    pub row_count: usize,
    /// Embedding dimension of the collection.
    pub dimensions: usize,
    /// Approximate storage footprint in bytes.
    pub approx_size_bytes: u64,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant). Filtered
    /// lookups report `1.0`.
    pub score: f32,
}

/// How a [`RetrievalResult`] was produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Plain vector similarity search.
    Similarity,
    /// Exact lookup of chunks belonging to a referenced section.
    SectionFilter {
        /// The section identifier found in the question.
        section: String,
    },
    /// A section was referenced but matched no chunk; similarity search was used.
    SectionFallback {
        /// The section identifier found in the question.
        section: String,
    },
}

/// Ordered retrieval hits, most relevant first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// Hits ordered by descending relevance.
    pub hits: Vec<ScoredChunk>,
    /// The strategy that produced the hits.
    pub strategy: RetrievalStrategy,
}

impl RetrievalResult {
    /// Number of hits.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Whether no chunk was retrieved.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// A generated answer with the provenance of the context it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    /// The post-processed answer text.
    pub text: String,
    /// Union of source ids of the chunks included in the prompt, in first-seen order.
    pub source_ids: Vec<String>,
    /// Number of chunks included in the prompt.
    pub context_chunks_used: usize,
}

/// The answer shape returned to callers (CLI, UI, API).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResponse {
    /// The answer text.
    pub answer: String,
    /// Source ids backing the answer.
    pub source_ids: Vec<String>,
    /// Number of context chunks used.
    pub context_count: usize,
    /// Wall-clock time for retrieval and generation, in seconds.
    pub response_time: f64,
    /// The chunks placed in the prompt, in rank order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<ScoredChunk>,
}

impl AnswerResponse {
    /// Combine an answer with the retrieval it was generated from.
    ///
    /// The prompt holds the leading `answer.context_chunks_used` hits, so
    /// those become the response context.
    pub fn new(answer: Answer, retrieval: &RetrievalResult, elapsed: Duration) -> Self {
        let context = retrieval.hits.iter().take(answer.context_chunks_used).cloned().collect();
        Self {
            answer: answer.text,
            source_ids: answer.source_ids,
            context_count: answer.context_chunks_used,
            response_time: elapsed.as_secs_f64(),
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_paragraphs_become_numbered_elements() {
        let doc = Document::from_plain_text("d", "First.\n\n\n\nSecond.\n\n  ");
        assert_eq!(
            doc.elements,
            vec![SourceElement::new("First.", "p1"), SourceElement::new("Second.", "p2")]
        );
    }

    #[test]
    fn fresh_text_skips_overlap_characters() {
        let chunk = Chunk {
            text: "é tail next".to_string(),
            source_ids: vec!["b".into()],
            sequence_index: 1,
            overlap_len: 7,
        };
        assert_eq!(chunk.fresh_text(), "next");
        assert_eq!(chunk.char_len(), 11);
    }

    #[test]
    fn storage_name_is_sanitized() {
        let id = CollectionId::new("wg1/chapter04", "alice smith");
        assert_eq!(id.storage_name(), "wg1_chapter04__alice_smith");
        assert_eq!(id.to_string(), "wg1/chapter04@alice smith");
    }
}
