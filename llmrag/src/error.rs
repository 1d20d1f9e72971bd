//! Error types for the `llmrag` crate.

use std::time::Duration;

use thiserror::Error;

use crate::document::RetrievalResult;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration validation error. Fatal: the caller must fix the configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The chunker rejected its input.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// An embedding or generation model could not be loaded or reached.
    #[error("Model unavailable ({model}): {message}")]
    ModelUnavailable {
        /// The model or endpoint that failed.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The requested collection does not exist. Usually means "ingest first".
    #[error("Collection not found: {collection}")]
    CollectionNotFound {
        /// Display form of the missing collection id.
        collection: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A generation call failed. The retrieval is preserved for a retry.
    #[error("Generation error: {source}")]
    Generation {
        /// The underlying generation failure.
        #[source]
        source: GenerationError,
        /// The retrieval the failed prompt was built from.
        retrieval: Box<RetrievalResult>,
    },

    /// A generation call exceeded its timeout. The retrieval is preserved for a retry.
    #[error("Generation timed out after {elapsed:?}")]
    Timeout {
        /// The configured timeout that elapsed.
        elapsed: Duration,
        /// The retrieval the timed-out prompt was built from.
        retrieval: Box<RetrievalResult>,
    },

    /// Filesystem failure in a persistent backend or while loading configuration.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A stored collection or configuration document could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for RagError {
    fn from(err: serde_yaml::Error) -> Self {
        RagError::Serialization(err.to_string())
    }
}

/// Coarse error categories surfaced to users of the CLI and other front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration or invalid input structure.
    Configuration,
    /// A model failed to load.
    ModelUnavailable,
    /// The collection has not been ingested.
    CollectionNotFound,
    /// Embedding or storage failure.
    Backend,
    /// Generation failed; may be retried.
    Generation,
    /// Generation timed out; may be retried.
    Timeout,
}

impl ErrorKind {
    /// A stable, lower-case label for the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::CollectionNotFound => "collection_not_found",
            ErrorKind::Backend => "backend",
            ErrorKind::Generation => "generation",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RagError {
    /// Classify the error for user-facing reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::ConfigError(_) | RagError::ChunkingError(_) => ErrorKind::Configuration,
            RagError::ModelUnavailable { .. } => ErrorKind::ModelUnavailable,
            RagError::CollectionNotFound { .. } => ErrorKind::CollectionNotFound,
            RagError::EmbeddingError { .. }
            | RagError::VectorStoreError { .. }
            | RagError::Io(_)
            | RagError::Serialization(_) => ErrorKind::Backend,
            RagError::Generation { .. } => ErrorKind::Generation,
            RagError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Whether the operation may succeed if retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Generation { .. } | RagError::Timeout { .. })
    }

    /// The retrieval preserved by a failed generation, if any.
    pub fn retrieval(&self) -> Option<&RetrievalResult> {
        match self {
            RagError::Generation { retrieval, .. } | RagError::Timeout { retrieval, .. } => {
                Some(retrieval.as_ref())
            }
            _ => None,
        }
    }

    /// Shorthand for a collection-not-found error.
    pub(crate) fn not_found(collection: impl std::fmt::Display) -> Self {
        RagError::CollectionNotFound { collection: collection.to_string() }
    }
}

/// Errors reported by a [`Generator`](crate::Generator).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    /// The language model could not be loaded or reached.
    #[error("model unavailable ({model}): {message}")]
    ModelUnavailable {
        /// The model or endpoint that failed.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// The model was reachable but the call failed.
    #[error("{provider}: {message}")]
    Failed {
        /// The generator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The model returned an empty completion after post-processing.
    #[error("model returned an empty completion")]
    EmptyCompletion,
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RetrievalStrategy;

    fn retrieval() -> Box<RetrievalResult> {
        Box::new(RetrievalResult { hits: Vec::new(), strategy: RetrievalStrategy::Similarity })
    }

    #[test]
    fn generation_failures_are_retryable_and_keep_retrieval() {
        let err = RagError::Timeout { elapsed: Duration::from_secs(3), retrieval: retrieval() };
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.retrieval().is_some());

        let err = RagError::Generation {
            source: GenerationError::EmptyCompletion,
            retrieval: retrieval(),
        };
        assert_eq!(err.to_string(), "Generation error: model returned an empty completion");
        assert!(err.retrieval().is_some());
    }

    #[test]
    fn fatal_errors_are_not_retryable() {
        let err = RagError::ConfigError("bad".into());
        assert!(!err.is_retryable());
        assert_eq!(err.kind().as_str(), "configuration");
        assert!(RagError::not_found("d@u").retrieval().is_none());
        assert_eq!(RagError::not_found("d@u").kind(), ErrorKind::CollectionNotFound);
    }
}
