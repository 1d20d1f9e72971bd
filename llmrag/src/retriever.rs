//! Query-time retrieval with section-aware routing.
//!
//! The [`Retriever`] embeds a question and searches a collection. When the
//! question names a structural section (for example "what does 4.3.2 say
//! about ..."), it first looks up the chunks attributed to that section and
//! only falls back to vector similarity if none exist.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, error, info};

use crate::config::RetrievalConfig;
use crate::document::{CollectionId, RetrievalResult, RetrievalStrategy};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::{SourceFilter, VectorStore};

/// Finds section references in question text.
#[derive(Debug, Clone)]
pub struct SectionDetector {
    pattern: Regex,
}

impl SectionDetector {
    /// Compile a detector from a regex.
    ///
    /// The section identifier is the first participating capture group, or
    /// the whole match when the pattern has no groups.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the pattern does not compile.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| RagError::ConfigError(format!("invalid section_pattern: {e}")))?;
        Ok(Self { pattern })
    }

    /// The first section identifier referenced by `question`, if any.
    pub fn detect(&self, question: &str) -> Option<String> {
        let captures = self.pattern.captures(question)?;
        let found = captures.iter().skip(1).flatten().next().or_else(|| captures.get(0))?;
        let section = found.as_str().trim_end_matches('.');
        (!section.is_empty()).then(|| section.to_string())
    }
}

/// Orchestrates query embedding and index search for one pipeline.
pub struct Retriever {
    config: RetrievalConfig,
    detector: Option<SectionDetector>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
}

impl Retriever {
    /// Create a retriever, compiling the configured section pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `top_k == 0` or the section
    /// pattern is invalid.
    pub fn new(
        config: RetrievalConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        config.validate()?;
        let detector = config.section_pattern.as_deref().map(SectionDetector::new).transpose()?;
        Ok(Self { config, detector, embedding_provider, vector_store })
    }

    /// The retrieval configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve with the configured `top_k`.
    pub async fn retrieve(
        &self,
        collection: &CollectionId,
        question: &str,
    ) -> Result<RetrievalResult> {
        self.retrieve_top_k(collection, question, self.config.top_k).await
    }

    /// Retrieve at most `top_k` chunks for `question`.
    ///
    /// # Errors
    ///
    /// Propagates [`RagError::CollectionNotFound`], embedding failures and
    /// store failures. An empty section lookup is not an error: it falls back
    /// to similarity search.
    pub async fn retrieve_top_k(
        &self,
        collection: &CollectionId,
        question: &str,
        top_k: usize,
    ) -> Result<RetrievalResult> {
        if top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".into()));
        }

        let section = self.detector.as_ref().and_then(|d| d.detect(question));
        let strategy = match section {
            Some(section) => {
                let filter = SourceFilter::SectionPrefix(section.clone());
                let hits = self.vector_store.filtered_search(collection, &filter, top_k).await?;
                if !hits.is_empty() {
                    info!(%collection, %section, result_count = hits.len(), "section lookup");
                    return Ok(RetrievalResult {
                        hits,
                        strategy: RetrievalStrategy::SectionFilter { section },
                    });
                }
                debug!(
                    %collection,
                    %section,
                    "section matched no chunks, falling back to similarity"
                );
                RetrievalStrategy::SectionFallback { section }
            }
            None => RetrievalStrategy::Similarity,
        };

        let query_embedding = self.embedding_provider.embed(question).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })?;

        let mut hits =
            self.vector_store.similarity_search(collection, &query_embedding, top_k).await?;
        // Fallback hits are never thresholded.
        if strategy == RetrievalStrategy::Similarity {
            let threshold = self.config.similarity_threshold;
            hits.retain(|hit| hit.score >= threshold);
        }

        info!(%collection, result_count = hits.len(), ?strategy, "similarity search");
        Ok(RetrievalResult { hits, strategy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SECTION_PATTERN;

    #[test]
    fn detects_dotted_section_numbers() {
        let detector = SectionDetector::new(DEFAULT_SECTION_PATTERN).unwrap();
        assert_eq!(detector.detect("What does 10.1 say about sea ice?").as_deref(), Some("10.1"));
        assert_eq!(detector.detect("Summarise 4.3.2.").as_deref(), Some("4.3.2"));
        assert_eq!(detector.detect("Explain Section 7 please").as_deref(), Some("7"));
        assert_eq!(detector.detect("chapter 4.2 findings").as_deref(), Some("4.2"));
    }

    #[test]
    fn plain_questions_have_no_section() {
        let detector = SectionDetector::new(DEFAULT_SECTION_PATTERN).unwrap();
        assert_eq!(detector.detect("What is the capital of France?"), None);
        assert_eq!(detector.detect("Warming in 2020 was high"), None);
    }

    #[test]
    fn whole_match_is_used_without_groups() {
        let detector = SectionDetector::new(r"SPM\.[A-Z]\d?").unwrap();
        assert_eq!(detector.detect("see SPM.B1 now").as_deref(), Some("SPM.B1"));
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        assert!(matches!(SectionDetector::new("(unclosed"), Err(RagError::ConfigError(_))));
    }
}
