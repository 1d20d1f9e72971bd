//! Configuration for the RAG pipeline.
//!
//! [`RagConfig`] holds the tuning parameters of every stage and is validated
//! once by [`RagConfigBuilder::build`] or [`RagConfig::validate`]. [`Settings`]
//! adds the component selections and is what a YAML configuration file
//! deserializes into.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Default pattern recognising a structural section reference in a question:
/// a dotted numeric token (`4.3`, `10.1.2`) or `section 7` / `chapter 4`.
pub const DEFAULT_SECTION_PATTERN: &str =
    r"(?i)\b(?:section|chapter)\s+(\d+(?:\.\d+)*)\b|\b(\d+(?:\.\d+)+)\b";

/// Chunker parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub max_chunk_chars: usize,
    /// Number of trailing characters of a chunk re-included at the start of the next.
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chunk_chars: 500, overlap_chars: 0 }
    }
}

impl ChunkingConfig {
    /// Check that `max_chunk_chars > 0` and `overlap_chars < max_chunk_chars`.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_chars == 0 {
            return Err(RagError::ConfigError("max_chunk_chars must be greater than zero".into()));
        }
        if self.overlap_chars >= self.max_chunk_chars {
            return Err(RagError::ConfigError(format!(
                "overlap_chars ({}) must be less than max_chunk_chars ({})",
                self.overlap_chars, self.max_chunk_chars
            )));
        }
        Ok(())
    }
}

/// Retriever parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of top results to return.
    pub top_k: usize,
    /// Minimum similarity score for similarity-search results. Not applied to
    /// section lookups or to the similarity fallback after an empty lookup.
    pub similarity_threshold: f32,
    /// Regex detecting a section reference; the first non-empty capture group
    /// (or the whole match) is the section identifier. `None` disables
    /// section-filtered retrieval.
    pub section_pattern: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            similarity_threshold: 0.0,
            section_pattern: Some(DEFAULT_SECTION_PATTERN.to_string()),
        }
    }
}

impl RetrievalConfig {
    /// Check that `top_k > 0`.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Sampling parameters forwarded verbatim to the generation model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationParams {
    /// Maximum number of new tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Repetition penalty (1.0 disables it).
    pub repetition_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { max_tokens: 256, temperature: 0.7, repetition_penalty: 1.1 }
    }
}

/// Answer assembler parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Maximum number of retrieved chunks placed in the prompt.
    pub max_context_chunks: usize,
    /// Maximum total characters of chunk text placed in the prompt.
    pub max_context_chars: usize,
    /// Timeout for one generation call, in seconds.
    pub timeout_secs: u64,
    /// Parameters passed through to the model.
    pub params: GenerationParams,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_context_chunks: 4,
            max_context_chars: 4000,
            timeout_secs: 120,
            params: GenerationParams::default(),
        }
    }
}

impl AssemblerConfig {
    /// The generation timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check that context limits and timeout are non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_context_chunks == 0 {
            return Err(RagError::ConfigError(
                "max_context_chunks must be greater than zero".into(),
            ));
        }
        if self.max_context_chars == 0 {
            return Err(RagError::ConfigError("max_context_chars must be greater than zero".into()));
        }
        if self.timeout_secs == 0 {
            return Err(RagError::ConfigError("timeout_secs must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Ingestion parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Number of chunk texts sent to the embedder per batch call.
    pub embed_batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { embed_batch_size: 32 }
    }
}

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Chunker parameters.
    pub chunking: ChunkingConfig,
    /// Retriever parameters.
    pub retrieval: RetrievalConfig,
    /// Answer assembler parameters.
    pub assembler: AssemblerConfig,
    /// Ingestion parameters.
    pub ingest: IngestConfig,
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        self.assembler.validate()?;
        if self.ingest.embed_batch_size == 0 {
            return Err(RagError::ConfigError("embed_batch_size must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn max_chunk_chars(mut self, size: usize) -> Self {
        self.config.chunking.max_chunk_chars = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn overlap_chars(mut self, overlap: usize) -> Self {
        self.config.chunking.overlap_chars = overlap;
        self
    }

    /// Set the number of top results to return from retrieval.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.retrieval.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.retrieval.similarity_threshold = threshold;
        self
    }

    /// Set or disable the section-reference pattern.
    pub fn section_pattern(mut self, pattern: Option<String>) -> Self {
        self.config.retrieval.section_pattern = pattern;
        self
    }

    /// Set the maximum number of chunks placed in the prompt.
    pub fn max_context_chunks(mut self, n: usize) -> Self {
        self.config.assembler.max_context_chunks = n;
        self
    }

    /// Set the maximum characters of context placed in the prompt.
    pub fn max_context_chars(mut self, n: usize) -> Self {
        self.config.assembler.max_context_chars = n;
        self
    }

    /// Set the generation timeout in seconds.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.assembler.timeout_secs = secs;
        self
    }

    /// Set the generation parameters.
    pub fn generation_params(mut self, params: GenerationParams) -> Self {
        self.config.assembler.params = params;
        self
    }

    /// Set the embedding batch size used during ingestion.
    pub fn embed_batch_size(mut self, n: usize) -> Self {
        self.config.ingest.embed_batch_size = n;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `max_chunk_chars == 0` or `overlap_chars >= max_chunk_chars`
    /// - `top_k == 0`
    /// - any assembler limit or the embedding batch size is zero
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Selection of one pluggable component by registered type name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ComponentSpec {
    /// Registered type name, e.g. `hashing`, `openai`, `file`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Model name for model-backed components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Embedding dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    /// Endpoint base URL for HTTP-backed components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Name of the environment variable holding an API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Filesystem location for persistent components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Fixed text for the `static` generator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ComponentSpec {
    /// A spec selecting `kind` with no options.
    pub fn of(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), ..Self::default() }
    }
}

/// Full process configuration: pipeline tuning plus component selections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Pipeline tuning parameters.
    #[serde(flatten)]
    pub rag: RagConfig,
    /// Embedder selection.
    pub embedder: ComponentSpec,
    /// Generator selection.
    pub generator: ComponentSpec,
    /// Vector store selection.
    pub store: ComponentSpec,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rag: RagConfig::default(),
            embedder: ComponentSpec { dimensions: Some(384), ..ComponentSpec::of("hashing") },
            generator: ComponentSpec::of("fake"),
            store: ComponentSpec {
                path: Some(PathBuf::from("./rag_store")),
                ..ComponentSpec::of("file")
            },
        }
    }
}

impl Settings {
    /// Parse settings from a YAML document and validate them.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.rag.validate()?;
        Ok(settings)
    }

    /// Load settings from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RagError::ConfigError(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_yaml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_overlap_not_below_chunk_size() {
        let err = RagConfig::builder().max_chunk_chars(100).overlap_chars(100).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("overlap_chars")));
    }

    #[test]
    fn builder_rejects_zero_sizes() {
        assert!(RagConfig::builder().max_chunk_chars(0).build().is_err());
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().embed_batch_size(0).build().is_err());
        assert!(RagConfig::builder().timeout_secs(0).build().is_err());
    }

    #[test]
    fn yaml_settings_fill_defaults() {
        let yaml = r#"
chunking:
  max_chunk_chars: 300
  overlap_chars: 30
retrieval:
  top_k: 2
embedder:
  type: hashing
  dimensions: 128
generator:
  type: static
  text: "ok"
store:
  type: memory
"#;
        let settings = Settings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings.rag.chunking.max_chunk_chars, 300);
        assert_eq!(settings.rag.retrieval.top_k, 2);
        assert_eq!(settings.rag.assembler, AssemblerConfig::default());
        assert_eq!(settings.embedder.dimensions, Some(128));
        assert_eq!(settings.generator.text.as_deref(), Some("ok"));
        assert_eq!(settings.store.kind, "memory");
    }

    #[test]
    fn yaml_settings_are_validated() {
        let yaml = "chunking:\n  max_chunk_chars: 10\n  overlap_chars: 20\n";
        assert!(matches!(Settings::from_yaml_str(yaml), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn bundled_example_config_parses() {
        let settings = Settings::from_yaml_str(include_str!("../../config/llmrag.yaml")).unwrap();
        assert_eq!(settings.rag.retrieval, RetrievalConfig::default());
        assert_eq!(settings.rag.chunking.overlap_chars, 50);
        assert_eq!(settings.embedder, Settings::default().embedder);
        assert_eq!(settings.store, Settings::default().store);
    }
}
