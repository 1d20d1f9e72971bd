//! Component selection by name and the process-scoped [`RagContext`].
//!
//! [`ComponentRegistry`] maps the `type` of each [`ComponentSpec`] in
//! [`Settings`] to a constructor. All three components are resolved when the
//! context is built, so an unknown type fails at startup instead of at first
//! use.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tracing::info;

use crate::config::{ComponentSpec, Settings};
use crate::embedding::{EmbeddingProvider, HashingEmbeddingProvider};
use crate::error::{RagError, Result};
use crate::filestore::FileVectorStore;
use crate::generation::{FakeGenerator, Generator, StaticGenerator};
use crate::inmemory::InMemoryVectorStore;
use crate::pipeline::RagPipeline;
use crate::vectorstore::VectorStore;

/// Embedding dimension used by the `hashing` embedder when none is configured.
pub const DEFAULT_HASHING_DIMENSIONS: usize = 384;

/// Directory used by the `file` store when no path is configured.
pub const DEFAULT_STORE_PATH: &str = "./rag_store";

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Builds an embedding provider from its spec.
pub type EmbedderFactory =
    Box<dyn Fn(&ComponentSpec) -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync>;
/// Builds a generator from its spec.
pub type GeneratorFactory = Box<dyn Fn(&ComponentSpec) -> Result<Arc<dyn Generator>> + Send + Sync>;
/// Opens a vector store from its spec.
pub type StoreFactory =
    Box<dyn Fn(&ComponentSpec) -> BoxFuture<Result<Arc<dyn VectorStore>>> + Send + Sync>;

/// Name → constructor tables for embedders, generators and stores.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = ComponentRegistry::with_defaults();
/// registry.register_generator(
///     "echo",
///     Box::new(|_spec: &ComponentSpec| -> Result<Arc<dyn Generator>> {
///         Ok(Arc::new(EchoGenerator))
///     }),
/// );
/// let context = RagContext::with_registry(settings, &registry).await?;
/// ```
#[derive(Default)]
pub struct ComponentRegistry {
    embedders: BTreeMap<String, EmbedderFactory>,
    generators: BTreeMap<String, GeneratorFactory>,
    stores: BTreeMap<String, StoreFactory>,
}

impl ComponentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every bundled component.
    ///
    /// | kind | names |
    /// |---|---|
    /// | embedder | `hashing`, `openai`\* |
    /// | generator | `fake`, `static`, `openai`\* |
    /// | store | `memory`, `file` |
    ///
    /// \* with the `openai` feature.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_embedder("hashing", Box::new(hashing_embedder));
        registry.register_generator("fake", Box::new(fake_generator));
        registry.register_generator("static", Box::new(static_generator));
        registry.register_store("memory", Box::new(memory_store));
        registry.register_store("file", Box::new(file_store));

        #[cfg(feature = "openai")]
        openai_components::register(&mut registry);

        registry
    }

    /// Register (or replace) an embedder constructor.
    pub fn register_embedder(&mut self, name: impl Into<String>, factory: EmbedderFactory) {
        self.embedders.insert(name.into(), factory);
    }

    /// Register (or replace) a generator constructor.
    pub fn register_generator(&mut self, name: impl Into<String>, factory: GeneratorFactory) {
        self.generators.insert(name.into(), factory);
    }

    /// Register (or replace) a vector store constructor.
    pub fn register_store(&mut self, name: impl Into<String>, factory: StoreFactory) {
        self.stores.insert(name.into(), factory);
    }

    /// Build the embedder selected by `spec`.
    pub fn embedder(&self, spec: &ComponentSpec) -> Result<Arc<dyn EmbeddingProvider>> {
        let factory = lookup(&self.embedders, "embedder", &spec.kind)?;
        factory(spec)
    }

    /// Build the generator selected by `spec`.
    pub fn generator(&self, spec: &ComponentSpec) -> Result<Arc<dyn Generator>> {
        let factory = lookup(&self.generators, "generator", &spec.kind)?;
        factory(spec)
    }

    /// Open the vector store selected by `spec`.
    pub async fn store(&self, spec: &ComponentSpec) -> Result<Arc<dyn VectorStore>> {
        let factory = lookup(&self.stores, "store", &spec.kind)?;
        factory(spec).await
    }
}

fn hashing_embedder(spec: &ComponentSpec) -> Result<Arc<dyn EmbeddingProvider>> {
    let dimensions = spec.dimensions.unwrap_or(DEFAULT_HASHING_DIMENSIONS);
    Ok(Arc::new(HashingEmbeddingProvider::new(dimensions)?))
}

fn fake_generator(_spec: &ComponentSpec) -> Result<Arc<dyn Generator>> {
    Ok(Arc::new(FakeGenerator))
}

fn static_generator(spec: &ComponentSpec) -> Result<Arc<dyn Generator>> {
    let text = spec
        .text
        .clone()
        .ok_or_else(|| RagError::ConfigError("static generator requires `text`".to_string()))?;
    Ok(Arc::new(StaticGenerator::new(text)))
}

fn memory_store(_spec: &ComponentSpec) -> BoxFuture<Result<Arc<dyn VectorStore>>> {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    Box::pin(std::future::ready(Ok::<_, RagError>(store)))
}

fn file_store(spec: &ComponentSpec) -> BoxFuture<Result<Arc<dyn VectorStore>>> {
    let root = spec.path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
    Box::pin(open_file_store(root))
}

async fn open_file_store(root: PathBuf) -> Result<Arc<dyn VectorStore>> {
    Ok(Arc::new(FileVectorStore::open(root).await?))
}

fn lookup<'a, F>(table: &'a BTreeMap<String, F>, role: &str, name: &str) -> Result<&'a F> {
    table.get(name).ok_or_else(|| {
        let known: Vec<&str> = table.keys().map(String::as_str).collect();
        RagError::ConfigError(format!("unknown {role} type '{name}' (known: {})", known.join(", ")))
    })
}

#[cfg(feature = "openai")]
mod openai_components {
    use super::*;
    use crate::openai::{OPENAI_BASE_URL, OpenAICompletionGenerator, OpenAIEmbeddingProvider};

    fn api_key(spec: &ComponentSpec) -> Option<String> {
        spec.api_key_env.as_deref().and_then(|name| std::env::var(name).ok())
    }

    pub(super) fn register(registry: &mut ComponentRegistry) {
        registry.register_embedder("openai", Box::new(openai_embedder));
        registry.register_generator("openai", Box::new(openai_generator));
    }

    fn openai_embedder(spec: &ComponentSpec) -> Result<Arc<dyn EmbeddingProvider>> {
        let mut provider =
            OpenAIEmbeddingProvider::new(spec.base_url.as_deref().unwrap_or(OPENAI_BASE_URL))?;
        if let Some(model) = &spec.model {
            provider = provider.with_model(model);
        }
        if let Some(dimensions) = spec.dimensions {
            provider = provider.with_dimensions(dimensions);
        }
        if let Some(key) = api_key(spec) {
            provider = provider.with_api_key(key);
        }
        Ok(Arc::new(provider))
    }

    fn openai_generator(spec: &ComponentSpec) -> Result<Arc<dyn Generator>> {
        let model = spec
            .model
            .as_deref()
            .ok_or_else(|| RagError::ConfigError("openai generator requires `model`".to_string()))?;
        let base_url = spec.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
        let mut generator = OpenAICompletionGenerator::new(base_url, model)?;
        if let Some(key) = api_key(spec) {
            generator = generator.with_api_key(key);
        }
        Ok(Arc::new(generator))
    }
}

/// Process-scoped owner of the configured components.
///
/// Build one at startup, share it by reference, and call
/// [`close`](RagContext::close) before exiting.
pub struct RagContext {
    settings: Settings,
    store: Arc<dyn VectorStore>,
    pipeline: RagPipeline,
}

impl RagContext {
    /// Build a context from `settings` using the bundled components.
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        Self::with_registry(settings, &ComponentRegistry::with_defaults()).await
    }

    /// Build a context from `settings`, resolving component names in `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an unknown component type or an
    /// invalid configuration, and propagates store opening failures.
    pub async fn with_registry(settings: Settings, registry: &ComponentRegistry) -> Result<Self> {
        settings.rag.validate()?;
        let embedder = registry.embedder(&settings.embedder)?;
        let generator = registry.generator(&settings.generator)?;
        let store = registry.store(&settings.store).await?;

        let pipeline = RagPipeline::builder()
            .config(settings.rag.clone())
            .embedding_provider(embedder.clone())
            .vector_store(store.clone())
            .generator(generator.clone())
            .build()?;

        info!(
            embedder = embedder.name(),
            dimensions = embedder.dimensions(),
            generator = generator.name(),
            store = %settings.store.kind,
            "rag context ready"
        );
        Ok(Self { settings, store, pipeline })
    }

    /// The settings the context was built from.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The configured pipeline.
    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }

    /// The shared vector store.
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Flush the store and release every component.
    pub async fn close(self) -> Result<()> {
        self.store.flush().await?;
        info!("rag context closed");
        Ok(())
    }
}
