//! OpenAI-compatible embedding and completion clients.
//!
//! Both clients speak the OpenAI REST dialect, so they work against the
//! hosted API as well as local servers (vLLM, llama.cpp, Ollama) exposing
//! `/v1/embeddings` and `/v1/completions`.
//!
//! This module is only available when the `openai` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::GenerationParams;
use crate::embedding::{EmbeddingProvider, l2_normalize};
use crate::error::{GenerationError, RagError, Result};
use crate::generation::Generator;

/// The default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

fn client_for(model: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder().build().map_err(|e| RagError::ModelUnavailable {
        model: model.to_string(),
        message: format!("failed to build HTTP client: {e}"),
    })
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    repetition_penalty: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail =
        serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings endpoint.
///
/// # Configuration
///
/// - `base_url` – defaults to [`OPENAI_BASE_URL`].
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – expected output dimension; also sent to the API as a
///   Matryoshka truncation request when set explicitly.
/// - `api_key` – optional; local servers usually need none.
///
/// Returned vectors are L2-normalised and checked against `dimensions`.
///
/// # Example
///
/// ```rust,ignore
/// use llmrag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("http://localhost:8000/v1")?
///     .with_model("all-MiniLM-L6-v2")
///     .with_dimensions(384);
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider for the endpoint at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: client_for(DEFAULT_EMBEDDING_MODEL)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Set the bearer token sent with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into()).filter(|k: &String| !k.is_empty());
        self
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    fn unavailable(&self, message: String) -> RagError {
        RagError::ModelUnavailable { model: self.model.clone(), message }
    }

    fn embedding_error(message: String) -> RagError {
        RagError::EmbeddingError { provider: "OpenAI".into(), message }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "OpenAI", text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| Self::embedding_error("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = "OpenAI",
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let mut request =
            self.client.post(format!("{}/embeddings", self.base_url)).json(&request_body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "request failed");
            if e.is_connect() {
                self.unavailable(format!("cannot reach {}: {e}", self.base_url))
            } else {
                Self::embedding_error(format!("request failed: {e}"))
            }
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            let detail = error_detail(response).await;
            return Err(self.unavailable(detail));
        }
        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(provider = "OpenAI", %detail, "API error");
            return Err(Self::embedding_error(detail));
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "failed to parse response");
            Self::embedding_error(format!("failed to parse response: {e}"))
        })?;

        if embedding_response.data.len() != texts.len() {
            return Err(Self::embedding_error(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embedding_response.data.len()
            )));
        }

        embedding_response
            .data
            .into_iter()
            .map(|d| {
                let mut vector = d.embedding;
                if vector.len() != self.dimensions {
                    return Err(Self::embedding_error(format!(
                        "expected dimension {}, got {}",
                        self.dimensions,
                        vector.len()
                    )));
                }
                l2_normalize(&mut vector);
                Ok(vector)
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ── Completions ────────────────────────────────────────────────────

/// A [`Generator`] backed by an OpenAI-compatible `/completions` endpoint.
///
/// `max_tokens`, `temperature` and `repetition_penalty` are forwarded as-is;
/// servers that do not know `repetition_penalty` ignore it.
pub struct OpenAICompletionGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAICompletionGenerator {
    /// Create a generator for `model` at `base_url`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        Ok(Self {
            client: client_for(&model)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model,
        })
    }

    /// Set the bearer token sent with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into()).filter(|k: &String| !k.is_empty());
        self
    }

    fn failed(message: String) -> GenerationError {
        GenerationError::Failed { provider: "OpenAI".into(), message }
    }
}

#[async_trait]
impl Generator for OpenAICompletionGenerator {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> std::result::Result<String, GenerationError> {
        debug!(
            provider = "OpenAI",
            model = %self.model,
            prompt_len = prompt.len(),
            "completion request"
        );

        let body = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            repetition_penalty: params.repetition_penalty,
        };
        let mut request = self.client.post(format!("{}/completions", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "completion request failed");
            if e.is_connect() {
                GenerationError::ModelUnavailable {
                    model: self.model.clone(),
                    message: format!("cannot reach {}: {e}", self.base_url),
                }
            } else {
                Self::failed(format!("request failed: {e}"))
            }
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            let message = error_detail(response).await;
            return Err(GenerationError::ModelUnavailable { model: self.model.clone(), message });
        }
        if !response.status().is_success() {
            return Err(Self::failed(error_detail(response).await));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Self::failed(format!("failed to parse response: {e}")))?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| Self::failed("API returned no choices".into()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
