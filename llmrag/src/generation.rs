//! Generation interface for the language model that writes answers.

use async_trait::async_trait;

use crate::config::GenerationParams;
use crate::error::GenerationError;

/// A language model that completes a prompt.
///
/// The parameters are passed through untouched; implementations decide how
/// to map them onto their backend. The returned text may include the echoed
/// prompt, which the [`AnswerAssembler`](crate::AnswerAssembler) strips.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Complete `prompt`.
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> std::result::Result<String, GenerationError>;

    /// A short name identifying the generator and model, used in logs.
    fn name(&self) -> &str;
}

/// An offline stand-in that never calls a model.
///
/// It answers `[FAKE ANSWER] This is a dummy answer to: '<question>'`, taking
/// the question from the last `Question:` line of the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeGenerator;

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> std::result::Result<String, GenerationError> {
        let question = prompt
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix("Question:"))
            .map(str::trim)
            .unwrap_or_default();
        Ok(format!("[FAKE ANSWER] This is a dummy answer to: '{question}'"))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Returns the same completion for every prompt.
#[derive(Debug, Clone)]
pub struct StaticGenerator {
    text: String,
}

impl StaticGenerator {
    /// Create a generator that always answers `text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl Generator for StaticGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> std::result::Result<String, GenerationError> {
        Ok(self.text.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}
