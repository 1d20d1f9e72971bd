//! Grounded prompt construction and answer extraction.
//!
//! The [`AnswerAssembler`] turns a question plus a [`RetrievalResult`] into a
//! single prompt, calls the [`Generator`] under a timeout, and returns an
//! [`Answer`] whose source ids are exactly those of the chunks placed in the
//! prompt.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::AssemblerConfig;
use crate::document::{Answer, RetrievalResult, ScoredChunk};
use crate::error::{GenerationError, RagError, Result};
use crate::generation::Generator;

/// Reply the model is told to give when the context does not contain the answer.
pub const INSUFFICIENT_CONTEXT: &str =
    "I don't have enough information in the provided context to answer this question.";

const ANSWER_MARKER: &str = "Answer:";

/// A rendered prompt and the chunks it contains.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt<'a> {
    /// The full prompt text.
    pub text: String,
    /// The retrieved chunks that fit the context budget, in rank order.
    pub included: &'a [ScoredChunk],
}

impl Prompt<'_> {
    /// Union of the included chunks' source ids, in first-seen order.
    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for hit in self.included {
            for id in &hit.chunk.source_ids {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }
}

/// Builds prompts from retrieval results and post-processes completions.
pub struct AnswerAssembler {
    config: AssemblerConfig,
    generator: Arc<dyn Generator>,
}

impl AnswerAssembler {
    /// Create an assembler.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any limit or the timeout is zero.
    pub fn new(config: AssemblerConfig, generator: Arc<dyn Generator>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, generator })
    }

    /// The assembler configuration.
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Number of leading hits that fit the chunk-count and character budgets.
    /// The best hit is always included.
    fn context_len(&self, hits: &[ScoredChunk]) -> usize {
        let mut used_chars = 0;
        let mut count = 0;
        for hit in hits.iter().take(self.config.max_context_chunks) {
            let len = hit.chunk.char_len();
            if count > 0 && used_chars + len > self.config.max_context_chars {
                break;
            }
            used_chars += len;
            count += 1;
        }
        count
    }

    /// Render the prompt for `question` over the hits of `retrieval` that fit.
    pub fn build_prompt<'a>(&self, question: &str, retrieval: &'a RetrievalResult) -> Prompt<'a> {
        let included = &retrieval.hits[..self.context_len(&retrieval.hits)];

        let mut text = String::from(
            "Answer the question using ONLY the context passages below. \
             Cite nothing that is not in the context. If the context does not \
             contain enough information to answer, reply exactly: \"",
        );
        text.push_str(INSUFFICIENT_CONTEXT);
        text.push_str("\"\n\nContext:\n");
        for (i, hit) in included.iter().enumerate() {
            text.push_str(&format!(
                "--- [{}] sources: {} ---\n{}\n",
                i + 1,
                hit.chunk.source_id(),
                hit.chunk.text
            ));
        }
        text.push_str("--- end of context ---\n\n");
        text.push_str(&format!("Question: {}\n{ANSWER_MARKER}", question.trim()));

        Prompt { text, included }
    }

    /// Generate an answer for `question` grounded on `retrieval`.
    ///
    /// An empty retrieval short-circuits to [`INSUFFICIENT_CONTEXT`] without
    /// calling the model.
    ///
    /// # Errors
    ///
    /// - [`RagError::ModelUnavailable`] if the generator cannot load its model.
    /// - [`RagError::Timeout`] if generation exceeds the configured timeout.
    /// - [`RagError::Generation`] for any other generation failure, including
    ///   an empty completion.
    ///
    /// Both retryable variants carry `retrieval` so the caller can retry.
    pub async fn assemble(&self, question: &str, retrieval: &RetrievalResult) -> Result<Answer> {
        if retrieval.is_empty() {
            info!(context_chunks_used = 0, "no context retrieved, skipping generation");
            return Ok(Answer {
                text: INSUFFICIENT_CONTEXT.to_string(),
                source_ids: Vec::new(),
                context_chunks_used: 0,
            });
        }

        let prompt = self.build_prompt(question, retrieval);
        debug!(
            generator = self.generator.name(),
            prompt_len = prompt.text.len(),
            context_chunks = prompt.included.len(),
            "calling generator"
        );

        let timeout = self.config.timeout();
        let generation = self.generator.generate(&prompt.text, &self.config.params);
        let completion = tokio::time::timeout(timeout, generation).await;

        let raw = match completion {
            Err(_) => {
                error!(generator = self.generator.name(), ?timeout, "generation timed out");
                return Err(RagError::Timeout {
                    elapsed: timeout,
                    retrieval: Box::new(retrieval.clone()),
                });
            }
            Ok(Err(GenerationError::ModelUnavailable { model, message })) => {
                error!(generator = self.generator.name(), %model, "generation model unavailable");
                return Err(RagError::ModelUnavailable { model, message });
            }
            Ok(Err(source)) => {
                error!(generator = self.generator.name(), error = %source, "generation failed");
                return Err(RagError::Generation { source, retrieval: Box::new(retrieval.clone()) });
            }
            Ok(Ok(raw)) => raw,
        };

        let text = extract_answer(&prompt.text, &raw);
        if text.is_empty() {
            return Err(RagError::Generation {
                source: GenerationError::EmptyCompletion,
                retrieval: Box::new(retrieval.clone()),
            });
        }

        let source_ids = prompt.source_ids();
        info!(
            context_chunks_used = prompt.included.len(),
            source_count = source_ids.len(),
            "answer assembled"
        );
        Ok(Answer { text, source_ids, context_chunks_used: prompt.included.len() })
    }
}

/// Strip an echoed prompt from `raw`, or else keep the text after the last
/// `Answer:` marker.
pub fn extract_answer(prompt: &str, raw: &str) -> String {
    let completion = raw.strip_prefix(prompt).unwrap_or(raw);
    let completion = match completion.rfind(ANSWER_MARKER) {
        Some(pos) => &completion[pos + ANSWER_MARKER.len()..],
        None => completion,
    };
    completion.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationParams;
    use crate::document::{Chunk, RetrievalStrategy};
    use async_trait::async_trait;
    use std::time::Duration;

    fn hit(text: &str, ids: &[&str]) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                text: text.to_string(),
                source_ids: ids.iter().map(|s| s.to_string()).collect(),
                sequence_index: 0,
                overlap_len: 0,
            },
            score: 0.5,
        }
    }

    fn retrieval(hits: Vec<ScoredChunk>) -> RetrievalResult {
        RetrievalResult { hits, strategy: RetrievalStrategy::Similarity }
    }

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> std::result::Result<String, GenerationError> {
            Ok(format!("{prompt} Paris.\n"))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl Generator for SlowGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> std::result::Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".into())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    struct MissingModelGenerator;

    #[async_trait]
    impl Generator for MissingModelGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> std::result::Result<String, GenerationError> {
            Err(GenerationError::ModelUnavailable {
                model: "missing-model".into(),
                message: "weights not found".into(),
            })
        }

        fn name(&self) -> &str {
            "missing"
        }
    }

    fn assembler(generator: Arc<dyn Generator>, config: AssemblerConfig) -> AnswerAssembler {
        AnswerAssembler::new(config, generator).unwrap()
    }

    #[test]
    fn prompt_delimits_each_chunk_with_its_sources() {
        let asm = assembler(Arc::new(EchoGenerator), AssemblerConfig::default());
        let r =
            retrieval(vec![hit("Alpha text.", &["1.1_p1", "1.1_p2"]), hit("Beta.", &["2_p1"])]);
        let prompt = asm.build_prompt("What is alpha?", &r);
        assert!(prompt.text.contains("--- [1] sources: 1.1_p1,1.1_p2 ---\nAlpha text.\n"));
        assert!(prompt.text.contains("--- [2] sources: 2_p1 ---\nBeta.\n"));
        assert!(prompt.text.contains(INSUFFICIENT_CONTEXT));
        assert!(prompt.text.ends_with("Question: What is alpha?\nAnswer:"));
        assert_eq!(prompt.source_ids(), vec!["1.1_p1", "1.1_p2", "2_p1"]);
    }

    #[test]
    fn context_budget_limits_included_chunks() {
        let config =
            AssemblerConfig { max_context_chunks: 3, max_context_chars: 10, ..Default::default() };
        let asm = assembler(Arc::new(EchoGenerator), config);
        let r = retrieval(vec![hit("123456", &["a"]), hit("1234", &["b"]), hit("1", &["c"])]);
        let prompt = asm.build_prompt("q", &r);
        assert_eq!(prompt.included.len(), 2);
        assert_eq!(prompt.source_ids(), vec!["a", "b"]);

        let config = AssemblerConfig { max_context_chunks: 1, ..Default::default() };
        let asm = assembler(Arc::new(EchoGenerator), config);
        assert_eq!(asm.build_prompt("q", &r).included.len(), 1);
    }

    #[test]
    fn oversized_best_hit_is_still_included() {
        let config = AssemblerConfig { max_context_chars: 3, ..Default::default() };
        let asm = assembler(Arc::new(EchoGenerator), config);
        let r = retrieval(vec![hit("much longer than three", &["a"]), hit("x", &["b"])]);
        assert_eq!(asm.build_prompt("q", &r).source_ids(), vec!["a"]);
    }

    #[tokio::test]
    async fn echoed_prompt_is_stripped() {
        let asm = assembler(Arc::new(EchoGenerator), AssemblerConfig::default());
        let r = retrieval(vec![hit("Paris is the capital of France.", &["p1"])]);
        let answer = asm.assemble("What is the capital of France?", &r).await.unwrap();
        assert_eq!(answer.text, "Paris.");
        assert_eq!(answer.source_ids, vec!["p1"]);
        assert_eq!(answer.context_chunks_used, 1);
    }

    #[tokio::test]
    async fn empty_retrieval_reports_insufficient_context() {
        let asm = assembler(Arc::new(SlowGenerator), AssemblerConfig::default());
        let answer = asm.assemble("q", &retrieval(Vec::new())).await.unwrap();
        assert_eq!(answer.text, INSUFFICIENT_CONTEXT);
        assert!(answer.source_ids.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_generation_times_out_with_retrieval_preserved() {
        let config = AssemblerConfig { timeout_secs: 5, ..Default::default() };
        let asm = assembler(Arc::new(SlowGenerator), config);
        let r = retrieval(vec![hit("ctx", &["p1"])]);
        let err = asm.assemble("q", &r).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::Timeout { elapsed, .. } if elapsed == Duration::from_secs(5)
        ));
        assert_eq!(err.retrieval(), Some(&r));
    }

    #[tokio::test]
    async fn unavailable_model_is_fatal_and_not_retryable() {
        let asm = assembler(Arc::new(MissingModelGenerator), AssemblerConfig::default());
        let err = asm.assemble("q", &retrieval(vec![hit("ctx", &["p1"])])).await.unwrap_err();
        assert!(matches!(
            &err,
            RagError::ModelUnavailable { model, .. } if model == "missing-model"
        ));
        assert_eq!(err.kind().as_str(), "model_unavailable");
        assert!(!err.is_retryable());
        assert!(err.retrieval().is_none());
    }

    #[test]
    fn extract_answer_uses_last_marker() {
        assert_eq!(extract_answer("P", "Question: x\nAnswer: y\nAnswer:  z "), "z");
        assert_eq!(extract_answer("P", "  plain  "), "plain");
        assert_eq!(extract_answer("P", "P\nAnswer:"), "");
    }
}
