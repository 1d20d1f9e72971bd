//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`ElementChunker`], which
//! greedily packs consecutive [`SourceElement`]s into bounded chunks while
//! keeping the source id of every element it packs.

use std::collections::HashSet;

use crate::config::ChunkingConfig;
use crate::document::{Chunk, ELEMENT_SEPARATOR, SourceElement};
use crate::error::{RagError, Result};

/// A strategy for splitting a document's elements into chunks.
///
/// Implementations are pure: the same input and configuration always
/// produce the same chunk sequence.
pub trait Chunker: Send + Sync {
    /// Split an ordered element sequence into chunks.
    ///
    /// Returns an empty `Vec` if there is no non-empty element text.
    fn chunk(&self, elements: &[SourceElement]) -> Result<Vec<Chunk>>;
}

/// Packs whole elements into chunks of at most `max_chunk_chars` characters.
///
/// Elements are joined with a single space and are never split. An element
/// longer than the budget becomes its own oversized chunk instead of being
/// truncated. When `overlap_chars > 0`, each new chunk is seeded with the
/// trailing `overlap_chars` characters of the previous one, provided the seed
/// and the next element fit the budget together; a previous element's source
/// id is repeated only when that element starts inside the seeded region.
///
/// Element text is trimmed first. An element that is blank after trimming
/// carries no content, so it is skipped and its source id appears on no
/// chunk. Every element with text keeps its source id.
///
/// # Example
///
/// ```rust,ignore
/// use llmrag::{ChunkingConfig, ElementChunker, Chunker, SourceElement};
///
/// let chunker = ElementChunker::new(ChunkingConfig { max_chunk_chars: 500, overlap_chars: 0 })?;
/// let chunks = chunker.chunk(&[SourceElement::new("Some text.", "p1")])?;
/// assert_eq!(chunks[0].source_ids, vec!["p1"]);
/// ```
#[derive(Debug, Clone)]
pub struct ElementChunker {
    config: ChunkingConfig,
}

impl ElementChunker {
    /// Create a new `ElementChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `max_chunk_chars == 0` or
    /// `overlap_chars >= max_chunk_chars`.
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The chunker configuration.
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }
}

/// The chunk under construction.
struct Pending {
    text: String,
    len: usize,
    /// `(char offset, source id)` of every element starting in this chunk.
    starts: Vec<(usize, String)>,
    overlap_len: usize,
}

impl Pending {
    fn from_element(text: &str, len: usize, source_id: &str) -> Self {
        Self {
            text: text.to_string(),
            len,
            starts: vec![(0, source_id.to_string())],
            overlap_len: 0,
        }
    }

    fn push(&mut self, text: &str, len: usize, source_id: &str) {
        self.text.push_str(ELEMENT_SEPARATOR);
        self.text.push_str(text);
        let offset = self.len + 1;
        self.len = offset + len;
        self.starts.push((offset, source_id.to_string()));
    }

    /// Seed for the next chunk: the trimmed tail text, its length, and the
    /// elements starting inside the tail (with offsets relative to the seed).
    fn overlap_seed(&self, overlap: usize) -> Option<(String, usize, Vec<(usize, String)>)> {
        if overlap == 0 {
            return None;
        }
        let region_start = self.len.saturating_sub(overlap);
        let tail: String = self.text.chars().skip(region_start).collect();
        let seed = tail.trim_start();
        let seed_len = seed.chars().count();
        if seed_len == 0 {
            return None;
        }
        let seed_start = self.len - seed_len;
        let carried = self
            .starts
            .iter()
            .filter(|(offset, _)| *offset >= seed_start)
            .map(|(offset, id)| (offset - seed_start, id.clone()))
            .collect();
        Some((seed.to_string(), seed_len, carried))
    }

    fn finish(self, sequence_index: usize) -> Chunk {
        Chunk {
            text: self.text,
            source_ids: self.starts.into_iter().map(|(_, id)| id).collect(),
            sequence_index,
            overlap_len: self.overlap_len,
        }
    }
}

impl Chunker for ElementChunker {
    fn chunk(&self, elements: &[SourceElement]) -> Result<Vec<Chunk>> {
        let mut seen = HashSet::with_capacity(elements.len());
        for element in elements {
            if element.source_id.trim().is_empty() {
                return Err(RagError::ChunkingError("element has an empty source_id".into()));
            }
            if !seen.insert(element.source_id.as_str()) {
                return Err(RagError::ChunkingError(format!(
                    "duplicate source_id '{}'",
                    element.source_id
                )));
            }
        }

        let max = self.config.max_chunk_chars;
        let mut chunks = Vec::new();
        let mut current: Option<Pending> = None;

        for element in elements {
            let text = element.text.trim();
            if text.is_empty() {
                continue;
            }
            let len = text.chars().count();

            let Some(mut pending) = current.take() else {
                current = Some(Pending::from_element(text, len, &element.source_id));
                continue;
            };

            if pending.len + 1 + len <= max {
                pending.push(text, len, &element.source_id);
                current = Some(pending);
                continue;
            }

            // Overflow: close the pending chunk and start the next one.
            let seed = pending.overlap_seed(self.config.overlap_chars);
            chunks.push(pending.finish(chunks.len()));

            let next = match seed {
                Some((seed_text, seed_len, carried)) if seed_len + 1 + len <= max => {
                    let mut next = Pending {
                        text: seed_text,
                        len: seed_len,
                        starts: carried,
                        overlap_len: seed_len + 1,
                    };
                    next.push(text, len, &element.source_id);
                    next
                }
                _ => Pending::from_element(text, len, &element.source_id),
            };
            current = Some(next);
        }

        if let Some(pending) = current {
            chunks.push(pending.finish(chunks.len()));
        }

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max_chunk_chars: usize, overlap_chars: usize) -> ElementChunker {
        ElementChunker::new(ChunkingConfig { max_chunk_chars, overlap_chars }).unwrap()
    }

    fn elements(items: &[(&str, &str)]) -> Vec<SourceElement> {
        items.iter().map(|(t, id)| SourceElement::new(*t, *id)).collect()
    }

    #[test]
    fn rejects_invalid_configuration() {
        let err = ElementChunker::new(ChunkingConfig { max_chunk_chars: 10, overlap_chars: 10 });
        assert!(matches!(err, Err(RagError::ConfigError(_))));
        let err = ElementChunker::new(ChunkingConfig { max_chunk_chars: 0, overlap_chars: 0 });
        assert!(matches!(err, Err(RagError::ConfigError(_))));
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunker(10, 0).chunk(&[]).unwrap().is_empty());
        let blank = elements(&[("   ", "p1"), ("", "p2")]);
        assert!(chunker(10, 0).chunk(&blank).unwrap().is_empty());
    }

    #[test]
    fn packs_elements_until_the_budget_is_reached() {
        let input = elements(&[("aaaa", "a"), ("bbbb", "b"), ("cccc", "c")]);
        let chunks = chunker(9, 0).chunk(&input).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "aaaa bbbb");
        assert_eq!(chunks[0].source_ids, vec!["a", "b"]);
        assert_eq!(chunks[0].source_id(), "a,b");
        assert_eq!(chunks[1].text, "cccc");
        assert_eq!(chunks[1].source_ids, vec!["c"]);
        assert_eq!(chunks[1].sequence_index, 1);
    }

    #[test]
    fn overlap_carries_ids_of_elements_starting_in_the_region() {
        let input = elements(&[("aaaa", "a"), ("bbbb", "b"), ("cccc", "c")]);
        let chunks = chunker(12, 4).chunk(&input).unwrap();
        assert_eq!(chunks[1].text, "bbbb cccc");
        assert_eq!(chunks[1].source_ids, vec!["b", "c"]);
        assert_eq!(chunks[1].overlap_len, 5);
        assert_eq!(chunks[1].fresh_text(), "cccc");
    }

    #[test]
    fn overlap_inside_an_element_does_not_repeat_its_id() {
        let input = elements(&[("aaaa", "a"), ("bbbb", "b"), ("cccc", "c")]);
        let chunks = chunker(12, 3).chunk(&input).unwrap();
        assert_eq!(chunks[1].text, "bbb cccc");
        assert_eq!(chunks[1].source_ids, vec!["c"]);
        assert_eq!(chunks[1].fresh_text(), "cccc");
    }

    #[test]
    fn overlap_is_dropped_when_it_would_overflow() {
        let input = elements(&[("aaaa", "a"), ("bbbbbbbb", "b")]);
        let chunks = chunker(10, 4).chunk(&input).unwrap();
        assert_eq!(chunks[1].text, "bbbbbbbb");
        assert_eq!(chunks[1].overlap_len, 0);
    }

    #[test]
    fn oversized_element_is_kept_whole() {
        let input =
            elements(&[("short", "a"), ("this element is far too long", "b"), ("end", "c")]);
        let chunks = chunker(10, 0).chunk(&input).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, "this element is far too long");
        assert_eq!(chunks[1].source_ids, vec!["b"]);
    }

    #[test]
    fn lengths_are_counted_in_characters() {
        let input = elements(&[("éééé", "a"), ("üüüü", "b")]);
        let chunks = chunker(9, 2).chunk(&input).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].char_len(), 9);
    }

    #[test]
    fn duplicate_or_empty_source_ids_are_rejected() {
        let dup = elements(&[("x", "p1"), ("y", "p1")]);
        assert!(matches!(chunker(10, 0).chunk(&dup), Err(RagError::ChunkingError(_))));
        let empty = elements(&[("x", " ")]);
        assert!(matches!(chunker(10, 0).chunk(&empty), Err(RagError::ChunkingError(_))));
    }
}
