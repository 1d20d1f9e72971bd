//! Property tests for element chunking.

use std::collections::BTreeSet;

use llmrag::chunking::{Chunker, ElementChunker};
use llmrag::config::ChunkingConfig;
use llmrag::document::{ELEMENT_SEPARATOR, SourceElement};
use proptest::prelude::*;

/// Generate an element text of one or more lowercase words, pre-trimmed.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-zé]{1,12}", 1..6).prop_map(|words| words.join(" "))
}

/// Generate a document of elements with unique ids `p1..pn`.
fn arb_elements() -> impl Strategy<Value = Vec<SourceElement>> {
    proptest::collection::vec(arb_text(), 0..25).prop_map(|texts| {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| SourceElement::new(text, format!("p{}", i + 1)))
            .collect()
    })
}

/// Generate a valid `(max_chunk_chars, overlap_chars)` pair.
fn arb_config() -> impl Strategy<Value = ChunkingConfig> {
    (1usize..120)
        .prop_flat_map(|max| (Just(max), 0..max))
        .prop_map(|(max_chunk_chars, overlap_chars)| ChunkingConfig {
            max_chunk_chars,
            overlap_chars,
        })
}

/// **Property 1: Source attribution is never lost**
/// *For any* document and valid configuration, the union of source ids over
/// all chunks SHALL equal the set of input source ids, and every chunk longer
/// than `max_chunk_chars` SHALL consist of exactly one input element.
mod prop_attribution_and_bounds {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn source_ids_preserved_and_length_bounded(
            elements in arb_elements(),
            config in arb_config(),
        ) {
            let max = config.max_chunk_chars;
            let chunks = ElementChunker::new(config).unwrap().chunk(&elements).unwrap();

            let input: BTreeSet<&str> = elements.iter().map(|e| e.source_id.as_str()).collect();
            let output: BTreeSet<&str> =
                chunks.iter().flat_map(|c| c.source_ids.iter().map(String::as_str)).collect();
            prop_assert_eq!(input, output);

            for chunk in &chunks {
                prop_assert!(!chunk.text.is_empty());
                if chunk.char_len() > max {
                    prop_assert_eq!(chunk.source_ids.len(), 1);
                    prop_assert_eq!(chunk.overlap_len, 0);
                    let original = elements
                        .iter()
                        .find(|e| e.source_id == chunk.source_ids[0])
                        .unwrap();
                    prop_assert_eq!(&chunk.text, &original.text);
                }
            }

            if elements.is_empty() {
                prop_assert!(chunks.is_empty());
            }
        }
    }
}

/// **Property 2: Chunking is deterministic and reversible**
/// *For any* document and valid configuration, chunking twice SHALL yield the
/// same sequence, and joining the non-overlapping text of every chunk SHALL
/// reconstruct the joined element texts.
mod prop_determinism_and_reconstruction {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn rechunking_is_identical_and_reconstructs_text(
            elements in arb_elements(),
            config in arb_config(),
        ) {
            let chunker = ElementChunker::new(config).unwrap();
            let first = chunker.chunk(&elements).unwrap();
            let second = chunker.chunk(&elements).unwrap();
            prop_assert_eq!(&first, &second);

            let original: Vec<&str> = elements.iter().map(|e| e.text.as_str()).collect();
            let rebuilt: Vec<&str> = first.iter().map(|c| c.fresh_text()).collect();
            prop_assert_eq!(rebuilt.join(ELEMENT_SEPARATOR), original.join(ELEMENT_SEPARATOR));

            for (i, chunk) in first.iter().enumerate() {
                prop_assert_eq!(chunk.sequence_index, i);
            }
        }
    }
}

/// **Property 3: Overlap continues the previous chunk**
/// *For any* chunk seeded with overlap, its overlapping prefix SHALL be a
/// suffix of the previous chunk's text no longer than `overlap_chars`.
mod prop_overlap_is_a_suffix {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn overlap_prefix_is_previous_suffix(
            elements in arb_elements(),
            config in arb_config(),
        ) {
            let overlap = config.overlap_chars;
            let chunks = ElementChunker::new(config).unwrap().chunk(&elements).unwrap();

            for pair in chunks.windows(2) {
                let (previous, next) = (&pair[0], &pair[1]);
                if next.overlap_len == 0 {
                    continue;
                }
                let seed_len = next.overlap_len - 1;
                prop_assert!(seed_len <= overlap);
                let seed: String = next.text.chars().take(seed_len).collect();
                prop_assert!(previous.text.ends_with(&seed));
            }
        }
    }
}

#[test]
fn empty_and_blank_elements_produce_no_chunks() {
    let chunker = ElementChunker::new(ChunkingConfig::default()).unwrap();
    assert!(chunker.chunk(&[]).unwrap().is_empty());
    let blank = [SourceElement::new("   ", "p1"), SourceElement::new("", "p2")];
    assert!(chunker.chunk(&blank).unwrap().is_empty());
}

#[test]
fn blank_elements_contribute_no_source_id() {
    let chunker = ElementChunker::new(ChunkingConfig::default()).unwrap();
    let elements = [
        SourceElement::new("Heading", "h1"),
        SourceElement::new("  ", "p1"),
        SourceElement::new("Body text.", "p2"),
    ];
    let chunks = chunker.chunk(&elements).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].source_ids, vec!["h1", "p2"]);
    assert_eq!(chunks[0].text, "Heading Body text.");
}
