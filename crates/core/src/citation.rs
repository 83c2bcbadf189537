use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::event::Citation;
use crate::retrieval::Chunk;

static CITATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([0-9]+)\]").expect("hardcoded regex"));

/// Resolves the `[n]` markers of an answer against the retrieved passages.
///
/// Each number is cited once, in order of first appearance. Numbers outside
/// `1..=chunks.len()` are dropped.
pub fn extract_citations(answer: &str, chunks: &[Chunk]) -> Vec<Citation> {
    let mut seen = HashSet::new();
    CITATION_MARKER
        .captures_iter(answer)
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .filter(|number| (1..=chunks.len()).contains(number))
        .filter(|number| seen.insert(*number))
        .map(|number| {
            let chunk = &chunks[number - 1];
            Citation {
                number,
                content: chunk.content.clone(),
                source: chunk.source.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(n: usize) -> Vec<Chunk> {
        (1..=n)
            .map(|i| Chunk {
                content: format!("excerpt {i}"),
                source: format!("doc{i}.md"),
            })
            .collect()
    }

    fn numbers(citations: &[Citation]) -> Vec<usize> {
        citations.iter().map(|c| c.number).collect()
    }

    #[test]
    fn test_out_of_range_dropped() {
        let citations = extract_citations("A[1] and B[5]", &chunks(3));
        assert_eq!(
            citations,
            vec![Citation {
                number: 1,
                content: "excerpt 1".to_owned(),
                source: "doc1.md".to_owned(),
            }]
        );
        assert!(extract_citations("see [0]", &chunks(3)).is_empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        let citations = extract_citations("[2] again [2]", &chunks(2));
        assert_eq!(numbers(&citations), vec![2]);
        assert_eq!(citations[0].source, "doc2.md");

        let citations = extract_citations("[3] then [1] then [3][1]", &chunks(3));
        assert_eq!(numbers(&citations), vec![3, 1]);
    }

    #[test]
    fn test_no_markers() {
        assert!(extract_citations("No references here.", &chunks(3)).is_empty());
        assert!(extract_citations("[a] [] [1.5 ] [ 2]", &chunks(3)).is_empty());
    }

    #[test]
    fn test_zero_chunks() {
        assert!(extract_citations("Pre-rotation [1] [2]", &[]).is_empty());
    }

    #[test]
    fn test_overflowing_marker() {
        let answer = "[99999999999999999999999999] and [1]";
        assert_eq!(numbers(&extract_citations(answer, &chunks(1))), vec![1]);
    }
}
