//! Front-matter removal.
//!
//! Drops chunks that end before the first content page or whose lowercased text mentions a
//! front-matter marker anywhere. Survivors keep their original `chunk_id`.

use super::types::{ChunkRecord, FilterOutcome};
use crate::config::Config;
use regex::RegexSet;

/// Patterns searched (not anchored) in the lowercased chunk text.
pub const FRONT_MATTER_PATTERNS: &[&str] = &[
    r"isbn",
    r"library of congress",
    r"springer",
    r"all rights reserved",
    r"printed in",
    r"series editors",
    r"preface",
    r"acknowledg",
    r"dedicated to",
    r"http://",
    r"www\.",
];

/// Classifies chunks as front matter.
#[derive(Debug, Clone)]
pub struct FrontMatterFilter {
    min_page: u32,
    patterns: RegexSet,
}

impl FrontMatterFilter {
    /// Build a filter with the default pattern list.
    pub fn new(min_page: u32) -> Self {
        let patterns =
            RegexSet::new(FRONT_MATTER_PATTERNS).expect("front matter patterns are valid regexes");
        Self { min_page, patterns }
    }

    /// Build a filter from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.front_matter_min_page)
    }

    /// Return `true` when the chunk should be dropped.
    pub fn is_front_matter(&self, chunk: &ChunkRecord) -> bool {
        if chunk.page_end < self.min_page {
            return true;
        }
        self.patterns.is_match(&chunk.text.to_lowercase())
    }

    /// Keep non-front-matter chunks in their original order.
    pub fn apply(&self, chunks: Vec<ChunkRecord>) -> (Vec<ChunkRecord>, FilterOutcome) {
        let total = chunks.len();
        let kept: Vec<ChunkRecord> = chunks
            .into_iter()
            .filter(|chunk| {
                let drop = self.is_front_matter(chunk);
                if drop {
                    tracing::trace!(chunk_id = chunk.chunk_id, "Dropping front matter chunk");
                }
                !drop
            })
            .collect();

        let outcome = FilterOutcome {
            removed: total - kept.len(),
            kept: kept.len(),
        };
        (kept, outcome)
    }
}

impl Default for FrontMatterFilter {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(chunk_id: u64, page_end: u32, text: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id,
            text: text.to_string(),
            page_start: page_end.saturating_sub(1).max(1),
            page_end,
            math_density: 0,
        }
    }

    #[test]
    fn early_pages_are_always_front_matter() {
        let filter = FrontMatterFilter::default();
        assert!(filter.is_front_matter(&chunk(0, 5, "Bayesian inference for the mean")));
    }

    #[test]
    fn keyword_anywhere_marks_front_matter() {
        let filter = FrontMatterFilter::default();
        assert!(filter.is_front_matter(&chunk(1, 50, "Printed copy. ISBN 978-0-387-31073-2")));
        assert!(filter.is_front_matter(&chunk(2, 50, "see WWW.example.org for errata")));
        assert!(filter.is_front_matter(&chunk(3, 50, "We Acknowledge the reviewers")));
    }

    #[test]
    fn technical_text_is_kept() {
        let filter = FrontMatterFilter::default();
        let text = "The posterior distribution is proportional to the likelihood times the prior.";
        assert!(!filter.is_front_matter(&chunk(4, 50, text)));
    }

    #[test]
    fn apply_preserves_order_and_original_ids() {
        let filter = FrontMatterFilter::default();
        let chunks = vec![
            chunk(0, 3, "contents"),
            chunk(1, 12, "linear regression"),
            chunk(2, 13, "all rights reserved"),
            chunk(3, 14, "kernel methods"),
        ];

        let (kept, outcome) = filter.apply(chunks);
        let ids: Vec<u64> = kept.iter().map(|chunk| chunk.chunk_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(outcome, FilterOutcome { removed: 2, kept: 2 });
    }
}
