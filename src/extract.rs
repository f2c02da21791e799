//! PDF page extraction.
//!
//! Text comes from `lopdf`; everything after that (normalization, empty-page skipping, math
//! density) is plain string work so it can be exercised without a PDF on disk.

use crate::processing::types::PageRecord;
use lopdf::Document;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Symbols counted towards a page's math density.
pub const MATH_SYMBOLS: &[char] = &['=', '∑', '∫', 'θ', 'λ', 'μ', 'σ'];

/// Errors raised while reading the source document.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The PDF could not be opened or parsed.
    #[error("failed to open PDF {path}: {source}")]
    Open {
        /// Document path.
        path: PathBuf,
        /// Error reported by the PDF library.
        #[source]
        source: lopdf::Error,
    },
}

/// Extract one [`PageRecord`] per non-empty page, in document order.
///
/// Fails as a whole when the document cannot be opened. A page whose text cannot be decoded is
/// logged and treated like an empty page.
pub fn extract_pages(path: &Path) -> Result<Vec<PageRecord>, ExtractError> {
    let document = Document::load(path).map_err(|source| ExtractError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    tracing::info!(
        path = %path.display(),
        pages = page_numbers.len(),
        "Extracting PDF pages"
    );

    let raw_pages = page_numbers.into_iter().map(|number| {
        let text = document.extract_text(&[number]).unwrap_or_else(|error| {
            tracing::warn!(page = number, error = %error, "Page text extraction failed; skipping");
            String::new()
        });
        (number, text)
    });

    Ok(pages_from_text(raw_pages))
}

/// Build page records from `(page number, raw text)` pairs, skipping blank pages.
pub fn pages_from_text<I>(raw_pages: I) -> Vec<PageRecord>
where
    I: IntoIterator<Item = (u32, String)>,
{
    let mut pages: Vec<PageRecord> = raw_pages
        .into_iter()
        .filter(|(_, raw)| !raw.trim().is_empty())
        .map(|(page, raw)| {
            let text = clean_text(&raw);
            let math_density = math_density(&text);
            PageRecord {
                page,
                text,
                math_density,
            }
        })
        .collect();
    pages.sort_by_key(|record| record.page);
    pages
}

/// Collapse whitespace runs to single spaces, replace non-breaking spaces, and trim.
pub fn clean_text(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Count occurrences of [`MATH_SYMBOLS`] in the text.
pub fn math_density(text: &str) -> u64 {
    text.chars().filter(|c| MATH_SYMBOLS.contains(c)).count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_collapses_whitespace_and_nbsp() {
        assert_eq!(
            clean_text("  Linear\u{a0}\u{a0}models\n\n for\tregression  "),
            "Linear models for regression"
        );
    }

    #[test]
    fn math_density_counts_each_symbol_occurrence() {
        assert_eq!(math_density("y = θx + μ, σ = ∑ λ ∫"), 7);
        assert_eq!(math_density("no math here"), 0);
    }

    #[test]
    fn blank_pages_are_skipped_and_numbers_kept() {
        let pages = pages_from_text(vec![
            (2, "second  page".to_string()),
            (1, "first = page".to_string()),
            (3, " \n\t ".to_string()),
            (4, "fourth".to_string()),
        ]);

        let numbers: Vec<u32> = pages.iter().map(|page| page.page).collect();
        assert_eq!(numbers, vec![1, 2, 4]);
        assert_eq!(pages[0].math_density, 1);
        assert_eq!(pages[1].text, "second page");
    }

    #[test]
    fn missing_document_is_fatal() {
        let error = extract_pages(Path::new("/nonexistent/book.pdf")).unwrap_err();
        assert!(matches!(error, ExtractError::Open { .. }));
    }
}
