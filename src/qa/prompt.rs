//! Prompt assembly and answer post-processing.

use std::collections::HashSet;

const ANSWER_MARKER: &str = "Answer:";

/// Build the per-chunk prompt. The prompt always ends with the `Answer:` marker.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant. Use ONLY the following text to answer the question.\n\
         Include explanations and equations if present.\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n{ANSWER_MARKER}"
    )
}

/// Return the trimmed text after the last `Answer:` marker, or the whole trimmed text.
pub fn extract_answer(generated: &str) -> &str {
    match generated.rfind(ANSWER_MARKER) {
        Some(position) => generated[position + ANSWER_MARKER.len()..].trim(),
        None => generated.trim(),
    }
}

/// Keep the first occurrence of each non-empty line, preserving order.
///
/// Lines are compared exactly; blank and whitespace-only lines are dropped.
pub fn dedupe_lines(text: &str) -> String {
    let mut seen = HashSet::new();
    text.split('\n')
        .filter(|line| !line.trim().is_empty() && seen.insert(*line))
        .collect::<Vec<_>>()
        .join("\n")
}
