use std::fmt::Write;

use extrato_core::UNCATEGORIZED;

use crate::backend::ClassifyRequest;
use crate::types::Classification;

/// Render the few-shot instruction sent to a text-completion provider.
pub fn build_prompt(request: &ClassifyRequest) -> String {
    let mut prompt =
        String::from("Categorize the following bank statement transaction into one category.\n\n");

    if !request.examples.is_empty() {
        prompt.push_str("Examples:\n");
        for ex in &request.examples {
            let _ = writeln!(prompt, "\"{}\" -> {}", ex.pattern, ex.category);
        }
        prompt.push('\n');
    }

    let _ = writeln!(prompt, "Transaction:\n\"{}\"\n", request.description);

    if !request.candidate_labels.is_empty() {
        prompt.push_str("Available categories:\n");
        for label in &request.candidate_labels {
            let _ = writeln!(prompt, "- {label}");
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "Answer with the category name only, no explanation. \
         If none applies, answer UNKNOWN.",
    );
    prompt
}

/// Map a provider answer onto a label.
///
/// With candidates: a case-insensitive exact match wins, otherwise the first
/// candidate (in list order) mentioned anywhere in the answer. Without
/// candidates, a non-empty single-line answer is taken verbatim. The
/// reserved uncategorized label is never a valid answer.
pub fn extract_label(response: &str, candidates: &[String]) -> Classification {
    let answer = response
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '*')
        .trim();
    let lowered = answer.to_lowercase();

    if answer.is_empty() || lowered == "unknown" || answer.eq_ignore_ascii_case(UNCATEGORIZED) {
        return Classification::Unclassified;
    }

    if candidates.is_empty() {
        if answer.lines().count() == 1 {
            return Classification::Category(answer.to_string());
        }
        return Classification::Unclassified;
    }

    if let Some(c) = candidates.iter().find(|c| c.to_lowercase() == lowered) {
        return Classification::Category(c.clone());
    }

    candidates
        .iter()
        .find(|c| lowered.contains(&c.to_lowercase()))
        .map(|c| Classification::Category(c.clone()))
        .unwrap_or(Classification::Unclassified)
}
