use std::fmt;

use extrato_core::{CategorizationResult, Category, MatchedBy, NormalizedTransaction};
use serde::{Deserialize, Serialize};

use crate::rules::{CategoryRule, RuleSet};
use crate::util::{lcs_len, levenshtein_distance};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuzzyMetric {
    /// Sorted tokens, then `2 * LCS / (len_a + len_b)`. Tolerates word
    /// reordering and dropped characters.
    #[default]
    TokenSort,
    /// `1 - edit_distance / max_len`.
    Levenshtein,
}

impl FuzzyMetric {
    pub fn score(self, a: &str, b: &str) -> f64 {
        match self {
            FuzzyMetric::TokenSort => token_sort_ratio(a, b),
            FuzzyMetric::Levenshtein => levenshtein_ratio(a, b),
        }
    }
}

impl fmt::Display for FuzzyMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuzzyMetric::TokenSort => write!(f, "token_sort"),
            FuzzyMetric::Levenshtein => write!(f, "levenshtein"),
        }
    }
}

pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let (a, b) = (sort_tokens(a), sort_tokens(b));
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(&a, &b)) as f64 / total as f64
}

pub fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f64 / max_len as f64
}

fn sort_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Approximate tier: best-scoring single pattern, accepted when its score
/// reaches the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatcher {
    threshold: f64,
    metric: FuzzyMetric,
}

impl FuzzyMatcher {
    pub fn new(threshold: f64, metric: FuzzyMetric) -> Self {
        Self { threshold, metric }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn metric(&self) -> FuzzyMetric {
        self.metric
    }

    /// Highest-scoring rule regardless of threshold. Ties go to the earlier
    /// rule.
    pub fn best<'r>(&self, description: &str, rules: &'r RuleSet) -> Option<(&'r CategoryRule, f64)> {
        let mut best: Option<(&CategoryRule, f64)> = None;
        for rule in rules.rules() {
            let score = self.metric.score(description, &rule.pattern);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((rule, score));
            }
        }
        best
    }

    pub fn match_fuzzy(&self, tx: &NormalizedTransaction, rules: &RuleSet) -> Option<CategorizationResult> {
        let (rule, score) = self.best(&tx.description, rules)?;
        if score < self.threshold {
            tracing::debug!(description = %tx.description, best = %rule.source_pattern, score, "fuzzy miss");
            return None;
        }
        tracing::debug!(description = %tx.description, pattern = %rule.source_pattern, score, "fuzzy hit");
        Some(CategorizationResult {
            transaction: tx.clone(),
            category: Category::named(&rule.category),
            matched_by: MatchedBy::Fuzzy,
            confidence: score,
            matched_pattern: Some(rule.source_pattern.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tx(description: &str) -> NormalizedTransaction {
        NormalizedTransaction {
            date: None,
            description: description.to_string(),
            original_description: description.to_string(),
            amount: None,
            source_file: "test.pdf".into(),
            issues: Vec::new(),
        }
    }

    fn make_rules(pairs: &[(&str, &str)]) -> RuleSet {
        RuleSet::from_pairs(pairs.iter().copied()).0
    }

    // ── metrics ───────────────────────────────────────────────────────────────

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(token_sort_ratio("posto shell", "posto shell"), 1.0);
        assert_eq!(levenshtein_ratio("posto shell", "posto shell"), 1.0);
    }

    #[test]
    fn empty_only_matches_empty() {
        assert_eq!(token_sort_ratio("", ""), 1.0);
        assert_eq!(levenshtein_ratio("", ""), 1.0);
        assert_eq!(token_sort_ratio("", "abc"), 0.0);
        assert_eq!(levenshtein_ratio("abc", ""), 0.0);
    }

    #[test]
    fn token_sort_ignores_word_order() {
        assert_eq!(token_sort_ratio("shell posto", "posto shell"), 1.0);
        assert!(levenshtein_ratio("shell posto", "posto shell") < 1.0);
    }

    #[test]
    fn tolerates_ocr_noise() {
        assert!(token_sort_ratio("supermercad0 abc", "supermercado abc") > 0.9);
        assert!(levenshtein_ratio("supermercad0 abc", "supermercado abc") > 0.9);
    }

    #[test]
    fn known_ratios() {
        assert_eq!(token_sort_ratio("abcd", "abce"), 0.75);
        assert_eq!(levenshtein_ratio("abcd", "abce"), 0.75);
    }

    // ── FuzzyMatcher ──────────────────────────────────────────────────────────

    #[test]
    fn score_equal_to_threshold_matches() {
        let rules = make_rules(&[("abce", "Teste")]);
        let m = FuzzyMatcher::new(0.75, FuzzyMetric::TokenSort);
        let hit = m.match_fuzzy(&make_tx("abcd"), &rules).unwrap();
        assert_eq!(hit.matched_by, MatchedBy::Fuzzy);
        assert_eq!(hit.confidence, 0.75);
        assert_eq!(hit.matched_pattern.as_deref(), Some("abce"));
    }

    #[test]
    fn score_below_threshold_misses() {
        let rules = make_rules(&[("abce", "Teste")]);
        let m = FuzzyMatcher::new(0.7501, FuzzyMetric::TokenSort);
        assert!(m.match_fuzzy(&make_tx("abcd"), &rules).is_none());
    }

    #[test]
    fn tie_goes_to_earlier_rule() {
        let rules = make_rules(&[("abce", "Primeira"), ("abcf", "Segunda")]);
        let m = FuzzyMatcher::new(0.5, FuzzyMetric::Levenshtein);
        let hit = m.match_fuzzy(&make_tx("abcd"), &rules).unwrap();
        assert_eq!(hit.category, Category::named("Primeira"));
    }

    #[test]
    fn highest_score_wins_over_position() {
        let rules = make_rules(&[("*netflix*", "Lazer"), ("*supermercado*", "Alimentação")]);
        let m = FuzzyMatcher::new(0.6, FuzzyMetric::TokenSort);
        let hit = m.match_fuzzy(&make_tx("supermercad"), &rules).unwrap();
        assert_eq!(hit.category, Category::named("Alimentação"));
    }

    #[test]
    fn empty_rule_set_misses() {
        let m = FuzzyMatcher::new(0.0, FuzzyMetric::TokenSort);
        assert!(m.match_fuzzy(&make_tx("anything"), &RuleSet::default()).is_none());
    }

    #[test]
    fn deterministic() {
        let rules = make_rules(&[("*uber*", "Transporte"), ("posto ipiranga", "Transporte")]);
        let m = FuzzyMatcher::new(0.8, FuzzyMetric::default());
        let tx = make_tx("posto shell br 042");
        assert_eq!(m.best(&tx.description, &rules), m.best(&tx.description, &rules));
    }
}
