use std::collections::HashMap;
use std::fmt;

use extrato_classify::LabeledExample;
use extrato_core::{
    CategorizationResult, Category, MatchedBy, NormalizedTransaction, UNCATEGORIZED,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::normalize_text;

/// Wraps a pattern on both ends to request substring matching.
pub const SUBSTRING_DELIMITER: char = '*';

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("Pattern is empty")]
    EmptyPattern,
    #[error("Category is empty")]
    EmptyCategory,
    #[error("Category '{0}' is reserved for unmatched transactions")]
    ReservedCategory(String),
}

/// A row that was dropped while building a [`RuleSet`]. `row` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRule {
    pub row: usize,
    pub pattern: String,
    pub category: String,
    #[serde(serialize_with = "display")]
    pub error: RuleError,
}

fn display<S: serde::Serializer>(e: &RuleError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(e)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    Substring,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::Exact => write!(f, "exact"),
            MatchMode::Substring => write!(f, "substring"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Normalized pattern, delimiters removed.
    pub pattern: String,
    /// Pattern as written in the rule source.
    pub source_pattern: String,
    pub category: String,
    pub match_mode: MatchMode,
}

impl CategoryRule {
    pub fn parse(pattern: &str, category: &str) -> Result<Self, RuleError> {
        let source = pattern.trim();
        let category = category.trim();

        let (inner, match_mode) = match source
            .strip_prefix(SUBSTRING_DELIMITER)
            .and_then(|s| s.strip_suffix(SUBSTRING_DELIMITER))
        {
            Some(inner) => (inner, MatchMode::Substring),
            None => (source, MatchMode::Exact),
        };

        let normalized = normalize_text(inner);
        if normalized.is_empty() {
            return Err(RuleError::EmptyPattern);
        }
        if category.is_empty() {
            return Err(RuleError::EmptyCategory);
        }
        if category.eq_ignore_ascii_case(UNCATEGORIZED) {
            return Err(RuleError::ReservedCategory(category.to_string()));
        }

        Ok(Self {
            pattern: normalized,
            source_pattern: source.to_string(),
            category: category.to_string(),
            match_mode,
        })
    }

    /// `description` must already be normalized.
    pub fn matches(&self, description: &str) -> bool {
        match self.match_mode {
            MatchMode::Exact => description == self.pattern,
            MatchMode::Substring => description.contains(&self.pattern),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModeCounts {
    pub exact: usize,
    pub substring: usize,
}

/// Ordered rule list. Position is priority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<CategoryRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }

    /// Build from `(pattern, category)` rows in file order. Malformed rows
    /// are skipped with a warning and returned alongside the set.
    pub fn from_pairs<I, P, C>(pairs: I) -> (Self, Vec<SkippedRule>)
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: AsRef<str>,
    {
        let mut rules = Vec::new();
        let mut skipped = Vec::new();

        for (idx, (pattern, category)) in pairs.into_iter().enumerate() {
            let (pattern, category) = (pattern.as_ref(), category.as_ref());
            match CategoryRule::parse(pattern, category) {
                Ok(rule) => rules.push(rule),
                Err(error) => {
                    tracing::warn!(row = idx + 1, pattern, category, %error, "skipping malformed rule");
                    skipped.push(SkippedRule {
                        row: idx + 1,
                        pattern: pattern.to_string(),
                        category: category.to_string(),
                        error,
                    });
                }
            }
        }

        (Self { rules }, skipped)
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Replace the category of the rule with the same pattern and mode, or
    /// append the rule at the lowest priority. Returns true on replace.
    pub fn upsert(&mut self, rule: CategoryRule) -> bool {
        match self
            .rules
            .iter_mut()
            .find(|r| r.pattern == rule.pattern && r.match_mode == rule.match_mode)
        {
            Some(existing) => {
                existing.category = rule.category;
                true
            }
            None => {
                self.rules.push(rule);
                false
            }
        }
    }

    /// First rule in list order matching the normalized description.
    pub fn find_match(&self, description: &str) -> Option<&CategoryRule> {
        self.rules.iter().find(|r| r.matches(description))
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let mut seen = Vec::<&str>::new();
        for rule in &self.rules {
            if !seen.contains(&rule.category.as_str()) {
                seen.push(&rule.category);
            }
        }
        seen.into_iter().map(String::from).collect()
    }

    /// At most `n` patterns per category, in rule order.
    pub fn examples_per_category(&self, n: usize) -> Vec<LabeledExample> {
        let mut taken: HashMap<&str, usize> = HashMap::new();
        self.rules
            .iter()
            .filter(|rule| {
                let count = taken.entry(rule.category.as_str()).or_default();
                *count += 1;
                *count <= n
            })
            .map(|rule| LabeledExample {
                pattern: rule.pattern.clone(),
                category: rule.category.clone(),
            })
            .collect()
    }

    pub fn mode_counts(&self) -> ModeCounts {
        self.rules.iter().fold(ModeCounts::default(), |mut acc, r| {
            match r.match_mode {
                MatchMode::Exact => acc.exact += 1,
                MatchMode::Substring => acc.substring += 1,
            }
            acc
        })
    }

    /// Rule count per category, for rule statistics.
    pub fn category_counts(&self) -> Vec<(String, usize)> {
        self.categories()
            .into_iter()
            .map(|c| {
                let n = self.rules.iter().filter(|r| r.category == c).count();
                (c, n)
            })
            .collect()
    }
}

/// Exact/substring tier. `None` means fall through to the next tier.
pub fn match_pattern(tx: &NormalizedTransaction, rules: &RuleSet) -> Option<CategorizationResult> {
    let rule = rules.find_match(&tx.description)?;
    let matched_by = match rule.match_mode {
        MatchMode::Exact => MatchedBy::Exact,
        MatchMode::Substring => MatchedBy::Substring,
    };
    tracing::debug!(description = %tx.description, pattern = %rule.source_pattern, %matched_by, "rule hit");
    Some(CategorizationResult {
        transaction: tx.clone(),
        category: Category::named(&rule.category),
        matched_by,
        confidence: 1.0,
        matched_pattern: Some(rule.source_pattern.clone()),
    })
}
