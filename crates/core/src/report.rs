use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::money::Money;
use super::transaction::NormalizedTransaction;

/// Label used for the bucket of transactions no tier could place.
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Named(String),
    Uncategorized,
}

impl Category {
    pub fn named(label: impl Into<String>) -> Self {
        Category::Named(label.into())
    }

    pub fn label(&self) -> &str {
        match self {
            Category::Named(s) => s,
            Category::Uncategorized => UNCATEGORIZED,
        }
    }

    pub fn is_uncategorized(&self) -> bool {
        matches!(self, Category::Uncategorized)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        if s == UNCATEGORIZED {
            Category::Uncategorized
        } else {
            Category::Named(s)
        }
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        match c {
            Category::Named(s) => s,
            Category::Uncategorized => UNCATEGORIZED.to_string(),
        }
    }
}

/// Which tier of the cascade decided a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Exact,
    Substring,
    Fuzzy,
    Ai,
    None,
}

impl fmt::Display for MatchedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchedBy::Exact => write!(f, "exact"),
            MatchedBy::Substring => write!(f, "substring"),
            MatchedBy::Fuzzy => write!(f, "fuzzy"),
            MatchedBy::Ai => write!(f, "ai"),
            MatchedBy::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationResult {
    pub transaction: NormalizedTransaction,
    pub category: Category,
    pub matched_by: MatchedBy,
    /// 1.0 for rule hits and AI answers, the similarity score for fuzzy hits,
    /// 0.0 when uncategorized.
    pub confidence: f64,
    pub matched_pattern: Option<String>,
}

impl CategorizationResult {
    pub fn uncategorized(transaction: NormalizedTransaction) -> Self {
        Self {
            transaction,
            category: Category::Uncategorized,
            matched_by: MatchedBy::None,
            confidence: 0.0,
            matched_pattern: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub count: usize,
    pub total: Money,
}

/// How many results each tier produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TierCounts {
    pub exact: usize,
    pub substring: usize,
    pub fuzzy: usize,
    pub ai: usize,
    pub uncategorized: usize,
}

impl TierCounts {
    pub fn record(&mut self, matched_by: MatchedBy) {
        match matched_by {
            MatchedBy::Exact => self.exact += 1,
            MatchedBy::Substring => self.substring += 1,
            MatchedBy::Fuzzy => self.fuzzy += 1,
            MatchedBy::Ai => self.ai += 1,
            MatchedBy::None => self.uncategorized += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.exact + self.substring + self.fuzzy + self.ai + self.uncategorized
    }
}

/// Output of one pipeline run: results in input order plus per-category
/// aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub results: Vec<CategorizationResult>,
    pub totals: BTreeMap<String, CategoryTotal>,
    pub tiers: TierCounts,
    pub unparsed_dates: usize,
    pub unparsed_amounts: usize,
}

impl Report {
    pub fn assemble(results: Vec<CategorizationResult>) -> Self {
        let mut totals: BTreeMap<String, CategoryTotal> = BTreeMap::new();
        let mut tiers = TierCounts::default();
        let mut unparsed_dates = 0;
        let mut unparsed_amounts = 0;

        for r in &results {
            tiers.record(r.matched_by);
            let entry = totals.entry(r.category.label().to_string()).or_default();
            entry.count += 1;
            match r.transaction.amount {
                Some(amount) => entry.total += amount,
                None => unparsed_amounts += 1,
            }
            if r.transaction.date.is_none() {
                unparsed_dates += 1;
            }
        }

        Report {
            results,
            totals,
            tiers,
            unparsed_dates,
            unparsed_amounts,
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Categories ordered by absolute amount, largest first; ties by name.
    pub fn ranked_categories(&self) -> Vec<(&str, CategoryTotal)> {
        let mut ranked: Vec<(&str, CategoryTotal)> = self
            .totals
            .iter()
            .map(|(name, t)| (name.as_str(), *t))
            .collect();
        ranked.sort_by(|a, b| b.1.total.abs().cmp(&a.1.total.abs()).then(a.0.cmp(b.0)));
        ranked
    }

    pub fn grand_total(&self) -> Money {
        self.totals.values().map(|t| t.total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(desc: &str, cents: Option<i64>) -> NormalizedTransaction {
        NormalizedTransaction {
            date: chrono::NaiveDate::from_ymd_opt(2024, 1, 5),
            description: desc.to_string(),
            original_description: desc.to_uppercase(),
            amount: cents.map(Money::from_cents),
            source_file: "jan.pdf".to_string(),
            issues: vec![],
        }
    }

    fn hit(desc: &str, cents: Option<i64>, category: &str, by: MatchedBy) -> CategorizationResult {
        CategorizationResult {
            transaction: tx(desc, cents),
            category: Category::named(category),
            matched_by: by,
            confidence: 1.0,
            matched_pattern: Some(desc.to_string()),
        }
    }

    #[test]
    fn category_serializes_as_plain_label() {
        assert_eq!(serde_json::to_string(&Category::named("Lazer")).unwrap(), "\"Lazer\"");
        assert_eq!(
            serde_json::to_string(&Category::Uncategorized).unwrap(),
            format!("\"{UNCATEGORIZED}\"")
        );
        let back: Category = serde_json::from_str("\"Uncategorized\"").unwrap();
        assert!(back.is_uncategorized());
    }

    #[test]
    fn assemble_groups_by_category_and_keeps_order() {
        let report = Report::assemble(vec![
            hit("mercado", Some(-5000), "Alimentação", MatchedBy::Exact),
            CategorizationResult::uncategorized(tx("xpto", Some(-100))),
            hit("padaria", Some(-1500), "Alimentação", MatchedBy::Substring),
        ]);

        assert_eq!(report.len(), 3);
        assert_eq!(report.results[1].transaction.description, "xpto");

        let food = report.totals["Alimentação"];
        assert_eq!(food.count, 2);
        assert_eq!(food.total, Money::from_cents(-6500));
        assert_eq!(report.totals[UNCATEGORIZED].count, 1);
        assert_eq!(report.tiers.exact, 1);
        assert_eq!(report.tiers.substring, 1);
        assert_eq!(report.tiers.uncategorized, 1);
        assert_eq!(report.tiers.total(), 3);
    }

    #[test]
    fn missing_amounts_are_counted_not_summed() {
        let report = Report::assemble(vec![
            hit("uber", None, "Transporte", MatchedBy::Substring),
            hit("uber", Some(-2000), "Transporte", MatchedBy::Substring),
        ]);
        let t = report.totals["Transporte"];
        assert_eq!(t.count, 2);
        assert_eq!(t.total, Money::from_cents(-2000));
        assert_eq!(report.unparsed_amounts, 1);
        assert_eq!(report.unparsed_dates, 0);
    }

    #[test]
    fn ranked_by_absolute_total_then_name() {
        let report = Report::assemble(vec![
            hit("a", Some(-100), "Saúde", MatchedBy::Exact),
            hit("b", Some(30000), "Salário", MatchedBy::Exact),
            hit("c", Some(-100), "Lazer", MatchedBy::Exact),
        ]);
        let names: Vec<&str> = report.ranked_categories().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["Salário", "Lazer", "Saúde"]);
        assert_eq!(report.grand_total(), Money::from_cents(29800));
    }
}
