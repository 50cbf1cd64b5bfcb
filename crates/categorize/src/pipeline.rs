use std::collections::HashMap;

use extrato_classify::{AiClassifier, CancelFlag, Classification};
use extrato_core::{
    CategorizationResult, Category, MatchedBy, NormalizedTransaction, RawTransaction, Report,
};

use crate::config::{ConfigError, PipelineConfig};
use crate::fuzzy::FuzzyMatcher;
use crate::normalize::normalize_all;
use crate::rules::{match_pattern, RuleSet};

/// Few-shot examples sent per category with each AI request.
const EXAMPLES_PER_CATEGORY: usize = 3;

/// Runs the exact/substring → fuzzy → AI cascade over a batch and assembles
/// the report.
pub struct CategorizationPipeline {
    config: PipelineConfig,
    fuzzy: FuzzyMatcher,
    ai: Option<AiClassifier>,
}

impl CategorizationPipeline {
    /// Fails on a config that `PipelineConfig::validate` rejects, however it
    /// was built.
    pub fn new(config: PipelineConfig, ai: Option<AiClassifier>) -> Result<Self, ConfigError> {
        config.validate()?;
        let fuzzy = FuzzyMatcher::new(config.fuzzy_threshold, config.fuzzy_metric);
        Ok(Self { config, fuzzy, ai })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ai(&self) -> Option<&AiClassifier> {
        self.ai.as_ref()
    }

    /// Rule tiers only. Pure: no provider calls, no cache access.
    pub fn match_rules(&self, tx: &NormalizedTransaction, rules: &RuleSet) -> Option<CategorizationResult> {
        match_pattern(tx, rules).or_else(|| self.fuzzy.match_fuzzy(tx, rules))
    }

    pub async fn run(&self, transactions: &[NormalizedTransaction], rules: &RuleSet) -> Report {
        self.run_with_cancel(transactions, rules, &CancelFlag::new()).await
    }

    /// Once `cancel` is raised no new AI calls start; affected transactions
    /// end up uncategorized and the report is still complete.
    pub async fn run_with_cancel(
        &self,
        transactions: &[NormalizedTransaction],
        rules: &RuleSet,
        cancel: &CancelFlag,
    ) -> Report {
        let matched: Vec<Option<CategorizationResult>> = transactions
            .iter()
            .map(|tx| self.match_rules(tx, rules))
            .collect();

        let misses: Vec<&str> = transactions
            .iter()
            .zip(&matched)
            .filter(|(tx, hit)| hit.is_none() && !tx.description.is_empty())
            .map(|(tx, _)| tx.description.as_str())
            .collect();

        let answers = self.classify_misses(&misses, rules, cancel).await;

        let results: Vec<CategorizationResult> = transactions
            .iter()
            .zip(matched)
            .map(|(tx, hit)| hit.unwrap_or_else(|| ai_result(tx, answers.get(&tx.description))))
            .collect();

        let report = Report::assemble(results);
        tracing::info!(
            transactions = report.len(),
            exact = report.tiers.exact,
            substring = report.tiers.substring,
            fuzzy = report.tiers.fuzzy,
            ai = report.tiers.ai,
            uncategorized = report.tiers.uncategorized,
            "categorization finished"
        );
        report
    }

    /// Normalize extractor output, then run.
    pub async fn categorize_statement(&self, raw: &[RawTransaction], rules: &RuleSet) -> Report {
        let normalized = normalize_all(raw);
        self.run(&normalized, rules).await
    }

    async fn classify_misses(
        &self,
        misses: &[&str],
        rules: &RuleSet,
        cancel: &CancelFlag,
    ) -> HashMap<String, Classification> {
        if misses.is_empty() {
            return HashMap::new();
        }
        let ai = match &self.ai {
            Some(ai) if self.config.ai_enabled => ai,
            _ => {
                tracing::debug!(misses = misses.len(), "ai fallback disabled");
                return HashMap::new();
            }
        };

        let ai = ai
            .clone()
            .with_labels(rules.categories())
            .with_examples(rules.examples_per_category(EXAMPLES_PER_CATEGORY));
        ai.classify_all(misses.iter().copied(), cancel).await
    }
}

fn ai_result(tx: &NormalizedTransaction, answer: Option<&Classification>) -> CategorizationResult {
    match answer {
        Some(Classification::Category(label)) => CategorizationResult {
            transaction: tx.clone(),
            category: Category::named(label),
            matched_by: MatchedBy::Ai,
            confidence: 1.0,
            matched_pattern: None,
        },
        _ => CategorizationResult::uncategorized(tx.clone()),
    }
}
