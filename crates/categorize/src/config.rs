use extrato_classify::AiPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fuzzy::FuzzyMetric;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("fuzzy_threshold must be within [0, 1], got {0}")]
    Threshold(f64),
    #[error("ai.concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Everything a run depends on, passed to the pipeline at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum similarity (inclusive) for a fuzzy hit.
    pub fuzzy_threshold: f64,
    pub fuzzy_metric: FuzzyMetric,
    pub ai_enabled: bool,
    pub ai: AiSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.8,
            fuzzy_metric: FuzzyMetric::TokenSort,
            ai_enabled: true,
            ai: AiSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub model: String,
    /// Environment variable holding the provider key.
    pub api_key_env: String,
    #[serde(flatten)]
    pub policy: AiPolicy,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            policy: AiPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(ConfigError::Threshold(self.fuzzy_threshold));
        }
        if self.ai.policy.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.ai.policy.concurrency, 4);
        assert_eq!(config.ai.policy.max_retries, 2);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let toml = r#"
fuzzy_threshold = 0.9
fuzzy_metric = "levenshtein"
ai_enabled = false

[ai]
concurrency = 8
model = "gemini-1.5-flash"
"#;
        let config = PipelineConfig::from_toml(toml).unwrap();
        assert_eq!(config.fuzzy_threshold, 0.9);
        assert_eq!(config.fuzzy_metric, FuzzyMetric::Levenshtein);
        assert!(!config.ai_enabled);
        assert_eq!(config.ai.policy.concurrency, 8);
        assert_eq!(config.ai.policy.call_timeout_secs, 20);
        assert_eq!(config.ai.model, "gemini-1.5-flash");
        assert_eq!(config.ai.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let err = PipelineConfig::from_toml("fuzzy_threshold = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Threshold(t) if t == 1.5));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = PipelineConfig::from_toml("[ai]\nconcurrency = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroConcurrency));
    }

    #[test]
    fn unknown_metric_is_a_parse_error() {
        let err = PipelineConfig::from_toml("fuzzy_metric = \"soundex\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
