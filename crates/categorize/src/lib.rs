pub mod config;
pub mod fuzzy;
pub mod normalize;
pub mod pipeline;
pub mod rules;
pub(crate) mod util;

pub use config::{AiSettings, ConfigError, PipelineConfig};
pub use fuzzy::{FuzzyMatcher, FuzzyMetric};
pub use normalize::{normalize, normalize_all, normalize_text, parse_amount, parse_date};
pub use pipeline::CategorizationPipeline;
pub use rules::{match_pattern, CategoryRule, MatchMode, ModeCounts, RuleError, RuleSet, SkippedRule};
