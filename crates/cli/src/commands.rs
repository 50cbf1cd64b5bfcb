use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use extrato_categorize::{
    normalize_all, CategorizationPipeline, CategoryRule, PipelineConfig, RuleSet,
};
use extrato_classify::{AiClassifier, CancelFlag, GeminiClassifier};
use extrato_core::{Report, StatementKind};

use crate::export::{write_report, write_summary, ExportFormat};
use crate::{cache_store, loader};

#[derive(Debug)]
pub struct CategorizeArgs {
    pub inputs: Vec<PathBuf>,
    pub rules: PathBuf,
    pub config: Option<PathBuf>,
    pub format: ExportFormat,
    pub output: Option<PathBuf>,
    pub statement: StatementKind,
    pub no_ai: bool,
    /// `None` disables cache persistence.
    pub cache: Option<PathBuf>,
}

pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    PipelineConfig::from_toml(&text).with_context(|| format!("loading config {}", path.display()))
}

pub async fn categorize(args: CategorizeArgs, cancel: &CancelFlag) -> Result<Report> {
    let mut config = load_config(args.config.as_deref())?;
    if args.no_ai {
        config.ai_enabled = false;
    }

    let (rules, skipped) = loader::load_rules(&args.rules)?;
    if !skipped.is_empty() {
        tracing::warn!(skipped = skipped.len(), "some pattern rows were ignored");
    }
    let raw = loader::load_transactions(&args.inputs, args.statement)?;

    let ai = if config.ai_enabled {
        build_ai(&config, args.cache.as_deref())?
    } else {
        None
    };
    let pipeline = CategorizationPipeline::new(config, ai)?;

    let normalized = normalize_all(&raw);
    let report = pipeline.run_with_cancel(&normalized, &rules, cancel).await;

    match &args.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            write_report(&report, args.format, BufWriter::new(file))?;
            tracing::info!(output = %path.display(), "report written");
        }
        None => write_report(&report, args.format, std::io::stdout().lock())?,
    }
    write_summary(&report, std::io::stderr().lock())?;

    // Losing the cache only costs provider calls next run.
    if let (Some(ai), Some(path)) = (pipeline.ai(), args.cache.as_deref()) {
        if let Err(e) = cache_store::save(ai.cache(), path) {
            let error = format!("{e:#}");
            tracing::warn!(%error, "could not save ai cache");
        }
    }
    Ok(report)
}

/// Gemini-backed adapter, or `None` when no key is available.
fn build_ai(config: &PipelineConfig, cache_path: Option<&Path>) -> Result<Option<AiClassifier>> {
    let key = std::env::var(&config.ai.api_key_env).unwrap_or_default();
    if key.trim().is_empty() {
        tracing::warn!(env = %config.ai.api_key_env, "no API key set, AI fallback disabled");
        return Ok(None);
    }

    let cache = cache_path.map(cache_store::load).unwrap_or_default();
    let backend = Arc::new(GeminiClassifier::new(key.trim(), &config.ai.model));
    Ok(Some(
        AiClassifier::new(backend, config.ai.policy.clone()).with_cache(cache),
    ))
}

pub fn rules_stats<W: Write>(path: &Path, mut out: W) -> Result<RuleSet> {
    let (rules, skipped) = loader::load_rules(path)?;
    let modes = rules.mode_counts();

    writeln!(out, "{} rules ({} exact, {} substring)", rules.len(), modes.exact, modes.substring)?;
    for (category, count) in rules.category_counts() {
        writeln!(out, "  {category:<24} {count:>4}")?;
    }
    if !skipped.is_empty() {
        writeln!(out, "{} rows skipped:", skipped.len())?;
        for s in &skipped {
            writeln!(out, "  row {}: {} ({:?} -> {:?})", s.row, s.error, s.pattern, s.category)?;
        }
    }
    Ok(rules)
}

/// Add a rule to a pattern file, or recategorize the rule with the same
/// pattern. A missing file is created. Returns true when a rule was replaced.
pub fn add_rule(path: &Path, pattern: &str, category: &str) -> Result<bool> {
    let rule = CategoryRule::parse(pattern, category)
        .with_context(|| format!("invalid rule {pattern:?} -> {category:?}"))?;

    let mut rules = if path.exists() {
        let (rules, skipped) = loader::load_rules(path)?;
        if !skipped.is_empty() {
            tracing::warn!(skipped = skipped.len(), "malformed rows will be dropped on save");
        }
        rules
    } else {
        RuleSet::default()
    };
    let replaced = rules.upsert(rule);

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("creating temp file in {}", parent.display()))?;
    loader::write_rules(&rules, &mut tmp)?;
    tmp.persist(path).with_context(|| format!("writing {}", path.display()))?;

    tracing::info!(file = %path.display(), pattern, category, replaced, "rule saved");
    Ok(replaced)
}

/// Write the starter pattern file. Never overwrites.
pub fn template(output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .with_context(|| format!("creating {}", path.display()))?;
            file.write_all(loader::TEMPLATE_RULES.as_bytes())?;
            tracing::info!(output = %path.display(), "template written");
        }
        None => std::io::stdout().lock().write_all(loader::TEMPLATE_RULES.as_bytes())?,
    }
    Ok(())
}
