use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use extrato_categorize::{RuleSet, SkippedRule};
use extrato_core::{RawTransaction, StatementKind};
use serde::Deserialize;

// ── Pattern file ─────────────────────────────────────────────────────────────

/// Read a `pattern,category` CSV. Columns are located by header name; rows
/// that fail to parse as rules are skipped and returned.
pub fn read_rules<R: Read>(reader: R) -> Result<(RuleSet, Vec<SkippedRule>)> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("reading pattern file header")?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
    };
    let (Some(pattern_col), Some(category_col)) = (column("pattern"), column("category")) else {
        bail!("pattern file must have 'pattern' and 'category' columns, found: {headers:?}");
    };

    let mut pairs = Vec::new();
    for record in rdr.records() {
        let record = record.context("reading pattern file row")?;
        pairs.push((
            record.get(pattern_col).unwrap_or_default().to_string(),
            record.get(category_col).unwrap_or_default().to_string(),
        ));
    }
    Ok(RuleSet::from_pairs(pairs))
}

pub fn load_rules(path: &Path) -> Result<(RuleSet, Vec<SkippedRule>)> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening pattern file {}", path.display()))?;
    read_rules(file).with_context(|| format!("parsing {}", path.display()))
}

/// Write rules back as a `pattern,category` CSV, patterns as originally
/// written.
pub fn write_rules<W: Write>(rules: &RuleSet, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["pattern", "category"])?;
    for rule in rules.rules() {
        wtr.write_record([rule.source_pattern.as_str(), rule.category.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Starter pattern file for `extrato template`.
pub const TEMPLATE_RULES: &str = "\
pattern,category
supermercado,Alimentação
mercado,Alimentação
padaria,Alimentação
*farmacia*,Saúde
*hospital*,Saúde
*clinica*,Saúde
uber,Transporte
taxi,Transporte
99,Transporte
*netflix*,Entretenimento
*spotify*,Entretenimento
*cinema*,Entretenimento
";

// ── Extractor output ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawRow {
    date: String,
    description: String,
    amount: String,
    #[serde(default)]
    source_file: Option<String>,
    #[serde(default)]
    statement: Option<String>,
}

/// Read extracted transactions from CSV
/// (`date,description,amount[,source_file][,statement]`). Missing
/// `source_file` falls back to `source`, missing `statement` to `default_kind`.
pub fn read_transactions<R: Read>(
    reader: R,
    source: &str,
    default_kind: StatementKind,
) -> Result<Vec<RawTransaction>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let mut out = Vec::new();
    for (idx, row) in rdr.deserialize::<RawRow>().enumerate() {
        let row = row.with_context(|| format!("row {}", idx + 1))?;
        let statement = match row.statement.as_deref() {
            Some(s) if !s.trim().is_empty() => s
                .parse::<StatementKind>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("row {}", idx + 1))?,
            _ => default_kind,
        };
        let source_file = row
            .source_file
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| source.to_string());
        out.push(
            RawTransaction::new(row.date, row.description, row.amount, source_file)
                .with_statement(statement),
        );
    }
    Ok(out)
}

/// Load several extractor files into one batch, in argument order.
pub fn load_transactions(paths: &[impl AsRef<Path>], default_kind: StatementKind) -> Result<Vec<RawTransaction>> {
    let mut batch = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let rows = read_transactions(file, &source, default_kind)
            .with_context(|| format!("parsing {}", path.display()))?;
        tracing::info!(file = %path.display(), transactions = rows.len(), "loaded statement");
        batch.extend(rows);
    }
    Ok(batch)
}
