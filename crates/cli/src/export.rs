use std::io::Write;

use anyhow::Result;
use clap::ValueEnum;
use extrato_core::Report;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

/// One flattened line of the categorized-transactions download.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    date: String,
    description: &'a str,
    normalized_description: &'a str,
    amount: String,
    category: &'a str,
    matched_by: String,
    confidence: String,
    matched_pattern: &'a str,
    source_file: &'a str,
    issues: String,
}

pub fn write_csv<W: Write>(report: &Report, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for r in &report.results {
        let tx = &r.transaction;
        wtr.serialize(ExportRow {
            date: tx.date.map(|d| d.to_string()).unwrap_or_default(),
            description: &tx.original_description,
            normalized_description: &tx.description,
            amount: tx.amount.map(|a| a.to_string()).unwrap_or_default(),
            category: r.category.label(),
            matched_by: r.matched_by.to_string(),
            confidence: format!("{:.2}", r.confidence),
            matched_pattern: r.matched_pattern.as_deref().unwrap_or_default(),
            source_file: &tx.source_file,
            issues: tx
                .issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<W: Write>(report: &Report, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, report)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

pub fn write_report<W: Write>(report: &Report, format: ExportFormat, writer: W) -> Result<()> {
    match format {
        ExportFormat::Csv => write_csv(report, writer),
        ExportFormat::Json => write_json(report, writer),
    }
}

/// Human summary: spend per category, tier statistics, degraded fields.
pub fn write_summary<W: Write>(report: &Report, mut out: W) -> Result<()> {
    writeln!(out, "{} transactions", report.len())?;
    writeln!(out)?;
    for (category, total) in report.ranked_categories() {
        writeln!(out, "  {:<24} {:>5}  {:>14}", category, total.count, total.total.to_string())?;
    }
    writeln!(out, "  {:<24} {:>5}  {:>14}", "Total", report.len(), report.grand_total().to_string())?;
    writeln!(out)?;

    let t = &report.tiers;
    writeln!(
        out,
        "exact {} | substring {} | fuzzy {} | ai {} | uncategorized {}",
        t.exact, t.substring, t.fuzzy, t.ai, t.uncategorized
    )?;
    if report.unparsed_dates > 0 || report.unparsed_amounts > 0 {
        writeln!(
            out,
            "unparsed dates {} | unparsed amounts {}",
            report.unparsed_dates, report.unparsed_amounts
        )?;
    }
    Ok(())
}
