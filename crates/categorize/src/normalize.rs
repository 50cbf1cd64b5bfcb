use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use extrato_core::{Money, NormalizeError, NormalizedTransaction, RawTransaction, StatementKind};
use regex::Regex;
use rust_decimal::Decimal;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_date_iso, r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})$");
re!(re_date_dmy, r"^(\d{1,2})[-/.](\d{1,2})[-/.](\d{4}|\d{2})$");
re!(re_date_day_month_name,
    r"^(\d{1,2})(?:\s+de\s+|[\s/.\-]+)([a-z]+)\.?(?:\s+de\s+|[\s/.\-]+)(\d{4}|\d{2})$");
re!(re_date_month_name_day, r"^([a-z]+)\.?\s+(\d{1,2}),?\s+(\d{4})$");

// ── Description ───────────────────────────────────────────────────────────────

/// Matching key for descriptions and rule patterns: control characters
/// removed, lower-cased, diacritics stripped, whitespace collapsed.
pub fn normalize_text(s: &str) -> String {
    let folded: String = s
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Date ─────────────────────────────────────────────────────────────────────

/// Parse a statement date. Numeric forms are day-first.
pub fn parse_date(raw: &str) -> Result<NaiveDate, NormalizeError> {
    let s = normalize_text(raw);
    try_date(&s).ok_or_else(|| NormalizeError::Date(raw.trim().to_string()))
}

fn try_date(s: &str) -> Option<NaiveDate> {
    if let Some(c) = re_date_iso().captures(s) {
        return ymd(c.get(1)?.as_str(), c.get(2)?.as_str(), c.get(3)?.as_str());
    }
    if let Some(c) = re_date_dmy().captures(s) {
        return ymd(c.get(3)?.as_str(), c.get(2)?.as_str(), c.get(1)?.as_str());
    }
    if let Some(c) = re_date_day_month_name().captures(s) {
        let month = month_from_name(c.get(2)?.as_str())?;
        let day: u32 = c.get(1)?.as_str().parse().ok()?;
        let year = expand_year(c.get(3)?.as_str().parse().ok()?);
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    if let Some(c) = re_date_month_name_day().captures(s) {
        let month = month_from_name(c.get(1)?.as_str())?;
        let day: u32 = c.get(2)?.as_str().parse().ok()?;
        let year: i32 = c.get(3)?.as_str().parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    None
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    let year = expand_year(y.parse().ok()?);
    NaiveDate::from_ymd_opt(year, m.parse().ok()?, d.parse().ok()?)
}

fn expand_year(y: i32) -> i32 {
    if y < 100 { 2000 + y } else { y }
}

/// Portuguese and English month names and abbreviations, accents already
/// stripped.
fn month_from_name(name: &str) -> Option<u32> {
    let m = match name {
        "jan" | "janeiro" | "january" => 1,
        "fev" | "feb" | "fevereiro" | "february" => 2,
        "mar" | "marco" | "march" => 3,
        "abr" | "apr" | "abril" | "april" => 4,
        "mai" | "may" | "maio" => 5,
        "jun" | "junho" | "june" => 6,
        "jul" | "julho" | "july" => 7,
        "ago" | "aug" | "agosto" | "august" => 8,
        "set" | "sep" | "sept" | "setembro" | "september" => 9,
        "out" | "oct" | "outubro" | "october" => 10,
        "nov" | "novembro" | "november" => 11,
        "dez" | "dec" | "dezembro" | "december" => 12,
        _ => return None,
    };
    Some(m)
}

// ── Amount ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Debit,
    Credit,
}

const CURRENCY_MARKERS: &[&str] = &["us$", "r$", "brl", "usd", "eur", "$", "€"];

/// Parse a localized amount into a signed value, debits negative.
///
/// An explicit D/C marker decides the sign. Without one, bank statements
/// keep the printed sign and card statements are flipped, since cards print
/// charges as positive.
pub fn parse_amount(raw: &str, statement: StatementKind) -> Result<Money, NormalizeError> {
    let fail = || NormalizeError::Amount(raw.trim().to_string());

    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let (mut body, marker) = split_side_marker(&compact);

    let mut negative = false;
    if let Some(inner) = body.strip_prefix('(').and_then(|b| b.strip_suffix(')')) {
        negative = true;
        body = inner;
    }
    body = strip_currency(body);
    if let Some(rest) = body.strip_prefix('-').or_else(|| body.strip_suffix('-')) {
        negative = !negative;
        body = rest;
    } else if let Some(rest) = body.strip_prefix('+').or_else(|| body.strip_suffix('+')) {
        body = rest;
    }
    body = strip_currency(body);

    if !body.chars().any(|c| c.is_ascii_digit())
        || !body.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.')
    {
        return Err(fail());
    }

    let canonical = canonical_decimal(body).ok_or_else(fail)?;
    let magnitude = Decimal::from_str(&canonical).map_err(|_| fail())?;
    let printed = if negative { -magnitude } else { magnitude };

    let signed = match (marker, statement) {
        (Some(Side::Debit), _) => -printed.abs(),
        (Some(Side::Credit), _) => printed.abs(),
        (None, StatementKind::Bank) => printed,
        (None, StatementKind::CreditCard) => -printed,
    };
    Ok(Money::from_decimal(signed))
}

fn split_side_marker(s: &str) -> (&str, Option<Side>) {
    for (suffix, side) in [
        ("db", Side::Debit),
        ("cr", Side::Credit),
        ("d", Side::Debit),
        ("c", Side::Credit),
    ] {
        if let Some(rest) = s.strip_suffix(suffix) {
            if rest.ends_with(|c: char| c.is_ascii_digit() || c == ')') {
                return (rest, Some(side));
            }
        }
    }
    (s, None)
}

fn strip_currency(mut s: &str) -> &str {
    for marker in CURRENCY_MARKERS {
        if let Some(rest) = s.strip_prefix(marker) {
            s = rest;
        }
        if let Some(rest) = s.strip_suffix(marker) {
            s = rest;
        }
    }
    s
}

/// Resolve thousands vs. decimal separators into a plain `1234.56` string.
/// Malformed digit grouping is rejected rather than guessed at.
fn canonical_decimal(body: &str) -> Option<String> {
    let commas = body.matches(',').count();
    let dots = body.matches('.').count();

    match (commas, dots) {
        (0, 0) => Some(body.to_string()),
        (c, d) if c > 0 && d > 0 => {
            // The separator printed last is the decimal one and appears once.
            let (decimal, thousands, count) = if body.rfind(',')? > body.rfind('.')? {
                (',', '.', c)
            } else {
                ('.', ',', d)
            };
            if count != 1 {
                return None;
            }
            let (int, frac) = body.split_once(decimal)?;
            if frac.is_empty() {
                return None;
            }
            Some(format!("{}.{frac}", ungroup(int, thousands)?))
        }
        (1, 0) | (0, 1) => {
            let sep = if commas == 1 { ',' } else { '.' };
            let (int, frac) = body.split_once(sep)?;
            if frac.len() == 3 {
                if let Some(whole) = ungroup(body, sep) {
                    return Some(whole);
                }
            }
            if frac.is_empty() || (sep == ',' && frac.len() > 3) {
                return None;
            }
            Some(format!("{int}.{frac}"))
        }
        (_, 0) => ungroup(body, ','),
        _ => ungroup(body, '.'),
    }
}

/// Drop thousands separators. The leading group has 1-3 digits (no leading
/// zero when grouped) and every later group exactly 3.
fn ungroup(int: &str, sep: char) -> Option<String> {
    let mut groups = int.split(sep);
    let first = groups.next()?;
    let grouped = int.contains(sep);
    if first.is_empty() || first.len() > 3 || (grouped && first.starts_with('0')) {
        return None;
    }
    let mut out = first.to_string();
    for group in groups {
        if group.len() != 3 {
            return None;
        }
        out.push_str(group);
    }
    Some(out)
}

// ── Transaction ──────────────────────────────────────────────────────────────

/// Canonicalize one extracted record. Unparsable fields are nulled and
/// recorded in `issues`; the transaction itself is always kept.
pub fn normalize(raw: &RawTransaction) -> NormalizedTransaction {
    let mut issues = Vec::new();

    let date = match parse_date(&raw.date) {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::warn!(source_file = %raw.source_file, error = %e, "date nulled");
            issues.push(e);
            None
        }
    };

    let amount = match parse_amount(&raw.amount, raw.statement) {
        Ok(a) => Some(a),
        Err(e) => {
            tracing::warn!(source_file = %raw.source_file, error = %e, "amount nulled");
            issues.push(e);
            None
        }
    };

    NormalizedTransaction {
        date,
        description: normalize_text(&raw.description),
        original_description: raw.description.clone(),
        amount,
        source_file: raw.source_file.clone(),
        issues,
    }
}

pub fn normalize_all(raw: &[RawTransaction]) -> Vec<NormalizedTransaction> {
    raw.iter().map(normalize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bank(s: &str) -> Money {
        parse_amount(s, StatementKind::Bank).unwrap()
    }

    fn card(s: &str) -> Money {
        parse_amount(s, StatementKind::CreditCard).unwrap()
    }

    // ── normalize_text ────────────────────────────────────────────────────────

    #[test]
    fn text_lowercases_strips_accents_and_collapses() {
        assert_eq!(normalize_text("  PAGAMENTO   Farmácia\tSÃO João "), "pagamento farmacia sao joao");
    }

    #[test]
    fn text_drops_control_characters() {
        assert_eq!(normalize_text("UBER\u{0}*TRIP\r\n9F2A"), "uber *trip 9f2a");
    }

    #[test]
    fn text_is_idempotent() {
        let once = normalize_text("Alimentação  Ç");
        assert_eq!(normalize_text(&once), once);
    }

    // ── parse_date ────────────────────────────────────────────────────────────

    #[test]
    fn date_iso_and_slashed_iso() {
        assert_eq!(parse_date("2024-01-05").unwrap(), date(2024, 1, 5));
        assert_eq!(parse_date("2024/1/5").unwrap(), date(2024, 1, 5));
    }

    #[test]
    fn date_day_first_numeric() {
        assert_eq!(parse_date("05/01/2024").unwrap(), date(2024, 1, 5));
        assert_eq!(parse_date("05.01.24").unwrap(), date(2024, 1, 5));
        assert_eq!(parse_date("5-1-2024").unwrap(), date(2024, 1, 5));
    }

    #[test]
    fn date_textual_months() {
        assert_eq!(parse_date("05 JAN 2024").unwrap(), date(2024, 1, 5));
        assert_eq!(parse_date("05/fev/24").unwrap(), date(2024, 2, 5));
        assert_eq!(parse_date("5 de março de 2024").unwrap(), date(2024, 3, 5));
        assert_eq!(parse_date("January 5, 2024").unwrap(), date(2024, 1, 5));
        assert_eq!(parse_date("12 Dez. 2023").unwrap(), date(2023, 12, 12));
    }

    #[test]
    fn date_invalid() {
        assert_eq!(parse_date("31/02/2024"), Err(NormalizeError::Date("31/02/2024".into())));
        assert!(parse_date("not a date").is_err());
        assert!(parse_date("05 foo 2024").is_err());
        assert!(parse_date("").is_err());
    }

    // ── parse_amount ──────────────────────────────────────────────────────────

    #[test]
    fn amount_point_decimal() {
        assert_eq!(bank("-150.00"), Money::from_cents(-15000));
        assert_eq!(bank("1,234.56"), Money::from_cents(123456));
    }

    #[test]
    fn amount_comma_decimal() {
        assert_eq!(bank("R$ 1.234,56"), Money::from_cents(123456));
        assert_eq!(bank("-12,5"), Money::from_cents(-1250));
        assert_eq!(bank("1.234.567,89"), Money::from_cents(123456789));
    }

    #[test]
    fn amount_lone_separator_with_three_digits_is_thousands() {
        assert_eq!(bank("1.234"), Money::from_cents(123400));
        assert_eq!(bank("1,234"), Money::from_cents(123400));
        assert_eq!(bank("0.125"), Money::from_decimal(Decimal::from_str("0.125").unwrap()));
    }

    #[test]
    fn amount_parentheses_and_trailing_sign() {
        assert_eq!(bank("(75,25)"), Money::from_cents(-7525));
        assert_eq!(bank("75,25-"), Money::from_cents(-7525));
        assert_eq!(bank("+10,00"), Money::from_cents(1000));
        assert_eq!(bank("-R$ 10,00"), Money::from_cents(-1000));
    }

    #[test]
    fn amount_debit_credit_markers_win() {
        assert_eq!(bank("150,00 D"), Money::from_cents(-15000));
        assert_eq!(bank("150,00 C"), Money::from_cents(15000));
        assert_eq!(card("89,90 CR"), Money::from_cents(8990));
        assert_eq!(card("-89,90 DB"), Money::from_cents(-8990));
    }

    #[test]
    fn amount_card_statement_flips_printed_sign() {
        assert_eq!(card("89,90"), Money::from_cents(-8990));
        assert_eq!(card("-89,90"), Money::from_cents(8990));
    }

    #[test]
    fn amount_invalid() {
        assert_eq!(
            parse_amount(" abc ", StatementKind::Bank),
            Err(NormalizeError::Amount("abc".into()))
        );
        assert!(parse_amount("", StatementKind::Bank).is_err());
        assert!(parse_amount("1,2,3.4,5", StatementKind::Bank).is_err());
        assert!(parse_amount("12,3456", StatementKind::Bank).is_err());
        assert!(parse_amount("R$", StatementKind::Bank).is_err());
    }

    #[test]
    fn amount_malformed_grouping_is_rejected() {
        for bad in ["12,34,56", "1,2,3", "10.50.00", "1.2.3", "12,34.5", "1.234,", "0.123.456"] {
            assert_eq!(
                parse_amount(bad, StatementKind::Bank),
                Err(NormalizeError::Amount(bad.into())),
                "{bad}"
            );
        }
    }

    #[test]
    fn amount_ungroupable_lone_separator_is_decimal() {
        assert_eq!(bank("0,125"), Money::from_decimal(Decimal::from_str("0.125").unwrap()));
        assert_eq!(bank("1234.567"), Money::from_decimal(Decimal::from_str("1234.567").unwrap()));
        assert_eq!(bank("1,234,567"), Money::from_cents(123456700));
    }

    // ── normalize ─────────────────────────────────────────────────────────────

    #[test]
    fn normalize_keeps_original_description() {
        let raw = RawTransaction::new("2024-01-05", "PAGAMENTO SUPERMERCADO ABC", "-150.00", "jan.pdf");
        let n = normalize(&raw);
        assert_eq!(n.description, "pagamento supermercado abc");
        assert_eq!(n.original_description, "PAGAMENTO SUPERMERCADO ABC");
        assert_eq!(n.amount, Some(Money::from_cents(-15000)));
        assert_eq!(n.date, Some(date(2024, 1, 5)));
        assert!(!n.is_degraded());
    }

    #[test]
    fn normalize_nulls_bad_fields_but_keeps_record() {
        let raw = RawTransaction::new("??", "Tarifa", "n/a", "jan.pdf");
        let n = normalize(&raw);
        assert_eq!(n.date, None);
        assert_eq!(n.amount, None);
        assert_eq!(n.issues.len(), 2);
        assert_eq!(n.description, "tarifa");
    }

    #[test]
    fn normalize_is_pure() {
        let raw = RawTransaction::new("05/01/2024", "Posto  Shell BR 042", "89,90", "fatura.pdf")
            .with_statement(StatementKind::CreditCard);
        assert_eq!(normalize(&raw), normalize(&raw));
    }
}
