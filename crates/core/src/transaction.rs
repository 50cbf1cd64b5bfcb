use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::money::Money;

/// Which kind of statement a record was extracted from. Card statements print
/// charges as positive numbers, so the normalizer needs this to apply the
/// debit-negative convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    #[default]
    Bank,
    CreditCard,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Bank => write!(f, "bank"),
            StatementKind::CreditCard => write!(f, "credit_card"),
        }
    }
}

impl std::str::FromStr for StatementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "" | "bank" | "checking" | "conta" => Ok(StatementKind::Bank),
            "credit_card" | "card" | "cartao" => Ok(StatementKind::CreditCard),
            other => Err(format!("Unknown statement kind: '{other}'")),
        }
    }
}

/// One record as handed over by the statement extractor. Every field is the
/// text exactly as it appeared in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub date: String,
    pub description: String,
    pub amount: String,
    pub source_file: String,
    #[serde(default)]
    pub statement: StatementKind,
}

impl RawTransaction {
    pub fn new(
        date: impl Into<String>,
        description: impl Into<String>,
        amount: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            description: description.into(),
            amount: amount.into(),
            source_file: source_file.into(),
            statement: StatementKind::Bank,
        }
    }

    pub fn with_statement(mut self, statement: StatementKind) -> Self {
        self.statement = statement;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "field", content = "raw", rename_all = "snake_case")]
pub enum NormalizeError {
    #[error("Unrecognized date: '{0}'")]
    Date(String),
    #[error("Unrecognized amount: '{0}'")]
    Amount(String),
}

/// A transaction after canonicalization. `description` is the matching key;
/// `original_description` is what the statement said, kept for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    pub date: Option<NaiveDate>,
    pub description: String,
    pub original_description: String,
    pub amount: Option<Money>,
    pub source_file: String,
    /// Fields that could not be parsed and were nulled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<NormalizeError>,
}

impl NormalizedTransaction {
    pub fn is_degraded(&self) -> bool {
        !self.issues.is_empty()
    }
}
