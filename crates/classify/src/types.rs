use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of asking the classifier about one description, after the
/// provider's answer has been mapped onto a known label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Category(String),
    Unclassified,
}

impl Classification {
    pub fn category(&self) -> Option<&str> {
        match self {
            Classification::Category(c) => Some(c),
            Classification::Unclassified => None,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Category(c) => write!(f, "{c}"),
            Classification::Unclassified => write!(f, "unclassified"),
        }
    }
}
