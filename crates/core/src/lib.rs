pub mod money;
pub mod report;
pub mod transaction;

pub use money::Money;
pub use report::{
    CategorizationResult, Category, CategoryTotal, MatchedBy, Report, TierCounts, UNCATEGORIZED,
};
pub use transaction::{NormalizeError, NormalizedTransaction, RawTransaction, StatementKind};
