pub mod adapter;
pub mod backend;
pub mod cache;
pub mod prompt;
pub mod types;

#[cfg(feature = "gemini")]
pub mod gemini;

pub use adapter::{AiClassifier, AiPolicy, CancelFlag};
pub use backend::{
    ClassifyError, ClassifyRequest, LabelClassifier, LabeledExample, MockClassifier,
};
pub use cache::{ClassificationCache, InFlight, Lookup, Waiter};
pub use types::Classification;

#[cfg(feature = "gemini")]
pub use gemini::GeminiClassifier;
