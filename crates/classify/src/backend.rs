use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Classifier call timed out")]
    Timeout,
    #[error("Classifier rejected credentials: {0}")]
    Auth(String),
    #[error("Classifier quota exhausted or rate limited")]
    RateLimited,
    #[error("Unexpected classifier response: {0}")]
    InvalidResponse(String),
    #[error("Classifier not configured: set an API key or disable AI fallback")]
    NotConfigured,
}

impl ClassifyError {
    /// Errors worth retrying with backoff. Auth and malformed responses won't
    /// fix themselves.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClassifyError::Transport(_) | ClassifyError::Timeout | ClassifyError::RateLimited
        )
    }
}

/// A pattern/category pair shown to the model as a worked example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledExample {
    pub pattern: String,
    pub category: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifyRequest {
    /// Normalized transaction description.
    pub description: String,
    pub candidate_labels: Vec<String>,
    pub examples: Vec<LabeledExample>,
}

/// Abstraction over a remote text classifier. Implementations return the
/// provider's raw answer text; mapping it onto a category happens in the
/// adapter so provider response shapes never reach the pipeline.
#[async_trait]
pub trait LabelClassifier: Send + Sync {
    async fn complete(&self, request: &ClassifyRequest) -> Result<String, ClassifyError>;
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Answers from a fixed table keyed by description and counts every call, so
/// tests can assert when the provider was (not) reached.
#[derive(Default)]
pub struct MockClassifier {
    answers: HashMap<String, String>,
    failures: Mutex<HashMap<String, Vec<ClassifyError>>>,
    fallback: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, description: &str, response: &str) -> Self {
        self.answers.insert(description.to_string(), response.to_string());
        self
    }

    /// Response for any description without a specific answer.
    pub fn otherwise(mut self, response: &str) -> Self {
        self.fallback = Some(response.to_string());
        self
    }

    /// Queue errors returned (in order) before the description's answer.
    pub fn fail(mut self, description: &str, errors: Vec<ClassifyError>) -> Self {
        if let Ok(f) = self.failures.get_mut() {
            f.insert(description.to_string(), errors);
        }
        self
    }

    /// Simulated provider latency.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LabelClassifier for MockClassifier {
    async fn complete(&self, request: &ClassifyRequest) -> Result<String, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let queued = self.failures.lock().ok().and_then(|mut f| {
            f.get_mut(&request.description)
                .filter(|q| !q.is_empty())
                .map(|q| q.remove(0))
        });
        if let Some(err) = queued {
            return Err(err);
        }

        self.answers
            .get(&request.description)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| ClassifyError::InvalidResponse("empty response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(desc: &str) -> ClassifyRequest {
        ClassifyRequest {
            description: desc.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn mock_returns_preset_answer_and_counts() {
        let m = MockClassifier::new().answer("posto shell", "Transporte");
        assert_eq!(m.complete(&req("posto shell")).await.unwrap(), "Transporte");
        assert!(m.complete(&req("other")).await.is_err());
        assert_eq!(m.calls(), 2);
    }

    #[tokio::test]
    async fn mock_drains_queued_failures_first() {
        let m = MockClassifier::new()
            .answer("ifood", "Alimentação")
            .fail("ifood", vec![ClassifyError::Timeout]);
        assert_eq!(m.complete(&req("ifood")).await, Err(ClassifyError::Timeout));
        assert_eq!(m.complete(&req("ifood")).await.unwrap(), "Alimentação");
    }

    #[tokio::test]
    async fn mock_fallback_answer() {
        let m = MockClassifier::new().otherwise("Outros");
        assert_eq!(m.complete(&req("anything")).await.unwrap(), "Outros");
    }

    #[test]
    fn transient_classification() {
        assert!(ClassifyError::Timeout.is_transient());
        assert!(ClassifyError::RateLimited.is_transient());
        assert!(ClassifyError::Transport("reset".into()).is_transient());
        assert!(!ClassifyError::Auth("bad key".into()).is_transient());
        assert!(!ClassifyError::NotConfigured.is_transient());
    }
}
