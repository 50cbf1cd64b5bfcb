use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{ClassifyError, ClassifyRequest, LabelClassifier, LabeledExample};
use crate::cache::{ClassificationCache, Lookup};
use crate::prompt::extract_label;
use crate::types::Classification;

/// Bounds on how hard the adapter tries before giving up on a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiPolicy {
    /// Maximum provider calls in flight during a batch.
    pub concurrency: usize,
    /// Retries after the first attempt, transient errors only.
    pub max_retries: u32,
    pub call_timeout_secs: u64,
    pub initial_backoff_ms: u64,
    /// Send the known category names so the model picks one of them.
    pub send_candidate_labels: bool,
}

impl Default for AiPolicy {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 2,
            call_timeout_secs: 20,
            initial_backoff_ms: 500,
            send_candidate_labels: true,
        }
    }
}

impl AiPolicy {
    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

/// Shared stop signal for a report run. Once raised, no new provider calls
/// are started; calls already running finish and still fill the cache.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Last-resort categorizer: provider + cache + retry policy. Clones share
/// the provider and the cache.
#[derive(Clone)]
pub struct AiClassifier {
    backend: Arc<dyn LabelClassifier>,
    cache: ClassificationCache,
    policy: AiPolicy,
    labels: Vec<String>,
    examples: Vec<LabeledExample>,
}

impl AiClassifier {
    pub fn new(backend: Arc<dyn LabelClassifier>, policy: AiPolicy) -> Self {
        Self {
            backend,
            cache: ClassificationCache::new(),
            policy,
            labels: Vec::new(),
            examples: Vec::new(),
        }
    }

    pub fn with_cache(mut self, cache: ClassificationCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_examples(mut self, examples: Vec<LabeledExample>) -> Self {
        self.examples = examples;
        self
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }

    pub fn policy(&self) -> &AiPolicy {
        &self.policy
    }

    /// Classify one description. Never fails: provider errors degrade to
    /// `Unclassified`.
    pub async fn classify(&self, description: &str, cancel: &CancelFlag) -> Classification {
        match self.cache.lookup(description) {
            Lookup::Hit(c) => {
                tracing::debug!(description, %c, "ai cache hit");
                c
            }
            Lookup::Wait(waiter) => waiter.wait().await,
            Lookup::Claimed(flight) => {
                if cancel.is_cancelled() {
                    tracing::debug!(description, "run cancelled, skipping ai call");
                    flight.abandon();
                    return Classification::Unclassified;
                }
                match self.call_with_retry(description).await {
                    Ok(c) => {
                        flight.complete(c.clone());
                        c
                    }
                    Err(e) => {
                        tracing::warn!(description, error = %e, "ai classification unavailable");
                        flight.abandon();
                        Classification::Unclassified
                    }
                }
            }
        }
    }

    /// Classify every distinct description with at most
    /// `policy.concurrency` provider calls running at once.
    pub async fn classify_all<'a, I>(
        &self,
        descriptions: I,
        cancel: &CancelFlag,
    ) -> HashMap<String, Classification>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = descriptions.into_iter().collect();
        let width = self.policy.concurrency.max(1);
        tracing::info!(distinct = distinct.len(), concurrency = width, "ai fallback batch");

        stream::iter(distinct)
            .map(|d| async move { (d.to_string(), self.classify(d, cancel).await) })
            .buffer_unordered(width)
            .collect()
            .await
    }

    async fn call_with_retry(&self, description: &str) -> Result<Classification, ClassifyError> {
        let request = ClassifyRequest {
            description: description.to_string(),
            candidate_labels: if self.policy.send_candidate_labels {
                self.labels.clone()
            } else {
                Vec::new()
            },
            examples: self.examples.clone(),
        };

        let mut attempt = 0;
        loop {
            let outcome = tokio::time::timeout(
                self.policy.call_timeout(),
                self.backend.complete(&request),
            )
            .await
            .unwrap_or(Err(ClassifyError::Timeout));

            match outcome {
                Ok(text) => return Ok(extract_label(&text, &request.candidate_labels)),
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let wait = self.policy.backoff(attempt);
                    tracing::debug!(description, error = %e, attempt, ?wait, "retrying ai call");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
