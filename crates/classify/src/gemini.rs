use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::{ClassifyError, ClassifyRequest, LabelClassifier};
use crate::prompt::build_prompt;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini `generateContent` backend.
pub struct GeminiClassifier {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GeminiClassifier {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Point at a different base URL (proxies, test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl LabelClassifier for GeminiClassifier {
    async fn complete(&self, request: &ClassifyRequest) -> Result<String, ClassifyError> {
        if self.api_key.is_empty() {
            return Err(ClassifyError::NotConfigured);
        }

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_prompt(request),
                }],
            }],
        };

        let resp = self
            .client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifyError::Timeout
                } else {
                    ClassifyError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status.as_u16()));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ClassifyError::InvalidResponse(e.to_string()))?;
        response_text(parsed)
    }
}

fn status_error(status: u16) -> ClassifyError {
    match status {
        401 | 403 => ClassifyError::Auth(format!("HTTP {status}")),
        429 => ClassifyError::RateLimited,
        408 | 500..=599 => ClassifyError::Transport(format!("HTTP {status}")),
        other => ClassifyError::InvalidResponse(format!("HTTP {other}")),
    }
}

fn response_text(resp: GenerateResponse) -> Result<String, ClassifyError> {
    let text: String = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ClassifyError::InvalidResponse("no candidate text".to_string()));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_includes_model() {
        let g = GeminiClassifier::new("k", "gemini-1.5-pro").with_endpoint("http://localhost:9/");
        assert_eq!(g.url(), "http://localhost:9/models/gemini-1.5-pro:generateContent");
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(status_error(403), ClassifyError::Auth(_)));
        assert_eq!(status_error(429), ClassifyError::RateLimited);
        assert!(status_error(503).is_transient());
        assert!(!status_error(400).is_transient());
    }

    #[test]
    fn parses_candidate_text() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"Transporte"}],"role":"model"}}]}"#;
        let resp: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response_text(resp).unwrap(), "Transporte");
    }

    #[test]
    fn empty_candidates_are_invalid() {
        let resp: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(response_text(resp), Err(ClassifyError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let g = GeminiClassifier::new("", "gemini-1.5-pro");
        let req = ClassifyRequest::default();
        assert_eq!(g.complete(&req).await, Err(ClassifyError::NotConfigured));
    }
}
