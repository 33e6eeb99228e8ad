//! # External Language Model Client
//!
//! Tier 2 over HTTP. Posts `{"text": ...}` to `{endpoint}/classify` and
//! expects `{"directives": [ExtractedDirective, ...]}` back.
//!
//! The client carries its own request timeout as a backstop; the extractor
//! still wraps every call in the escalation hard timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::classifier::{Classifier, ClassifierError, ExtractedDirective};

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    directives: Vec<ExtractedDirective>,
}

/// HTTP Tier 2 classifier.
#[derive(Debug, Clone)]
pub struct HttpLanguageModel {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpLanguageModel {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Unavailable {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for HttpLanguageModel {
    fn name(&self) -> &'static str {
        "http_language_model"
    }

    async fn classify(&self, text: &str) -> Result<Vec<ExtractedDirective>, ClassifierError> {
        let url = format!("{}/classify", self.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&ClassifyRequest { text })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifierError::Timeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    ClassifierError::Unavailable {
                        reason: format!("POST {url}: {e}"),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClassifierError::Unavailable {
                reason: format!("POST {url}: HTTP {status}"),
            });
        }

        let body: ClassifyResponse = resp.json().await.map_err(|e| ClassifierError::InvalidResponse {
            reason: e.to_string(),
        })?;
        Ok(body.directives)
    }
}
