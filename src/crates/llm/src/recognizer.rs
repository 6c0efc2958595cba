//! HTTP entity-recognizer client.
//!
//! Reaches a NER sidecar service (typically a small spaCy server) over HTTP.
//! The wire contract is minimal: POST `{"text": …}`, receive
//! `{"entities": [{"label": …, "text": …}, …]}` in document order.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tact_core::llm::{EntityRecognizer, RecognizedSpan};
use tact_core::Result as CoreResult;

use crate::error::{status_error, LlmError};

/// Entity recognizer backed by an HTTP sidecar service.
#[derive(Debug, Clone)]
pub struct HttpRecognizer {
    endpoint: String,
    client: Client,
}

impl HttpRecognizer {
    /// Create a recognizer posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Client::new(),
        }
    }

    async fn post(&self, text: &str) -> Result<Vec<RecognizedSpan>, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RecognizeRequest {
                text: text.to_string(),
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::ServiceUnavailable(format!(
                        "recognizer not reachable at {}",
                        self.endpoint
                    ))
                } else {
                    LlmError::HttpError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("recognizer", status, text));
        }

        let parsed: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(parsed
            .entities
            .into_iter()
            .map(|e| RecognizedSpan::new(e.label, e.text))
            .collect())
    }
}

#[async_trait]
impl EntityRecognizer for HttpRecognizer {
    async fn recognize(&self, text: &str) -> CoreResult<Vec<RecognizedSpan>> {
        Ok(self.post(text).await?)
    }
}

#[derive(Debug, Serialize)]
struct RecognizeRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    entities: Vec<WireEntity>,
}

#[derive(Debug, Deserialize)]
struct WireEntity {
    label: String,
    text: String,
}
