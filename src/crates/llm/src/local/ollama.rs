//! Ollama client implementation.
//!
//! Provides chat completions and embeddings through a local Ollama server.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::config::LocalLlmConfig;
//! use llm::local::OllamaClient;
//! use tact_core::{CompletionModel, Message};
//!
//! let config = LocalLlmConfig::new("http://localhost:11434", "llama3");
//! let client = OllamaClient::new(config);
//! let reply = client.complete(vec![Message::human("Hello!")]).await?;
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tact_core::llm::{CompletionModel, EmbeddingModel, Message, MessageRole};
use tact_core::Result as CoreResult;

use crate::config::LocalLlmConfig;
use crate::error::{status_error, LlmError};

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::Human => "user",
        MessageRole::Assistant => "assistant",
    }
}

/// Ollama chat client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: LocalLlmConfig,
    client: Client,
}

impl OllamaClient {
    /// Create a new Ollama client with the given configuration.
    pub fn new(config: LocalLlmConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }

    /// Check if the Ollama server is reachable.
    pub async fn check_health(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn chat(&self, messages: Vec<Message>) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.config.base_url);
        let body = OllamaChatRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .map(|m| OllamaMessage {
                    role: role_name(m.role).to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            stream: false,
        };

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_connect() {
                LlmError::ServiceUnavailable(format!(
                    "Ollama server not reachable at {}",
                    self.config.base_url
                ))
            } else {
                LlmError::HttpError(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("Ollama", status, text));
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(parsed.message.content)
    }
}

#[async_trait]
impl CompletionModel for OllamaClient {
    async fn complete(&self, messages: Vec<Message>) -> CoreResult<String> {
        Ok(self.chat(messages).await?)
    }
}

/// Ollama embeddings client.
#[derive(Debug, Clone)]
pub struct OllamaEmbeddings {
    config: LocalLlmConfig,
    client: Client,
    dimension: usize,
}

impl OllamaEmbeddings {
    /// Create a new embeddings client. `config.model` names the embedding
    /// model; `dimension` is the length of its vectors.
    pub fn new(config: LocalLlmConfig, dimension: usize) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            config,
            client,
            dimension,
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let url = format!("{}/api/embeddings", self.config.base_url);
        let body = OllamaEmbeddingsRequest {
            model: self.config.model.clone(),
            prompt: text.to_string(),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("Ollama", status, text));
        }

        let parsed: OllamaEmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        if parsed.embedding.len() != self.dimension {
            return Err(LlmError::InvalidResponse(format!(
                "expected {}-dimensional embedding, got {}",
                self.dimension,
                parsed.embedding.len()
            )));
        }
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl EmbeddingModel for OllamaEmbeddings {
    async fn encode(&self, text: &str) -> CoreResult<Vec<f32>> {
        Ok(self.embed(text).await?)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// Ollama API types
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingsRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingsResponse {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_parses() {
        let parsed: OllamaChatResponse = serde_json::from_str(
            r#"{"model": "llama3", "message": {"role": "assistant", "content": "hi"}}"#,
        )
        .unwrap();
        assert_eq!(parsed.message.content, "hi");
    }
}
