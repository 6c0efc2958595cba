//! OpenAI-compatible client implementation.
//!
//! Works against OpenAI's API and any endpoint speaking the same protocol
//! (many hosted and self-hosted gateways do).
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::config::RemoteLlmConfig;
//! use llm::remote::OpenAiClient;
//! use tact_core::{CompletionModel, Message};
//!
//! let config = RemoteLlmConfig::from_env(
//!     "OPENAI_API_KEY",
//!     "https://api.openai.com/v1",
//!     "gpt-4o-mini",
//! )?;
//! let client = OpenAiClient::new(config);
//! let reply = client.complete(vec![Message::human("Hello!")]).await?;
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tact_core::llm::{CompletionModel, EmbeddingModel, Message, MessageRole};
use tact_core::Result as CoreResult;

use crate::config::RemoteLlmConfig;
use crate::error::{status_error, LlmError};

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::Human => "user",
        MessageRole::Assistant => "assistant",
    }
}

/// OpenAI-compatible chat completions client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl OpenAiClient {
    /// Create a new client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }

    async fn chat(&self, messages: Vec<Message>) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: role_name(m.role).to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("OpenAI", status, text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response held no choices".to_string()))
    }
}

#[async_trait]
impl CompletionModel for OpenAiClient {
    async fn complete(&self, messages: Vec<Message>) -> CoreResult<String> {
        Ok(self.chat(messages).await?)
    }
}

/// OpenAI-compatible embeddings client.
///
/// The vector dimensionality is fixed per embedding model and supplied at
/// construction.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    config: RemoteLlmConfig,
    client: Client,
    dimension: usize,
}

impl OpenAiEmbeddings {
    /// Create a new embeddings client. `config.model` names the embedding
    /// model; `dimension` is the length of its vectors.
    pub fn new(config: RemoteLlmConfig, dimension: usize) -> Self {
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
        let url = format!("{}/embeddings", self.config.base_url);
        let body = EmbeddingsRequest {
            model: self.config.model.clone(),
            input: vec![text.to_string()],
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("OpenAI", status, text));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::InvalidResponse("response held no embeddings".to_string()))?;

        if embedding.len() != self.dimension {
            return Err(LlmError::InvalidResponse(format!(
                "expected {}-dimensional embedding, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbeddings {
    async fn encode(&self, text: &str) -> CoreResult<Vec<f32>> {
        Ok(self.embed(text).await?)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsDatum {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_map_to_openai_names() {
        assert_eq!(role_name(MessageRole::System), "system");
        assert_eq!(role_name(MessageRole::Human), "user");
        assert_eq!(role_name(MessageRole::Assistant), "assistant");
    }

    #[test]
    fn chat_response_parses_without_optional_content() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
