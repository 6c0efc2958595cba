//! Model provider implementations for tact.
//!
//! This crate provides concrete implementations of the collaborator traits
//! from `tact-core` — [`CompletionModel`](tact_core::CompletionModel),
//! [`EmbeddingModel`](tact_core::EmbeddingModel), and
//! [`EntityRecognizer`](tact_core::EntityRecognizer) — for local and remote
//! model servers.
//!
//! # Local providers
//!
//! Local providers connect to model servers on localhost or the local
//! network:
//! - **Ollama** — chat completions and embeddings
//!
//! # Remote providers
//!
//! Remote providers connect to cloud-hosted APIs:
//! - **OpenAI-compatible** — chat completions and embeddings; works with
//!   OpenAI itself and any endpoint speaking the same protocol
//!
//! # Entity recognition
//!
//! [`HttpRecognizer`] reaches a spaCy-style NER sidecar over HTTP, keeping
//! the recognition model out of this process.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::config::RemoteLlmConfig;
//! use llm::remote::{OpenAiClient, OpenAiEmbeddings};
//! use tact_core::{CompletionModel, Message};
//!
//! let config = RemoteLlmConfig::from_env(
//!     "OPENAI_API_KEY",
//!     "https://api.openai.com/v1",
//!     "gpt-4o-mini",
//! )?;
//! let client = OpenAiClient::new(config.clone());
//!
//! let reply = client.complete(vec![Message::human("Hello!")]).await?;
//! ```

pub mod config;
pub mod error;
#[cfg(feature = "local")]
pub mod local;
pub mod recognizer;
#[cfg(feature = "remote")]
pub mod remote;

pub use config::{LocalLlmConfig, RemoteLlmConfig};
pub use error::LlmError;
pub use recognizer::HttpRecognizer;
