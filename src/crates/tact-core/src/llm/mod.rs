//! Collaborator interfaces: embedding, completion, entity recognition
//!
//! The core library is an orchestration layer, not a model client library.
//! It defines the traits external models are reached through — providers
//! implement them elsewhere and are injected at construction. None of the
//! collaborators hold a back-reference into core logic.

mod traits;

pub use traits::{CompletionModel, EmbeddingModel, EntityRecognizer, RecognizedSpan};

use serde::{Deserialize, Serialize};

/// Role of a chat message sent to a completion model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions framing the task.
    System,
    /// End-user content.
    Human,
    /// Model output.
    Assistant,
}

/// One message in a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who the message speaks as.
    pub role: MessageRole,
    /// Plain-text content.
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a human (user) message.
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Human,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}
