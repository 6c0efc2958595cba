//! Core traits for the three injected model collaborators.
//!
//! Implementations must be `Send + Sync`; share them across resolver calls
//! as `Arc<dyn …>`. Every method is a suspension point — implementations may
//! block on network I/O — and none of them may retain state across calls on
//! behalf of the core (per-episode caching is the caller's job).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::Message;

/// Text to fixed-length vector.
///
/// The dimensionality is a property of the provider instance and fixes the
/// dimensionality of every index built through it.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed one text.
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of the vectors [`encode`](Self::encode) produces.
    fn dimension(&self) -> usize;
}

/// Structured prompt to text completion. No streaming.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Run the messages through the model and return its full reply.
    async fn complete(&self, messages: Vec<Message>) -> Result<String>;
}

/// One typed span found in free text by a recognition model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSpan {
    /// Model label, e.g. `"MONEY"` or `"GPE"`.
    pub label: String,
    /// The matched text.
    pub text: String,
}

impl RecognizedSpan {
    /// Convenience constructor.
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Text to typed spans.
#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    /// Recognize every typed span in `text`, in document order.
    async fn recognize(&self, text: &str) -> Result<Vec<RecognizedSpan>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingModel for FixedEmbedder {
        async fn encode(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn trait_objects_are_shareable() {
        let embedder: Arc<dyn EmbeddingModel> = Arc::new(FixedEmbedder);
        assert_eq!(embedder.dimension(), 2);
        assert_eq!(embedder.encode("anything").await.unwrap().len(), 2);
    }
}
